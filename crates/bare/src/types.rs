//! Shared value types for tunneled exchanges.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry the
//! request and response data that flows through a tunneled exchange.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BareClientError, BareHeaders, Body, Result};

// ---------------------------------------------------------------------------
// Status classes
// ---------------------------------------------------------------------------

/// Statuses whose responses never carry a body.
pub const STATUS_EMPTY: [u16; 4] = [101, 204, 205, 304];

/// Statuses treated as redirects.
pub const STATUS_REDIRECT: [u16; 5] = [301, 302, 303, 307, 308];

/// Returns `true` if a response with `status` must have an empty body.
pub fn is_empty_status(status: u16) -> bool {
    STATUS_EMPTY.contains(&status)
}

/// Returns `true` if `status` is a redirect.
pub fn is_redirect_status(status: u16) -> bool {
    STATUS_REDIRECT.contains(&status)
}

// ---------------------------------------------------------------------------
// Request options
// ---------------------------------------------------------------------------

/// Cache directive for a tunneled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Use the transport's normal caching.
    #[default]
    Default,
    /// Never store or reuse a cached response.
    NoStore,
    /// Bypass caches and refresh them.
    Reload,
    /// Revalidate with the origin before using a cached response.
    NoCache,
    /// Use any cached response regardless of staleness.
    ForceCache,
    /// Use only a cached response.
    OnlyIfCached,
}

impl CacheMode {
    /// Returns the directive's wire spelling (e.g. `"no-store"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::NoStore => "no-store",
            Self::Reload => "reload",
            Self::NoCache => "no-cache",
            Self::ForceCache => "force-cache",
            Self::OnlyIfCached => "only-if-cached",
        }
    }

    /// Returns `true` if the directive forbids serving a stored response.
    pub fn bypasses_cache(self) -> bool {
        matches!(self, Self::NoStore | Self::Reload | Self::NoCache)
    }
}

/// How a redirect-following fetch treats redirect responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectPolicy {
    /// Chase `Location` headers up to the configured hop bound.
    #[default]
    Follow,
    /// Fail on any redirect status.
    Error,
    /// Return the redirect response untouched.
    Manual,
}

/// Extra instructions carried in the request envelope.
///
/// All lists default to empty; V1 ignores `pass_headers` and `pass_status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeOptions {
    /// Caller-side headers the intermediary should forward to the remote.
    pub forward_headers: Vec<String>,
    /// Remote response headers the intermediary should pass back verbatim.
    pub pass_headers: Vec<String>,
    /// Remote statuses the intermediary should pass back verbatim.
    pub pass_status: Vec<u16>,
}

// ---------------------------------------------------------------------------
// Remote target
// ---------------------------------------------------------------------------

/// Default port for a URL scheme: 80 for `http`/`ws`, 443 for `https`/`wss`,
/// otherwise 0.
pub fn default_port(scheme: &str) -> u16 {
    match scheme.trim_end_matches(':') {
        "http" | "ws" => 80,
        "https" | "wss" => 443,
        _ => 0,
    }
}

/// The remote endpoint a tunneled request or connection is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTarget {
    /// URL scheme without the trailing colon (e.g. `"https"`).
    pub scheme: String,
    /// Host name or IP literal, without brackets.
    pub host: String,
    /// Port; always explicit.
    pub port: u16,
    /// Path plus query string (e.g. `"/search?q=1"`).
    pub path: String,
}

impl RemoteTarget {
    /// Creates a target from its parts.
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into().trim_end_matches(':').to_string(),
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    /// Decomposes a URL, resolving an implicit port from the scheme.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| BareClientError::InvalidUrl(format!("{url} has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or_else(|| default_port(url.scheme()));
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok(Self::new(url.scheme(), host, port, path))
    }

    fn host_literal(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// Scheme with a trailing colon (e.g. `"https:"`), as older envelopes
    /// spell it.
    pub fn protocol(&self) -> String {
        format!("{}:", self.scheme)
    }

    /// Value for a `Host` header: the port is omitted when it is the scheme's
    /// default.
    pub fn host_header(&self) -> String {
        if self.port == default_port(&self.scheme) {
            self.host_literal()
        } else {
            format!("{}:{}", self.host_literal(), self.port)
        }
    }

    /// Reassembles the absolute remote URL.
    pub fn to_url(&self) -> Result<Url> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(Url::parse(&format!(
            "{}://{}:{}{}",
            self.scheme,
            self.host_literal(),
            self.port,
            path
        ))?)
    }
}

// ---------------------------------------------------------------------------
// Exchange types
// ---------------------------------------------------------------------------

/// One logical HTTP request to tunnel. Constructed per call; not reused.
#[derive(Debug)]
pub struct TunneledRequest {
    /// HTTP method (e.g. `"GET"`).
    pub method: String,
    /// Logical request headers, sent to the remote as-is.
    pub headers: BareHeaders,
    /// Request body.
    pub body: Body,
    /// Where the intermediary sends the request.
    pub target: RemoteTarget,
    /// Cache directive for the transport request.
    pub cache: Option<CacheMode>,
    /// Forward/pass instructions for the intermediary.
    pub envelope: EnvelopeOptions,
}

impl TunneledRequest {
    /// Creates a request with no body, no cache directive, and default
    /// envelope options.
    pub fn new(method: impl Into<String>, target: RemoteTarget) -> Self {
        Self {
            method: method.into(),
            headers: BareHeaders::new(),
            body: Body::Empty,
            target,
            cache: None,
            envelope: EnvelopeOptions::default(),
        }
    }

    /// Replaces the logical headers.
    pub fn with_headers(mut self, headers: BareHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the cache directive.
    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// The remote's response as decoded from the envelope.
///
/// The body is the transport's stream, untouched; ownership moves to the
/// caller.
#[derive(Debug)]
pub struct TunneledResponse {
    /// Remote status.
    pub status: u16,
    /// Remote status text (may be empty).
    pub status_text: String,
    /// Remote headers as received.
    pub headers: BareHeaders,
    /// Remote body.
    pub body: Body,
}

impl TunneledResponse {
    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
