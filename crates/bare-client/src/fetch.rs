//! Redirect-following fetch over the tunnel.
//!
//! [`BareClient::fetch`] layers browser-style redirect handling on top of
//! [`BareClient::request`]:
//!
//! | Status | Method change | Body |
//! |--------|---------------|------|
//! | 301, 302 | `POST` becomes `GET` | dropped when the method changes |
//! | 303 | anything but `HEAD` becomes `GET` | dropped when the method changes |
//! | 307, 308 | kept | replayed; streams fail with `BodyNotReplayable` |

use bare::{
    is_redirect_status, BareHeaders, Body, CacheMode, FetchFailure, RedirectPolicy, RemoteTarget,
    Result, TunneledRequest, TunneledResponse,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::client::BareClient;

/// Headers describing a request body, removed when a redirect drops the body.
const BODY_HEADERS: [&str; 5] = [
    "content-type",
    "content-length",
    "content-encoding",
    "content-language",
    "content-location",
];

/// Options for [`BareClient::fetch`].
#[derive(Debug)]
pub struct FetchInit {
    /// HTTP method; defaults to `GET`.
    pub method: String,
    /// Logical request headers.
    pub headers: BareHeaders,
    /// Request body.
    pub body: Body,
    /// What to do with redirect responses.
    pub redirect: RedirectPolicy,
    /// Cache directive for every hop.
    pub cache: Option<CacheMode>,
    /// Cancels the whole fetch, every hop included.
    pub cancel: Option<CancellationToken>,
}

impl Default for FetchInit {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: BareHeaders::new(),
            body: Body::Empty,
            redirect: RedirectPolicy::Follow,
            cache: None,
            cancel: None,
        }
    }
}

impl FetchInit {
    /// A `GET` that follows redirects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the headers.
    pub fn with_headers(mut self, headers: BareHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the redirect policy.
    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.redirect = redirect;
        self
    }

    /// Sets the cache directive.
    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Result of [`BareClient::fetch`].
#[derive(Debug)]
pub struct FetchResponse {
    /// Remote status.
    pub status: u16,
    /// Remote status text.
    pub status_text: String,
    /// Remote headers.
    pub headers: BareHeaders,
    /// Remote body.
    pub body: Body,
    /// URL of the response after any redirects.
    pub final_url: Url,
    /// `true` if at least one redirect was followed.
    pub redirected: bool,
}

impl FetchResponse {
    fn new(response: TunneledResponse, final_url: Url, redirected: bool) -> Self {
        Self {
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body: response.body,
            final_url,
            redirected,
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Whether a redirect with `status` turns `method` into a body-less `GET`.
fn rewrites_to_get(status: u16, method: &str) -> bool {
    match status {
        301 | 302 => method.eq_ignore_ascii_case("POST"),
        303 => !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("HEAD"),
        _ => false,
    }
}

impl BareClient {
    /// Fetches `url` through the tunnel, handling redirects per
    /// [`FetchInit::redirect`].
    ///
    /// Every hop is a full tunneled request with `Host` rewritten to the hop's
    /// target. Redirect failures surface as
    /// [`bare::BareClientError::FetchFailed`].
    #[instrument(skip_all, fields(url = %url, method = %init.method))]
    pub async fn fetch(&self, url: &Url, init: FetchInit) -> Result<FetchResponse> {
        let FetchInit {
            mut method,
            mut headers,
            mut body,
            redirect,
            cache,
            cancel,
        } = init;
        let max_redirects = self.config().max_redirects;
        let mut current = url.clone();
        let mut redirects = 0;

        loop {
            let target = RemoteTarget::from_url(&current)?;
            headers.set("Host", target.host_header());

            let retained = body.try_clone();
            let mut request = TunneledRequest::new(method.clone(), target)
                .with_headers(headers.clone())
                .with_body(std::mem::take(&mut body));
            request.cache = cache;

            let response = self.request(request, cancel.as_ref()).await?;
            let status = response.status;
            if !is_redirect_status(status) || redirect == RedirectPolicy::Manual {
                return Ok(FetchResponse::new(response, current, redirects > 0));
            }
            if redirect == RedirectPolicy::Error {
                warn!(status, "redirect rejected by policy");
                return Err(FetchFailure::RedirectRejected { status }.into());
            }
            if redirects >= max_redirects {
                warn!(max_redirects, "redirect limit reached");
                return Err(FetchFailure::TooManyRedirects { max: max_redirects }.into());
            }

            let location = response
                .headers
                .get_first("location")
                .ok_or(FetchFailure::MissingLocation)?;
            let next = current
                .join(location)
                .map_err(|_| FetchFailure::InvalidLocation(location.to_string()))?;
            debug!(status, from = %current, to = %next, "following redirect");

            if rewrites_to_get(status, &method) {
                method = "GET".to_string();
                for name in BODY_HEADERS {
                    headers.remove(name);
                }
            } else {
                body = retained.ok_or(FetchFailure::BodyNotReplayable)?;
            }

            redirects += 1;
            current = next;
        }
    }
}
