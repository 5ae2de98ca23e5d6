//! Error and retry-policy types for the Bare tunneling client.
//!
//! [`BareClientError`] is the single taxonomy every crate in the workspace
//! returns. It separates three kinds of failure that callers must not confuse:
//!
//! - the intermediary refused the tunneled exchange ([`BareError`]),
//! - the envelope or handshake violated the wire protocol
//!   ([`BareClientError::MalformedEnvelope`], [`BareClientError::UnexpectedFrameType`], …),
//! - the caller misused the client ([`BareClientError::NotReady`],
//!   [`BareClientError::InvalidSubprotocol`], …).
//!
//! A remote server answering 404 or 500 through the intermediary is *not* an
//! error: it arrives as a normal [`crate::TunneledResponse`].
//!
//! [`RetryPolicy`] is a cross-cutting concern: every error can report whether
//! re-issuing the operation could succeed. Nothing in the workspace retries on
//! its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BareClientError>;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry.
///
/// - `Retryable` errors: manifest fetch failures, transport failures.
/// - `NonRetryable` errors: version mismatch, protocol violations, caller
///   programming errors, intermediary rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be issued again unchanged.
    Retryable,
    /// Re-issuing the operation unchanged will fail the same way.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Intermediary rejection
// ---------------------------------------------------------------------------

/// JSON payload the intermediary returns when it rejects a tunneled exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BareErrorBody {
    /// Machine-readable error code (e.g. `"UNKNOWN"`, `"INVALID_BARE_HEADER"`).
    pub code: String,
    /// Identifies the offending input (e.g. `"request.headers.x-bare-url"`).
    pub id: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Server-side stack trace, when the intermediary runs in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl BareErrorBody {
    /// Parses an error payload, keeping non-JSON bodies as the message of an
    /// `UNKNOWN` error so the status code is never lost.
    pub fn from_payload(payload: &str) -> Self {
        serde_json::from_str(payload).unwrap_or_else(|_| Self {
            code: "UNKNOWN".to_string(),
            id: "unknown".to_string(),
            message: Some(payload.to_string()),
            stack: None,
        })
    }
}

/// The intermediary's own failure response.
///
/// Produced only when the *transport* status is not a success; this is the
/// sole discriminator between a rejected call and a proxied remote failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bare server rejected the request with status {status}: {} ({})", .body.code, .body.id)]
pub struct BareError {
    /// Transport-level status returned by the intermediary.
    pub status: u16,
    /// Structured error payload.
    pub body: BareErrorBody,
}

// ---------------------------------------------------------------------------
// Redirect failures
// ---------------------------------------------------------------------------

/// Why a redirect-following fetch gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The hop bound was reached before a non-redirect response arrived.
    #[error("more than {max} redirects")]
    TooManyRedirects {
        /// Configured maximum number of hops.
        max: usize,
    },

    /// The redirect policy is `error` and the remote answered with a redirect.
    #[error("redirect status {status} rejected by redirect policy")]
    RedirectRejected {
        /// Redirect status received.
        status: u16,
    },

    /// A redirect status arrived without a `Location` header.
    #[error("redirect response has no location header")]
    MissingLocation,

    /// The `Location` header could not be resolved against the current URL.
    #[error("invalid redirect location '{0}'")]
    InvalidLocation(String),

    /// A 307/308 redirect must resend a streaming body that was already consumed.
    #[error("request body cannot be replayed for a method-preserving redirect")]
    BodyNotReplayable,
}

// ---------------------------------------------------------------------------
// Transport failures
// ---------------------------------------------------------------------------

/// Failure reported by a transport port implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection to the intermediary could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connection failed while sending or receiving.
    #[error("transport i/o failed: {0}")]
    Io(String),

    /// The transport rejected the request before sending it
    /// (e.g. an invalid header name).
    #[error("invalid transport request: {0}")]
    InvalidRequest(String),

    /// A body stream was cut off by its cancellation handle.
    #[error("body stream cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Client-level errors
// ---------------------------------------------------------------------------

/// Every failure the Bare client can surface.
///
/// `Clone` so that one manifest-resolution failure can be handed to every
/// caller waiting on the same in-flight resolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BareClientError {
    /// The manifest could not be fetched or parsed.
    ///
    /// Recoverable: the next on-demand call fetches again.
    #[error("unable to fetch bare manifest{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    ManifestFetchFailed {
        /// Transport status, when a response was received.
        status: Option<u16>,
        /// Response text or transport failure description.
        message: String,
    },

    /// The manifest and the client share no protocol version.
    #[error("unable to find compatible client version (server offers {offered:?})")]
    UnsupportedVersion {
        /// Versions the manifest advertised.
        offered: Vec<String>,
    },

    /// The intermediary rejected the tunneled exchange.
    #[error(transparent)]
    Bare(#[from] BareError),

    /// A response envelope could not be decoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The first WebSocket message from the intermediary was not a text frame.
    #[error("the first websocket message was not a text frame")]
    UnexpectedFrameType,

    /// The first WebSocket message from the intermediary was not of `open` type.
    #[error("message was not of open type (got '{0}')")]
    UnexpectedMessageType(String),

    /// A caller-supplied WebSocket subprotocol is not a valid token.
    #[error("the subprotocol '{0}' is invalid")]
    InvalidSubprotocol(String),

    /// A synchronous connect was attempted before the manifest was resolved.
    #[error(
        "the manifest has not been resolved; wait for a request to complete or supply the manifest before creating websockets"
    )]
    NotReady,

    /// A frame was sent on a tunnel that is not open.
    #[error("the tunnel is not open")]
    NotOpen,

    /// A redirect-following fetch failed.
    #[error("Failed to fetch: {0}")]
    FetchFailed(#[from] FetchFailure),

    /// The operation was cancelled through its cancellation handle.
    #[error("the operation was cancelled")]
    Cancelled,

    /// The transport failed.
    #[error(transparent)]
    Transport(TransportError),

    /// A URL could not be built or parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The client configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A tunnel session was requested outside a tokio runtime.
    #[error("websocket tunnels must be created inside a tokio runtime")]
    NoRuntime,
}

impl BareClientError {
    /// Returns whether re-issuing the failed operation could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::ManifestFetchFailed { .. } | Self::Transport(_) => RetryPolicy::Retryable,
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Builds a [`BareClientError::MalformedEnvelope`] naming the field that failed.
    pub fn malformed(context: &str, err: impl std::fmt::Display) -> Self {
        Self::MalformedEnvelope(format!("{context}: {err}"))
    }
}

impl From<TransportError> for BareClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl From<url::ParseError> for BareClientError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
