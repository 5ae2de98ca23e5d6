//! Transport port traits.
//!
//! The client never opens sockets itself. It reaches the intermediary through
//! two ports supplied by the host:
//!
//! - [`HttpTransport`]: one request/response exchange with streaming bodies.
//! - [`WebSocketConnector`]: opens an already-framed duplex WebSocket.
//!
//! `bare-transport` implements both over `reqwest` and `tokio-tungstenite`;
//! tests substitute in-memory fakes.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, Stream};
use url::Url;

use crate::{Body, CacheMode, HeaderList, TransportError};

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Whether the transport may attach ambient credentials (cookies, auth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    /// Never attach ambient credentials.
    #[default]
    Omit,
    /// Attach credentials for same-origin requests only.
    SameOrigin,
    /// Always attach credentials.
    Include,
}

/// One request to the intermediary.
#[derive(Debug)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL of the intermediary endpoint.
    pub url: Url,
    /// Transport headers, in emission order.
    pub headers: HeaderList,
    /// Request body.
    pub body: Body,
    /// Credential policy; envelope requests always use [`CredentialsMode::Omit`].
    pub credentials: CredentialsMode,
    /// Cache directive for the transport.
    pub cache: Option<CacheMode>,
}

impl TransportRequest {
    /// Creates a body-less request with credentials omitted.
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
            headers: HeaderList::new(),
            body: Body::Empty,
            credentials: CredentialsMode::Omit,
            cache: None,
        }
    }
}

/// The intermediary's response, body not yet read.
#[derive(Debug)]
pub struct TransportResponse {
    /// Transport status.
    pub status: u16,
    /// Transport status text.
    pub status_text: String,
    /// Transport headers, in receipt order.
    pub headers: HeaderList,
    /// Response body stream.
    pub body: Body,
}

impl TransportResponse {
    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response transport to the intermediary.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request and returns once response headers are available.
    ///
    /// Dropping the returned future aborts the exchange.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Close code and reason of a WebSocket close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close status code (e.g. 1000).
    pub code: u16,
    /// Close reason text.
    pub reason: String,
}

/// One WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
    /// Close frame; `None` closes without a status.
    Close(Option<CloseFrame>),
}

impl From<&str> for WsMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for WsMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for WsMessage {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for WsMessage {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data.into())
    }
}

/// Outbound half of an open WebSocket.
pub type WsSink = Pin<Box<dyn Sink<WsMessage, Error = TransportError> + Send>>;

/// Inbound half of an open WebSocket. Ends when the connection is gone.
pub type WsStream = Pin<Box<dyn Stream<Item = Result<WsMessage, TransportError>> + Send>>;

/// A connected WebSocket, already past its transport-level opening handshake.
pub struct WebSocketConnection {
    /// Frames to the peer.
    pub sink: WsSink,
    /// Frames from the peer.
    pub stream: WsStream,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection").finish_non_exhaustive()
    }
}

/// Opens WebSocket connections to the intermediary.
#[async_trait]
pub trait WebSocketConnector: Send + Sync {
    /// Connects to `url`, offering `protocols` in `Sec-WebSocket-Protocol`
    /// when non-empty. Resolves once the connection is open.
    async fn connect(
        &self,
        url: &Url,
        protocols: &[String],
    ) -> Result<WebSocketConnection, TransportError>;
}

/// The pair of transports one client uses.
#[derive(Clone)]
pub struct Transports {
    /// Request/response transport.
    pub http: Arc<dyn HttpTransport>,
    /// WebSocket transport.
    pub websocket: Arc<dyn WebSocketConnector>,
}

impl Transports {
    /// Bundles the two transports.
    pub fn new(http: Arc<dyn HttpTransport>, websocket: Arc<dyn WebSocketConnector>) -> Self {
        Self { http, websocket }
    }
}

impl std::fmt::Debug for Transports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transports").finish_non_exhaustive()
    }
}
