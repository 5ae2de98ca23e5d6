//! The capability contract every protocol variant implements.

use std::fmt;

use async_trait::async_trait;
use bare::{
    BareHeaders, ClientConfig, RemoteTarget, Result, Subprotocol, Transports, TunneledRequest,
    TunneledResponse, VersionId,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::tunnel::TunnelSocket;

/// Everything a protocol variant needs to reach one intermediary.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Base URL of the Bare server (the manifest URL).
    pub server: Url,
    /// Transports to the server.
    pub transports: Transports,
    /// Shared client configuration.
    pub config: ClientConfig,
}

/// A normalised request to open a tunneled WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketRequest {
    /// Remote WebSocket endpoint.
    pub target: RemoteTarget,
    /// Logical handshake headers, already normalised.
    pub headers: BareHeaders,
    /// Requested subprotocols, already validated.
    pub protocols: Vec<Subprotocol>,
}

/// One wire-protocol version of the Bare client.
///
/// A variant is bound to one server at construction and keeps no state
/// between calls.
#[async_trait]
pub trait ProtocolClient: Send + Sync + fmt::Debug {
    /// The version this variant speaks.
    fn version(&self) -> VersionId;

    /// Tunnels one HTTP exchange.
    ///
    /// Cancelling `cancel` before the transport answers aborts the exchange
    /// with [`bare::BareClientError::Cancelled`].
    async fn request(
        &self,
        request: TunneledRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<TunneledResponse>;

    /// Starts a tunneled WebSocket handshake and returns immediately.
    ///
    /// The returned socket is `Connecting` until the intermediary acknowledges
    /// the connection.
    fn connect(&self, request: WebSocketRequest) -> Result<TunnelSocket>;
}
