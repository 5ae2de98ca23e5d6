//! Network transports for the Bare client.
//!
//! ## Architectural Layer
//!
//! **Adapter.** Implements the [`bare::HttpTransport`] and
//! [`bare::WebSocketConnector`] ports over real sockets. Nothing here knows
//! about envelopes or protocol versions; the transports carry whatever the
//! client hands them.
//!
//! | Module | Port | Backed by |
//! |--------|------|-----------|
//! | [`http`] | `HttpTransport` | `reqwest` (redirects disabled) |
//! | [`websocket`] | `WebSocketConnector` | `tokio-tungstenite` |
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> bare::Result<()> {
//! use bare_client::create_bare_client;
//! use bare_transport::{transports, ReqwestTransportConfig};
//! use url::Url;
//!
//! let server = Url::parse("https://bare.example/").map_err(bare::BareClientError::from)?;
//! let client = create_bare_client(server, transports(&ReqwestTransportConfig::default())?, None).await?;
//! println!("bound to {:?}", client.version());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bare::{TransportError, Transports};

pub mod http;
pub mod websocket;

pub use http::{ReqwestTransport, ReqwestTransportConfig};
pub use websocket::TungsteniteConnector;

/// Builds the default transport pair: reqwest for exchanges and tungstenite
/// for tunnels.
pub fn transports(config: &ReqwestTransportConfig) -> Result<Transports, TransportError> {
    Ok(Transports::new(
        Arc::new(ReqwestTransport::new(config)?),
        Arc::new(TungsteniteConnector::new()),
    ))
}
