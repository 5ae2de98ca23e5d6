//! Bare tunneling client.
//!
//! Negotiates a protocol version with a Bare server, tunnels HTTP exchanges
//! and WebSocket sessions through it, and layers redirect-following fetch on
//! top.
//!
//! ## Architectural Layer
//!
//! **Orchestration.** This crate owns the protocol state machines. It talks
//! to the network only through the port traits in [`bare`]; concrete
//! transports come from `bare-transport` or from the host.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | `BareClient` facade, builder, shared manifest resolution |
//! | [`fetch`] | Redirect-following `BareClient::fetch` |
//! | [`manifest`] | Manifest fetch |
//! | [`negotiate`] | `VersionTable` and `negotiate` |
//! | [`protocol`] | `ProtocolClient` trait and its context |
//! | [`tunnel`] | WebSocket session reducer, driver, and `TunnelSocket` |
//! | [`v1`], [`v2`], [`v3`] | Protocol variants |
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo(transports: bare::Transports) -> bare::Result<()> {
//! use bare_client::{create_bare_client, FetchInit};
//! use url::Url;
//!
//! let server = Url::parse("https://bare.example/").map_err(bare::BareClientError::from)?;
//! let client = create_bare_client(server, transports, None).await?;
//! let page = Url::parse("https://example.com/").map_err(bare::BareClientError::from)?;
//! let response = client.fetch(&page, FetchInit::new()).await?;
//! println!("{} {}", response.status, response.body.text().await?);
//! # Ok(())
//! # }
//! ```

pub mod client;
mod exchange;
pub mod fetch;
pub mod manifest;
pub mod negotiate;
pub mod protocol;
pub mod tunnel;
pub mod v1;
pub mod v2;
pub mod v3;
mod websocket;

pub use client::{create_bare_client, BareClient, BareClientBuilder};
pub use fetch::{FetchInit, FetchResponse};
pub use manifest::fetch_manifest;
pub use negotiate::{negotiate, ClientConstructor, VersionTable};
pub use protocol::{ClientContext, ProtocolClient, WebSocketRequest};
pub use tunnel::{ReadyState, TunnelEvent, TunnelSocket};
pub use v1::ClientV1;
pub use v2::ClientV2;
pub use v3::ClientV3;
