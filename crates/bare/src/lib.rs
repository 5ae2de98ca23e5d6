//! Domain layer of the Bare tunneling client.
//!
//! This crate contains every protocol concept shared by the workspace: the
//! identifiers, value types, header envelope codec, error taxonomy, and the
//! transport port traits. The protocol state machines in `bare-client` and the
//! network adapters in `bare-transport` build on it; neither adds types of its
//! own to the wire format.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** This crate has no I/O dependencies.
//! It defines *what* a transport must provide; `bare-transport` defines *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype protocol tokens (`VersionId`, `Subprotocol`) |
//! | [`headers`] | Logical (`BareHeaders`) and transport (`HeaderList`) headers |
//! | [`body`] | Buffered and streaming bodies |
//! | [`types`] | Request/response/target value types, status classes |
//! | [`manifest`] | The server capability manifest |
//! | [`config`] | `ClientConfig` |
//! | [`codec`] | Header envelope split/join codec |
//! | [`ports`] | `HttpTransport` and `WebSocketConnector` traits |
//! | [`errors`] | `BareClientError` and friends |

pub mod body;
pub mod codec;
pub mod config;
pub mod errors;
pub mod headers;
pub mod identifiers;
pub mod manifest;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use body::{Body, ByteStream};
pub use config::ClientConfig;
pub use errors::{
    BareClientError, BareError, BareErrorBody, FetchFailure, Result, RetryPolicy, TransportError,
};
pub use headers::{BareHeaderValue, BareHeaders, HeaderList};
pub use identifiers::{is_valid_subprotocol, Subprotocol, VersionId};
pub use manifest::{Maintainer, Manifest, Project};
pub use ports::{
    CloseFrame, CredentialsMode, HttpTransport, TransportRequest, TransportResponse, Transports,
    WebSocketConnection, WebSocketConnector, WsMessage, WsSink, WsStream,
};
pub use types::{
    default_port, is_empty_status, is_redirect_status, CacheMode, EnvelopeOptions,
    RedirectPolicy, RemoteTarget, TunneledRequest, TunneledResponse, STATUS_EMPTY,
    STATUS_REDIRECT,
};
