//! Handshake header normalisation shared by both connect paths.

use bare::{BareHeaders, RemoteTarget, Result, Subprotocol};

use crate::protocol::WebSocketRequest;

/// Validates `protocols` and builds the handshake request for `target`.
///
/// Fails with [`bare::BareClientError::InvalidSubprotocol`] before anything is
/// sent. The returned headers carry the target's `Host`, no-cache directives,
/// the upgrade pair, and `Sec-WebSocket-Protocol` when protocols were given.
pub(crate) fn prepare_handshake(
    target: &RemoteTarget,
    mut headers: BareHeaders,
    protocols: &[&str],
) -> Result<WebSocketRequest> {
    let protocols = Subprotocol::parse_all(protocols.iter().copied())?;

    headers.set("Host", target.host_header());
    headers.set("Pragma", "no-cache");
    headers.set("Cache-Control", "no-cache");
    headers.set("Upgrade", "websocket");
    headers.set("Connection", "Upgrade");
    if !protocols.is_empty() {
        let joined = protocols
            .iter()
            .map(Subprotocol::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        headers.set("Sec-WebSocket-Protocol", joined);
    }

    Ok(WebSocketRequest {
        target: target.clone(),
        headers,
        protocols,
    })
}
