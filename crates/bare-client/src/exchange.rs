//! Plumbing shared by every protocol variant's HTTP path.

use std::future::Future;

use bare::{
    is_empty_status, BareClientError, BareError, BareErrorBody, BareHeaders, Body, HeaderList,
    HttpTransport, RemoteTarget, Result, TransportError, TransportRequest, TransportResponse,
    TunneledResponse,
};
use futures::{stream, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

/// Races `operation` against `cancel`, failing with `Cancelled` if the token
/// fires first. An already-cancelled token fails without polling `operation`.
pub(crate) async fn cancellable<T, F>(cancel: Option<&CancellationToken>, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(BareClientError::Cancelled),
            outcome = operation => outcome,
        },
        None => operation.await,
    }
}

/// Sends one transport request, honouring `cancel`.
pub(crate) async fn send(
    http: &dyn HttpTransport,
    request: TransportRequest,
    cancel: Option<&CancellationToken>,
) -> Result<TransportResponse> {
    cancellable(cancel, async { Ok(http.send(request).await?) }).await
}

/// Turns a non-success transport response into the intermediary's
/// [`BareError`]; success responses pass through.
pub(crate) async fn reject_bare_error(response: TransportResponse) -> Result<TransportResponse> {
    if response.ok() {
        return Ok(response);
    }
    let status = response.status;
    let payload = response.body.text().await?;
    let body = BareErrorBody::from_payload(&payload);
    warn!(status, code = %body.code, id = %body.id, "bare server rejected the request");
    Err(BareError { status, body }.into())
}

/// Ties a response body to `cancel`: once the token fires, the next read
/// fails with [`TransportError::Cancelled`] and the transport stream is
/// dropped.
pub(crate) fn cancellable_body(body: Body, cancel: Option<&CancellationToken>) -> Body {
    let token = match (cancel, &body) {
        (Some(token), Body::Stream(_)) => token.clone(),
        _ => return body,
    };
    let chunks = stream::unfold(Some((body.into_stream(), token)), |state| async move {
        let (mut chunks, token) = state?;
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            next = chunks.next() => Some(next),
        };
        match next {
            None => Some((Err(TransportError::Cancelled), None)),
            Some(item) => item.map(|item| (item, Some((chunks, token)))),
        }
    });
    Body::from_stream(chunks)
}

/// `{server}/v{N}/`, resolved relative to the server URL.
pub(crate) fn endpoint(server: &Url, version: &str) -> Result<Url> {
    Ok(server.join(&format!("./{version}/"))?)
}

/// The WebSocket twin of an HTTP endpoint: `https` becomes `wss`, anything
/// else `ws`.
pub(crate) fn websocket_endpoint(http: &Url) -> Result<Url> {
    let mut ws = http.clone();
    let scheme = if http.scheme() == "https" { "wss" } else { "ws" };
    ws.set_scheme(scheme)
        .map_err(|()| BareClientError::InvalidUrl(format!("cannot derive a websocket url from {http}")))?;
    Ok(ws)
}

/// Appends the content-addressed `cache` parameter to an endpoint, so caches
/// key on the proxied resource rather than the shared endpoint.
pub(crate) fn cache_busted(endpoint: &Url, key: &str) -> Url {
    let digest = Sha256::digest(key.as_bytes());
    let mut url = endpoint.clone();
    url.set_query(Some(&format!("cache={digest:x}")));
    url
}

/// A remote target spelled out field by field, as V1 and V2 envelopes carry
/// it.
#[derive(Debug, Serialize)]
pub(crate) struct DecomposedTarget<'a> {
    protocol: String,
    host: &'a str,
    port: u16,
    path: &'a str,
}

impl<'a> DecomposedTarget<'a> {
    pub(crate) fn new(target: &'a RemoteTarget) -> Self {
        Self {
            protocol: target.protocol(),
            host: &target.host,
            port: target.port,
            path: &target.path,
        }
    }

    /// Writes `x-bare-protocol`, `x-bare-host`, `x-bare-port`, `x-bare-path`.
    pub(crate) fn write_envelope(&self, headers: &mut HeaderList) {
        headers.set("x-bare-protocol", self.protocol.as_str());
        headers.set("x-bare-host", self.host);
        headers.set("x-bare-port", self.port.to_string());
        headers.set("x-bare-path", self.path);
    }

    /// Key for the cache-busting parameter.
    pub(crate) fn cache_key(&self) -> String {
        format!("{}//{}:{}{}", self.protocol, self.host, self.port, self.path)
    }
}

/// Status line and headers of the remote response, as read from the envelope.
#[derive(Debug)]
pub(crate) struct ResponseMeta {
    pub(crate) status: u16,
    pub(crate) status_text: String,
    pub(crate) headers: BareHeaders,
}

impl ResponseMeta {
    /// Reads `x-bare-status` and `x-bare-status-text` from `envelope`. Each
    /// falls back to the transport's own status line when absent.
    pub(crate) fn from_envelope(
        response: &TransportResponse,
        envelope: &HeaderList,
        headers: Option<BareHeaders>,
    ) -> Result<Self> {
        let status = match envelope.get("x-bare-status") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| BareClientError::malformed("x-bare-status", e))?,
            None => response.status,
        };
        let status_text = envelope
            .get("x-bare-status-text")
            .map_or_else(|| response.status_text.clone(), str::to_string);
        Ok(Self {
            status,
            status_text,
            headers: headers.unwrap_or_default(),
        })
    }

    /// Pairs the metadata with the transport body, untouched unless the
    /// status forbids a body. Reads of the body stay subject to `cancel`.
    pub(crate) fn into_response(
        self,
        body: Body,
        cancel: Option<&CancellationToken>,
    ) -> TunneledResponse {
        let body = if is_empty_status(self.status) {
            Body::Empty
        } else {
            cancellable_body(body, cancel)
        };
        TunneledResponse {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body,
        }
    }
}
