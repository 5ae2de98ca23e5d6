//! Protocol version 3: the whole remote URL travels in `x-bare-url`.

use std::sync::Arc;

use async_trait::async_trait;
use bare::codec;
use bare::{
    BareHeaders, HeaderList, Result, Subprotocol, TransportRequest, TunneledRequest,
    TunneledResponse, VersionId,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

use crate::exchange::{self, ResponseMeta};
use crate::protocol::{ClientContext, ProtocolClient, WebSocketRequest};
use crate::tunnel::{self, TunnelSocket};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    remote: &'a str,
    protocols: &'a [Subprotocol],
    headers: &'a BareHeaders,
    forward_headers: &'a [String],
}

/// Client for a V3 Bare server.
#[derive(Debug)]
pub struct ClientV3 {
    http: Url,
    ws: Url,
    context: ClientContext,
}

impl ClientV3 {
    /// Version tag in the manifest.
    pub const VERSION: &'static str = "v3";

    /// Binds to `{server}/v3/`.
    pub fn new(context: &ClientContext) -> Result<Self> {
        let http = exchange::endpoint(&context.server, Self::VERSION)?;
        let ws = exchange::websocket_endpoint(&http)?;
        Ok(Self {
            http,
            ws,
            context: context.clone(),
        })
    }

    /// [`crate::ClientConstructor`] for the version table.
    pub fn construct(context: &ClientContext) -> Result<Arc<dyn ProtocolClient>> {
        Ok(Arc::new(Self::new(context)?))
    }

    fn envelope(&self, request: &TunneledRequest, remote: &Url) -> Result<HeaderList> {
        let mut headers = HeaderList::new();
        headers.set("x-bare-url", remote.as_str());
        codec::encode_json(
            &mut headers,
            "x-bare-headers",
            &request.headers,
            Some(self.context.config.max_header_value_len),
        )?;
        for name in &request.envelope.forward_headers {
            headers.append("x-bare-forward-headers", name.as_str());
        }
        for name in &request.envelope.pass_headers {
            headers.append("x-bare-pass-headers", name.as_str());
        }
        for status in &request.envelope.pass_status {
            headers.append("x-bare-pass-status", status.to_string());
        }
        Ok(headers)
    }
}

#[async_trait]
impl ProtocolClient for ClientV3 {
    fn version(&self) -> VersionId {
        VersionId::v3()
    }

    #[instrument(skip_all, fields(version = "v3", method = %request.method))]
    async fn request(
        &self,
        request: TunneledRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<TunneledResponse> {
        let remote = request.target.to_url()?;
        let headers = self.envelope(&request, &remote)?;

        let mut outgoing =
            TransportRequest::new(request.method, exchange::cache_busted(&self.http, remote.as_str()));
        outgoing.headers = headers;
        outgoing.body = request.body;
        outgoing.cache = request.cache;

        let response = exchange::send(&*self.context.transports.http, outgoing, cancel).await?;
        let response = exchange::reject_bare_error(response).await?;

        let logical = codec::decode_json::<BareHeaders>(&response.headers, "x-bare-headers")?;
        let meta = ResponseMeta::from_envelope(&response, &response.headers, logical)?;
        Ok(meta.into_response(response.body, cancel))
    }

    fn connect(&self, request: WebSocketRequest) -> Result<TunnelSocket> {
        let remote = request.target.to_url()?;
        let message = ConnectMessage {
            kind: "connect",
            remote: remote.as_str(),
            protocols: &request.protocols,
            headers: &request.headers,
            forward_headers: &[],
        };
        let message = serde_json::to_string(&message)
            .map_err(|e| bare::BareClientError::malformed("connect message", e))?;
        tunnel::spawn_session(
            Arc::clone(&self.context.transports.websocket),
            self.ws.clone(),
            remote,
            message,
        )
    }
}
