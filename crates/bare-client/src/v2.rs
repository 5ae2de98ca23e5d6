//! Protocol version 2: the target travels field by field and oversized
//! header blobs are split.

use std::sync::Arc;

use async_trait::async_trait;
use bare::codec;
use bare::{
    BareClientError, BareHeaders, HeaderList, Result, Subprotocol, TransportRequest,
    TunneledRequest, TunneledResponse, VersionId,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

use crate::exchange::{self, DecomposedTarget, ResponseMeta};
use crate::protocol::{ClientContext, ProtocolClient, WebSocketRequest};
use crate::tunnel::{self, TunnelSocket};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    remote: DecomposedTarget<'a>,
    protocols: &'a [Subprotocol],
    headers: &'a BareHeaders,
    forward_headers: &'a [String],
}

/// Client for a V2 Bare server.
#[derive(Debug)]
pub struct ClientV2 {
    http: Url,
    ws: Url,
    context: ClientContext,
}

impl ClientV2 {
    /// Version tag in the manifest.
    pub const VERSION: &'static str = "v2";

    /// Binds to `{server}/v2/`.
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
}

#[async_trait]
impl ProtocolClient for ClientV2 {
    fn version(&self) -> VersionId {
        VersionId::v2()
    }

    #[instrument(skip_all, fields(version = "v2", method = %request.method))]
    async fn request(
        &self,
        request: TunneledRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<TunneledResponse> {
        let target = DecomposedTarget::new(&request.target);
        let mut headers = HeaderList::new();
        target.write_envelope(&mut headers);
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
        let url = exchange::cache_busted(&self.http, &target.cache_key());

        let mut outgoing = TransportRequest::new(request.method, url);
        outgoing.headers = headers;
        outgoing.body = request.body;
        outgoing.cache = request.cache;

        let response = exchange::send(&*self.context.transports.http, outgoing, cancel).await?;
        let response = exchange::reject_bare_error(response).await?;

        let mut envelope = response.headers.clone();
        codec::join_field(&mut envelope, "x-bare-headers")?;
        let logical = envelope
            .get("x-bare-headers")
            .map(|json| {
                serde_json::from_str::<BareHeaders>(json)
                    .map_err(|e| BareClientError::malformed("x-bare-headers", e))
            })
            .transpose()?;
        let meta = ResponseMeta::from_envelope(&response, &envelope, logical)?;
        Ok(meta.into_response(response.body, cancel))
    }

    fn connect(&self, request: WebSocketRequest) -> Result<TunnelSocket> {
        let remote = request.target.to_url()?;
        let message = ConnectMessage {
            kind: "connect",
            remote: DecomposedTarget::new(&request.target),
            protocols: &request.protocols,
            headers: &request.headers,
            forward_headers: &[],
        };
        let message = serde_json::to_string(&message)
            .map_err(|e| BareClientError::malformed("connect message", e))?;
        tunnel::spawn_session(
            Arc::clone(&self.context.transports.websocket),
            self.ws.clone(),
            remote,
            message,
        )
    }
}
