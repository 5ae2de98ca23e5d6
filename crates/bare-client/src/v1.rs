//! Protocol version 1, the original envelope: one unsplit header blob and no
//! pass-through instructions.

use std::sync::Arc;

use async_trait::async_trait;
use bare::codec;
use bare::{
    BareClientError, BareHeaders, HeaderList, Result, Subprotocol, TransportRequest,
    TunneledRequest, TunneledResponse, VersionId,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::exchange::{self, DecomposedTarget, ResponseMeta};
use crate::protocol::{ClientContext, ProtocolClient, WebSocketRequest};
use crate::tunnel::{self, TunnelSocket};

// V1 servers read snake_case field names.
#[derive(Serialize)]
struct ConnectMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    remote: DecomposedTarget<'a>,
    protocols: &'a [Subprotocol],
    headers: &'a BareHeaders,
    forward_headers: &'a [String],
}

/// Client for a V1 Bare server.
#[derive(Debug)]
pub struct ClientV1 {
    http: Url,
    ws: Url,
    context: ClientContext,
}

impl ClientV1 {
    /// Version tag in the manifest.
    pub const VERSION: &'static str = "v1";

    /// Binds to `{server}/v1/`.
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
impl ProtocolClient for ClientV1 {
    fn version(&self) -> VersionId {
        VersionId::v1()
    }

    #[instrument(skip_all, fields(version = "v1", method = %request.method))]
    async fn request(
        &self,
        request: TunneledRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<TunneledResponse> {
        if !request.envelope.pass_headers.is_empty() || !request.envelope.pass_status.is_empty() {
            debug!("v1 envelopes cannot carry pass-through instructions; ignoring them");
        }

        let mut headers = HeaderList::new();
        DecomposedTarget::new(&request.target).write_envelope(&mut headers);
        codec::encode_json(&mut headers, "x-bare-headers", &request.headers, None)?;
        codec::encode_json(
            &mut headers,
            "x-bare-forward-headers",
            &request.envelope.forward_headers,
            None,
        )?;

        let mut outgoing = TransportRequest::new(request.method, self.http.clone());
        outgoing.headers = headers;
        outgoing.body = request.body;
        outgoing.cache = request.cache;

        let response = exchange::send(&*self.context.transports.http, outgoing, cancel).await?;
        let response = exchange::reject_bare_error(response).await?;

        let logical = response
            .headers
            .get("x-bare-headers")
            .map(|json| {
                serde_json::from_str::<BareHeaders>(json)
                    .map_err(|e| BareClientError::malformed("x-bare-headers", e))
            })
            .transpose()?;
        let meta = ResponseMeta::from_envelope(&response, &response.headers, logical)?;
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
