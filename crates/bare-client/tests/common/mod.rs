//! In-memory transports shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bare::{
    BareHeaders, Body, CredentialsMode, HeaderList, HttpTransport, TransportError,
    TransportRequest, TransportResponse, Transports, WebSocketConnection, WebSocketConnector,
    WsMessage,
};
use bytes::Bytes;
use futures::channel::mpsc as chan;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use url::Url;

pub const SERVER: &str = "https://bare.test/";

pub fn server() -> Url {
    Url::parse(SERVER).unwrap()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// A request as the fake transport saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: Url,
    pub headers: HeaderList,
    pub body: Bytes,
    pub credentials: CredentialsMode,
}

impl Recorded {
    /// The remote URL of a V3 envelope.
    pub fn remote(&self) -> Url {
        Url::parse(self.headers.get("x-bare-url").expect("x-bare-url")).unwrap()
    }

    /// The logical headers of a V3 envelope, reassembled.
    pub fn logical_headers(&self) -> BareHeaders {
        bare::codec::decode_json(&self.headers, "x-bare-headers")
            .unwrap()
            .expect("x-bare-headers")
    }
}

/// What a canned body does after its bytes are read.
#[derive(Debug, Clone)]
pub enum Tail {
    End,
    Stall,
    Fail(TransportError),
}

/// A canned transport response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub tail: Tail,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            tail: Tail::End,
        }
    }

    /// The body never finishes after its bytes.
    pub fn stalling(mut self) -> Self {
        self.tail = Tail::Stall;
        self
    }

    /// The body fails with `error` after its bytes.
    pub fn breaking(mut self, error: TransportError) -> Self {
        self.tail = Tail::Fail(error);
        self
    }

    pub fn manifest(versions: &[&str]) -> Self {
        Self::new(200, serde_json::json!({ "versions": versions }).to_string())
    }

    /// A successful envelope describing a remote response.
    pub fn tunneled(status: u16, headers: &[(&str, &str)], body: impl Into<String>) -> Self {
        let logical: BareHeaders = headers.iter().copied().collect();
        Self::new(200, body)
            .header("x-bare-status", &status.to_string())
            .header("x-bare-status-text", "")
            .header("x-bare-headers", &serde_json::to_string(&logical).unwrap())
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn into_response(self) -> TransportResponse {
        let head = futures::stream::iter([Ok(Bytes::from(self.body))]);
        let body = match self.tail {
            Tail::End => Body::from_stream(head),
            Tail::Stall => Body::from_stream(head.chain(futures::stream::pending())),
            Tail::Fail(error) => {
                Body::from_stream(head.chain(futures::stream::iter([Err(error)])))
            }
        };
        TransportResponse {
            status: self.status,
            status_text: String::new(),
            headers: self.headers.into_iter().collect(),
            body,
        }
    }
}

type Handler = Box<dyn Fn(&Recorded) -> Reply + Send + Sync>;

/// Scripted HTTP transport.
///
/// `GET {SERVER}` is a manifest fetch answered from a queue (the last reply
/// repeats); everything else goes to the handler and is recorded.
pub struct FakeHttp {
    server: Url,
    manifests: Mutex<VecDeque<Reply>>,
    last_manifest: Mutex<Reply>,
    manifest_delay: Duration,
    handler: Handler,
    hang: bool,
    requests: Mutex<Vec<Recorded>>,
    manifest_fetches: AtomicUsize,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self {
            server: server(),
            manifests: Mutex::new(VecDeque::new()),
            last_manifest: Mutex::new(Reply::manifest(&["v1", "v2", "v3"])),
            manifest_delay: Duration::ZERO,
            handler: Box::new(|_| Reply::tunneled(200, &[], "")),
            hang: false,
            requests: Mutex::new(Vec::new()),
            manifest_fetches: AtomicUsize::new(0),
        }
    }

    pub fn manifests(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        *self.manifests.lock().unwrap() = replies.into_iter().collect();
        self
    }

    pub fn manifest_delay(mut self, delay: Duration) -> Self {
        self.manifest_delay = delay;
        self
    }

    pub fn handler(mut self, handler: impl Fn(&Recorded) -> Reply + Send + Sync + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Never answers tunneled requests.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn manifest_fetches(&self) -> usize {
        self.manifest_fetches.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn next_manifest(&self) -> Reply {
        let mut queue = self.manifests.lock().unwrap();
        let mut last = self.last_manifest.lock().unwrap();
        if let Some(reply) = queue.pop_front() {
            *last = reply;
        }
        last.clone()
    }
}

#[async_trait]
impl HttpTransport for FakeHttp {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let body = request.body.collect().await?;
        if request.method == "GET" && request.url == self.server {
            self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
            if !self.manifest_delay.is_zero() {
                tokio::time::sleep(self.manifest_delay).await;
            }
            let reply = self.next_manifest();
            if reply.status == 0 {
                return Err(TransportError::Connect("connection refused".into()));
            }
            return Ok(reply.into_response());
        }

        let recorded = Recorded {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
            credentials: request.credentials,
        };
        self.requests.lock().unwrap().push(recorded.clone());
        if self.hang {
            futures::future::pending::<()>().await;
        }
        Ok((self.handler)(&recorded).into_response())
    }
}

/// A reply that makes the fake fail at the transport level.
pub fn refused() -> Reply {
    Reply::new(0, "")
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// The intermediary's end of one fake WebSocket connection.
pub struct ServerEnd {
    pub url: Url,
    pub protocols: Vec<String>,
    from_client: chan::UnboundedReceiver<WsMessage>,
    to_client: chan::UnboundedSender<Result<WsMessage, TransportError>>,
}

impl ServerEnd {
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.from_client.next().await
    }

    /// Receives the connect request and parses it.
    pub async fn recv_json(&mut self) -> serde_json::Value {
        match self.recv().await {
            Some(WsMessage::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    pub fn send(&self, message: impl Into<WsMessage>) {
        self.to_client.unbounded_send(Ok(message.into())).unwrap();
    }

    pub fn send_open(&self, protocol: &str) {
        self.send(serde_json::json!({ "type": "open", "protocol": protocol }).to_string());
    }

    pub fn fail(&self, error: TransportError) {
        self.to_client.unbounded_send(Err(error)).unwrap();
    }
}

/// WebSocket connector whose peers are handed to the test.
pub struct FakeConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            connects: AtomicUsize::new(0),
        });
        (connector, incoming)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSocketConnector for FakeConnector {
    async fn connect(
        &self,
        url: &Url,
        protocols: &[String],
    ) -> Result<WebSocketConnection, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (client_tx, from_client) = chan::unbounded();
        let (to_client, client_rx) = chan::unbounded();
        self.accepted
            .send(ServerEnd {
                url: url.clone(),
                protocols: protocols.to_vec(),
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Connect("no server listening".into()))?;
        Ok(WebSocketConnection {
            sink: Box::pin(client_tx.sink_map_err(|e| TransportError::Io(e.to_string()))),
            stream: Box::pin(client_rx),
        })
    }
}

/// Transports over the two fakes.
pub fn transports(http: &Arc<FakeHttp>, ws: &Arc<FakeConnector>) -> Transports {
    Transports::new(http.clone(), ws.clone())
}
