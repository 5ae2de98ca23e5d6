//! Tunneled WebSocket sessions.
//!
//! A session has two parts:
//!
//! - [`Session`] is a pure reducer over transport inputs. It owns the
//!   handshake: send the connect message once the transport opens, expect one
//!   text `open` message, then relay every frame verbatim.
//! - A driver task owns the transport halves, feeds inputs to the reducer,
//!   and publishes its outputs to the caller's [`TunnelSocket`].
//!
//! ```text
//! Connecting ──transport open──▶ AwaitingAck ──"open"──▶ Relaying
//!      │                              │                     │
//!      └───────── failure / close ────┴─────────────────────┴──▶ Closed
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use bare::{
    BareClientError, CloseFrame, Result, TransportError, WebSocketConnector, WsMessage, WsSink,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// Readiness of a [`TunnelSocket`] as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Waiting for the transport and the intermediary's `open` message.
    Connecting,
    /// Relaying frames.
    Open,
    /// The session is over.
    Closed,
}

/// Something that happened on a tunneled WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub enum TunnelEvent {
    /// The intermediary acknowledged the connection.
    Open {
        /// Subprotocol the remote selected; empty if none.
        protocol: String,
        /// `Set-Cookie` values from the remote's handshake response.
        set_cookies: Vec<String>,
    },
    /// A frame from the remote, relayed verbatim.
    Message(WsMessage),
    /// The session failed. A [`TunnelEvent::Close`] follows.
    Error(BareClientError),
    /// The session closed.
    Close(Option<CloseFrame>),
}

#[derive(Debug)]
enum Command {
    Send(WsMessage),
    Close(Option<CloseFrame>),
}

/// The caller's handle on a tunneled WebSocket.
///
/// Dropping the handle closes the session.
#[derive(Debug)]
pub struct TunnelSocket {
    url: Url,
    state: watch::Receiver<ReadyState>,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<TunnelEvent>,
    protocol: Arc<OnceLock<String>>,
}

impl TunnelSocket {
    /// The remote URL this socket is tunneled to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current readiness.
    pub fn ready_state(&self) -> ReadyState {
        *self.state.borrow()
    }

    /// Subprotocol selected by the remote, once open.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.get().map(String::as_str)
    }

    /// Queues a frame for the remote.
    ///
    /// Fails with [`BareClientError::NotOpen`] unless the socket is open.
    pub fn send(&self, message: impl Into<WsMessage>) -> Result<()> {
        if self.ready_state() != ReadyState::Open {
            return Err(BareClientError::NotOpen);
        }
        let command = match message.into() {
            WsMessage::Close(frame) => Command::Close(frame),
            message => Command::Send(message),
        };
        self.commands
            .send(command)
            .map_err(|_| BareClientError::NotOpen)
    }

    /// Closes the session. Closing a closed socket does nothing.
    pub fn close(&self, frame: Option<CloseFrame>) {
        let _ = self.commands.send(Command::Close(frame));
    }

    /// Waits for the next event; `None` once the session is over and every
    /// event has been taken.
    pub async fn next_event(&mut self) -> Option<TunnelEvent> {
        self.events.recv().await
    }

    /// Waits until the socket opens and returns the selected subprotocol.
    ///
    /// Consumes events up to and including the `Open` event.
    pub async fn wait_open(&mut self) -> Result<String> {
        loop {
            match self.events.recv().await {
                Some(TunnelEvent::Open { protocol, .. }) => return Ok(protocol),
                Some(TunnelEvent::Error(err)) => return Err(err),
                Some(TunnelEvent::Message(_)) => continue,
                Some(TunnelEvent::Close(_)) | None => {
                    return Err(TransportError::Io("tunnel closed before opening".into()).into())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Connecting,
    AwaitingAck,
    Relaying,
    Closed,
}

#[derive(Debug)]
pub(crate) enum SessionInput {
    TransportOpened,
    Received(WsMessage),
    TransportFailed(TransportError),
    TransportEnded,
    LocalClose(Option<CloseFrame>),
}

#[derive(Debug, PartialEq)]
pub(crate) enum SessionOutput {
    Transmit(WsMessage),
    Opened {
        protocol: String,
        set_cookies: Vec<String>,
    },
    Relay(WsMessage),
    Failed(BareClientError),
    Closed(Option<CloseFrame>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenMessage {
    #[serde(default)]
    protocol: String,
    #[serde(default)]
    set_cookies: Vec<String>,
}

fn parse_open(text: &str) -> Result<OpenMessage> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| BareClientError::malformed("open message", e))?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if kind != "open" {
        return Err(BareClientError::UnexpectedMessageType(kind.to_string()));
    }
    serde_json::from_value(value).map_err(|e| BareClientError::malformed("open message", e))
}

/// Handshake and relay state of one session.
#[derive(Debug)]
pub(crate) struct Session {
    state: SessionState,
    connect_message: Option<String>,
}

impl Session {
    pub(crate) fn new(connect_message: String) -> Self {
        Self {
            state: SessionState::Connecting,
            connect_message: Some(connect_message),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn step(&mut self, input: SessionInput) -> Vec<SessionOutput> {
        use SessionInput as In;
        use SessionState as S;

        match (self.state, input) {
            (S::Closed, _) => Vec::new(),
            (_, In::TransportFailed(err)) => self.fail(err.into()),
            (_, In::TransportEnded) => self.close(None),
            (_, In::LocalClose(frame)) | (_, In::Received(WsMessage::Close(frame))) => {
                self.close(frame)
            }
            (S::Connecting, In::TransportOpened) => {
                self.state = S::AwaitingAck;
                let message = self.connect_message.take().unwrap_or_default();
                vec![SessionOutput::Transmit(WsMessage::Text(message))]
            }
            (_, In::TransportOpened) => Vec::new(),
            (S::Connecting, In::Received(_)) => {
                self.fail(BareClientError::malformed("tunnel", "frame before transport open"))
            }
            (S::AwaitingAck, In::Received(WsMessage::Binary(_))) => {
                self.fail(BareClientError::UnexpectedFrameType)
            }
            (S::AwaitingAck, In::Received(WsMessage::Text(text))) => match parse_open(&text) {
                Ok(open) => {
                    self.state = S::Relaying;
                    vec![SessionOutput::Opened {
                        protocol: open.protocol,
                        set_cookies: open.set_cookies,
                    }]
                }
                Err(err) => self.fail(err),
            },
            (S::Relaying, In::Received(message)) => vec![SessionOutput::Relay(message)],
        }
    }

    fn close(&mut self, frame: Option<CloseFrame>) -> Vec<SessionOutput> {
        self.state = SessionState::Closed;
        vec![SessionOutput::Closed(frame)]
    }

    fn fail(&mut self, err: BareClientError) -> Vec<SessionOutput> {
        self.state = SessionState::Closed;
        vec![SessionOutput::Failed(err), SessionOutput::Closed(None)]
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Starts a session on the current Tokio runtime and returns its handle.
///
/// `endpoint` is the intermediary's WebSocket endpoint, `remote` the URL the
/// caller asked for, and `connect_message` the version-specific connect
/// request sent once the transport opens.
pub(crate) fn spawn_session(
    connector: Arc<dyn WebSocketConnector>,
    endpoint: Url,
    remote: Url,
    connect_message: String,
) -> Result<TunnelSocket> {
    let runtime =
        tokio::runtime::Handle::try_current().map_err(|_| BareClientError::NoRuntime)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ReadyState::Connecting);
    let protocol = Arc::new(OnceLock::new());

    let span = info_span!("tunnel", endpoint = %endpoint, remote = %remote);
    let driver = Driver {
        session: Session::new(connect_message),
        events: events_tx,
        state: state_tx,
        protocol: Arc::clone(&protocol),
    };
    runtime.spawn(driver.run(connector, endpoint, commands_rx).instrument(span));

    Ok(TunnelSocket {
        url: remote,
        state: state_rx,
        commands: commands_tx,
        events: events_rx,
        protocol,
    })
}

struct Driver {
    session: Session,
    events: mpsc::UnboundedSender<TunnelEvent>,
    state: watch::Sender<ReadyState>,
    protocol: Arc<OnceLock<String>>,
}

impl Driver {
    async fn run(
        mut self,
        connector: Arc<dyn WebSocketConnector>,
        endpoint: Url,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let connection = match connector.connect(&endpoint, &[]).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(error = %err, "tunnel transport failed to connect");
                for output in self.session.step(SessionInput::TransportFailed(err)) {
                    self.publish(output);
                }
                return;
            }
        };
        let mut sink = connection.sink;
        let mut stream = connection.stream;
        debug!("tunnel transport open, sending connect request");

        let outputs = self.session.step(SessionInput::TransportOpened);
        self.apply(outputs, &mut sink).await;

        while self.session.state() != SessionState::Closed {
            let input = tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(message)) => SessionInput::Received(message),
                    Some(Err(err)) => SessionInput::TransportFailed(err),
                    None => SessionInput::TransportEnded,
                },
                command = commands.recv() => match command {
                    Some(Command::Send(message)) => match sink.send(message).await {
                        Ok(()) => continue,
                        Err(err) => SessionInput::TransportFailed(err),
                    },
                    Some(Command::Close(frame)) => {
                        let _ = sink.send(WsMessage::Close(frame.clone())).await;
                        SessionInput::LocalClose(frame)
                    }
                    None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        SessionInput::LocalClose(None)
                    }
                },
            };
            let outputs = self.session.step(input);
            self.apply(outputs, &mut sink).await;
        }
    }

    async fn apply(&mut self, outputs: Vec<SessionOutput>, sink: &mut WsSink) {
        let mut queue = VecDeque::from(outputs);
        while let Some(output) = queue.pop_front() {
            match output {
                SessionOutput::Transmit(message) => {
                    if let Err(err) = sink.send(message).await {
                        queue.extend(self.session.step(SessionInput::TransportFailed(err)));
                    }
                }
                SessionOutput::Closed(frame) => {
                    let _ = sink.close().await;
                    self.publish(SessionOutput::Closed(frame));
                }
                other => self.publish(other),
            }
        }
    }

    /// Publishes an output that needs no transport.
    fn publish(&self, output: SessionOutput) {
        match output {
            SessionOutput::Transmit(_) => {
                debug!("dropping frame for a transport that never opened");
            }
            SessionOutput::Opened {
                protocol,
                set_cookies,
            } => {
                debug!(protocol = %protocol, "tunnel open");
                let _ = self.protocol.set(protocol.clone());
                self.state.send_replace(ReadyState::Open);
                self.emit(TunnelEvent::Open {
                    protocol,
                    set_cookies,
                });
            }
            SessionOutput::Relay(message) => self.emit(TunnelEvent::Message(message)),
            SessionOutput::Failed(err) => {
                warn!(error = %err, "tunnel session failed");
                self.emit(TunnelEvent::Error(err));
            }
            SessionOutput::Closed(frame) => {
                debug!(?frame, "tunnel closed");
                self.state.send_replace(ReadyState::Closed);
                self.emit(TunnelEvent::Close(frame));
            }
        }
    }

    fn emit(&self, event: TunnelEvent) {
        // The caller may have dropped its handle; events are then moot.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn awaiting_ack() -> Session {
        let mut session = Session::new(r#"{"type":"connect"}"#.into());
        let outputs = session.step(SessionInput::TransportOpened);
        assert_eq!(
            outputs,
            [SessionOutput::Transmit(WsMessage::Text(r#"{"type":"connect"}"#.into()))]
        );
        assert_eq!(session.state(), SessionState::AwaitingAck);
        session
    }

    #[test]
    fn open_message_moves_to_relaying() {
        let mut session = awaiting_ack();
        let outputs = session.step(SessionInput::Received(
            r#"{"type":"open","protocol":"chat","setCookies":["a=1"]}"#.into(),
        ));
        assert_eq!(
            outputs,
            [SessionOutput::Opened {
                protocol: "chat".into(),
                set_cookies: vec!["a=1".into()],
            }]
        );
        assert_eq!(session.state(), SessionState::Relaying);

        let outputs = session.step(SessionInput::Received(WsMessage::Binary(vec![1, 2].into())));
        assert_eq!(outputs, [SessionOutput::Relay(WsMessage::Binary(vec![1, 2].into()))]);
    }

    #[test]
    fn binary_acknowledgement_fails_the_session() {
        let mut session = awaiting_ack();
        let outputs = session.step(SessionInput::Received(WsMessage::Binary(vec![0].into())));
        assert_eq!(
            outputs,
            [
                SessionOutput::Failed(BareClientError::UnexpectedFrameType),
                SessionOutput::Closed(None),
            ]
        );
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn wrong_message_type_fails_the_session() {
        let mut session = awaiting_ack();
        let outputs = session.step(SessionInput::Received(r#"{"type":"error"}"#.into()));
        assert_eq!(
            outputs[0],
            SessionOutput::Failed(BareClientError::UnexpectedMessageType("error".into()))
        );
    }

    #[test]
    fn unparseable_acknowledgement_is_malformed() {
        let mut session = awaiting_ack();
        let outputs = session.step(SessionInput::Received("not json".into()));
        assert!(matches!(
            outputs[0],
            SessionOutput::Failed(BareClientError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn remote_close_during_handshake_closes_without_open() {
        let mut session = awaiting_ack();
        let frame = CloseFrame {
            code: 1011,
            reason: "remote refused".into(),
        };
        let outputs = session.step(SessionInput::Received(WsMessage::Close(Some(frame.clone()))));
        assert_eq!(outputs, [SessionOutput::Closed(Some(frame))]);
    }

    #[test]
    fn closed_session_ignores_everything() {
        let mut session = awaiting_ack();
        session.step(SessionInput::TransportEnded);
        assert!(session.step(SessionInput::Received("late".into())).is_empty());
        assert!(session.step(SessionInput::LocalClose(None)).is_empty());
    }

    #[test]
    fn connect_failure_fails_before_any_transmit() {
        let mut session = Session::new(String::new());
        let outputs = session.step(SessionInput::TransportFailed(TransportError::Connect(
            "refused".into(),
        )));
        assert_eq!(
            outputs,
            [
                SessionOutput::Failed(BareClientError::Transport(TransportError::Connect(
                    "refused".into()
                ))),
                SessionOutput::Closed(None),
            ]
        );
    }
}
