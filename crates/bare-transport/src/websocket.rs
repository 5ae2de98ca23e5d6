//! [`WebSocketConnector`] over `tokio-tungstenite`.

use async_trait::async_trait;
use bare::{CloseFrame, TransportError, WebSocketConnection, WebSocketConnector, WsMessage};
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use tracing::{debug, instrument};
use url::Url;

/// Duplex transport backed by `tokio_tungstenite::connect_async`.
///
/// Ping and pong frames are answered by tungstenite and never surface to the
/// tunnel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data.into()),
        WsMessage::Close(frame) => Message::Close(frame.map(|frame| TungsteniteCloseFrame {
            code: CloseCode::from(frame.code),
            reason: frame.reason.into(),
        })),
    }
}

/// Returns `None` for control frames that carry nothing for the tunnel.
pub(crate) fn from_tungstenite(message: Message) -> Option<WsMessage> {
    match message {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data.into())),
        Message::Close(frame) => Some(WsMessage::Close(frame.map(|frame| CloseFrame {
            code: u16::from(frame.code),
            reason: frame.reason.into_owned(),
        }))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

fn connect_error(err: TungsteniteError) -> TransportError {
    match err {
        TungsteniteError::Http(response) => TransportError::Connect(format!(
            "websocket upgrade refused with status {}",
            response.status()
        )),
        other => TransportError::Connect(other.to_string()),
    }
}

fn io_error(err: TungsteniteError) -> TransportError {
    TransportError::Io(err.to_string())
}

#[async_trait]
impl WebSocketConnector for TungsteniteConnector {
    #[instrument(skip_all, fields(url = %url))]
    async fn connect(
        &self,
        url: &Url,
        protocols: &[String],
    ) -> Result<WebSocketConnection, TransportError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        if !protocols.is_empty() {
            let offered = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| TransportError::InvalidRequest(format!("subprotocols: {e}")))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);
        }

        let (socket, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(connect_error)?;
        debug!(status = response.status().as_u16(), "websocket upgraded");

        let (sink, stream) = socket.split();
        let sink = sink
            .sink_map_err(io_error)
            .with(|message: WsMessage| future::ready(Ok::<_, TransportError>(to_tungstenite(message))));
        let stream = stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(message) => from_tungstenite(message).map(Ok),
                Err(err) => Some(Err(io_error(err))),
            })
        });

        Ok(WebSocketConnection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frames_keep_code_and_reason() {
        let frame = CloseFrame {
            code: 4001,
            reason: "going away".into(),
        };
        let wire = to_tungstenite(WsMessage::Close(Some(frame.clone())));
        match &wire {
            Message::Close(Some(close)) => {
                assert_eq!(u16::from(close.code), 4001);
                assert_eq!(close.reason, "going away");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
        assert_eq!(from_tungstenite(wire), Some(WsMessage::Close(Some(frame))));
    }

    #[test]
    fn data_frames_pass_through() {
        assert_eq!(
            from_tungstenite(to_tungstenite("hi".into())),
            Some(WsMessage::Text("hi".into()))
        );
        assert_eq!(
            from_tungstenite(to_tungstenite(vec![1u8, 2].into())),
            Some(WsMessage::Binary(vec![1, 2].into()))
        );
    }

    #[test]
    fn control_frames_are_dropped() {
        assert_eq!(from_tungstenite(Message::Ping(vec![1].into())), None);
        assert_eq!(from_tungstenite(Message::Pong(Vec::new().into())), None);
    }
}
