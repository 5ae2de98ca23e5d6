//! Request and response bodies.
//!
//! A [`Body`] is either absent, fully buffered, or a byte stream. Tunneled
//! response bodies are always handed back as the transport produced them:
//! the client never buffers a stream on the caller's behalf.

use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};

use crate::TransportError;

/// Boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// A request or response body.
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// A buffered body; can be replayed.
    Full(Bytes),
    /// A streaming body; can be consumed once.
    Stream(ByteStream),
}

impl Body {
    /// Creates an empty body.
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Wraps a chunk stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Returns `true` for [`Body::Empty`] and zero-length buffered bodies.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Full(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// Returns a copy of the body if it can be sent again.
    ///
    /// Streams cannot be replayed and yield `None`.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Full(bytes) => Some(Self::Full(bytes.clone())),
            Self::Stream(_) => None,
        }
    }

    /// Converts the body into a chunk stream.
    pub fn into_stream(self) -> ByteStream {
        match self {
            Self::Empty => Box::pin(stream::empty()),
            Self::Full(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            Self::Stream(s) => s,
        }
    }

    /// Reads the whole body into memory.
    pub async fn collect(self) -> Result<Bytes, TransportError> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Full(bytes) => Ok(bytes),
            Self::Stream(mut s) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = s.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Reads the whole body as UTF-8 text, replacing invalid sequences.
    pub async fn text(self) -> Result<String, TransportError> {
        let bytes = self.collect().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Full(bytes.into())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Full(text.into())
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Full(Bytes::from_static(text.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_body_is_collected_in_order() {
        let chunks = vec![Ok(Bytes::from("hel")), Ok(Bytes::from("lo"))];
        let body = Body::from_stream(stream::iter(chunks));
        assert_eq!(body.text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn stream_error_surfaces_from_collect() {
        let chunks = vec![Ok(Bytes::from("a")), Err(TransportError::Io("reset".into()))];
        let err = Body::from_stream(stream::iter(chunks)).collect().await.unwrap_err();
        assert_eq!(err, TransportError::Io("reset".into()));
    }

    #[test]
    fn only_buffered_bodies_replay() {
        assert!(Body::from("x").try_clone().is_some());
        assert!(Body::empty().try_clone().is_some());
        assert!(Body::from_stream(stream::empty()).try_clone().is_none());
    }
}
