//! WebSocket Transport
//!
//! The client talks to the socket only through [`Connector`], which yields a
//! frame sink and a frame stream. The production connector is backed by
//! `tokio-tungstenite`; tests plug in an in-memory one.

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

/// Normal closure status code
pub const CLOSE_NORMAL: u16 = 1000;

/// A single WebSocket frame, independent of the underlying library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

impl Frame {
    /// Normal-closure frame
    pub fn close_normal(reason: impl Into<String>) -> Self {
        Frame::Close {
            code: CLOSE_NORMAL,
            reason: reason.into(),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.to_string()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(data) => Frame::Ping(data.to_vec()),
            Message::Pong(data) => Frame::Pong(data.to_vec()),
            Message::Close(Some(close)) => Frame::Close {
                code: u16::from(close.code),
                reason: close.reason.to_string(),
            },
            Message::Close(None) => Frame::Close {
                code: CLOSE_NORMAL,
                reason: String::new(),
            },
            other => Frame::Binary(other.into_data().to_vec()),
        }
    }
}

/// Outbound half of an open connection
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of an open connection
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An open WebSocket, split into its two halves
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens WebSocket connections
///
/// `connect` resolves once the socket is open (handshake complete) and fails
/// if the socket errors before that point.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Url) -> Result<Connection, TransportError>;
}

/// Errors raised by the transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Connection closed")]
    Closed,
}

/// Production connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Connection, TransportError> {
        let (ws_stream, response) = connect_async(endpoint.as_str()).await?;
        tracing::debug!(
            endpoint = %endpoint,
            status = %response.status(),
            "WebSocket handshake complete"
        );

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<Message, TransportError>(frame.into())));
        let stream = read.map(|result| result.map(Frame::from).map_err(TransportError::from));

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_conversion() {
        let message: Message = Frame::close_normal("bye").into();
        match message {
            Message::Close(Some(close)) => {
                assert_eq!(u16::from(close.code), CLOSE_NORMAL);
                assert_eq!(close.reason.as_str(), "bye");
            }
            _ => panic!("Expected Close"),
        }
    }

    #[test]
    fn test_message_to_frame() {
        assert_eq!(
            Frame::from(Message::Text("hi".into())),
            Frame::Text("hi".to_string())
        );
        assert_eq!(
            Frame::from(Message::Pong(vec![1, 2, 3].into())),
            Frame::Pong(vec![1, 2, 3])
        );
        assert_eq!(
            Frame::from(Message::Close(None)),
            Frame::Close {
                code: CLOSE_NORMAL,
                reason: String::new()
            }
        );
    }
}
