//! Client socket abstraction
//!
//! The protocol only needs text frames in, text frames out, and a way to
//! drop a client. [`WsClientSocket`] adapts an axum WebSocket; tests use the
//! in-memory socket from [`crate::testing`].

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use tracing::{debug, trace};

use crate::error::ProtocolError;

/// A message-oriented client connection carrying text frames
#[async_trait]
pub trait ClientSocket: Send {
    /// Next text frame; `None` once the client has gone away
    async fn recv(&mut self) -> Option<Result<String, ProtocolError>>;

    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<(), ProtocolError>;

    /// Close the connection from the server side
    async fn terminate(&mut self);
}

/// [`ClientSocket`] over an upgraded axum WebSocket
pub struct WsClientSocket {
    inner: WebSocket,
}

impl WsClientSocket {
    pub fn new(inner: WebSocket) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ClientSocket for WsClientSocket {
    async fn recv(&mut self) -> Option<Result<String, ProtocolError>> {
        loop {
            let message = match self.inner.recv().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ProtocolError::Socket(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Binary(bytes) => {
                    return Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|e| ProtocolError::Parse(format!("Binary frame: {}", e))),
                    );
                }
                Message::Close(frame) => {
                    debug!(?frame, "Client closed WebSocket");
                    return None;
                }
                // axum answers pings itself
                Message::Ping(_) | Message::Pong(_) => trace!("Control frame"),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ProtocolError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ProtocolError::Socket(e.to_string()))
    }

    async fn terminate(&mut self) {
        let frame = CloseFrame {
            code: close_code::AGAIN,
            reason: "Another client is already connected".into(),
        };
        if let Err(e) = self.inner.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "Close frame not delivered");
        }
    }
}
