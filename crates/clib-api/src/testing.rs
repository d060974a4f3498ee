//! Test utilities for clib-api
//!
//! An in-memory [`ClientSocket`] so the protocol and the connection server
//! can be driven without a network listener.
//!
//! # Example
//!
//! ```ignore
//! use clib_api::testing::channel_socket;
//!
//! let (socket, mut client) = channel_socket();
//! tokio::spawn(async move { server.accept(socket).await });
//!
//! client.send(r#"[{"Ping":{"Id":1}}]"#);
//! let reply = client.recv_json().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::socket::ClientSocket;

/// Server half of an in-memory connection
pub struct ChannelSocket {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    terminated: Arc<AtomicBool>,
}

/// Client half of an in-memory connection
pub struct ClientEnd {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<String>,
    terminated: Arc<AtomicBool>,
    timeout: Duration,
}

/// Create a connected socket pair
pub fn channel_socket() -> (ChannelSocket, ClientEnd) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();
    let terminated = Arc::new(AtomicBool::new(false));

    let socket = ChannelSocket {
        inbound,
        outbound,
        terminated: terminated.clone(),
    };
    let client = ClientEnd {
        to_server: Some(to_server),
        from_server,
        terminated,
        timeout: Duration::from_secs(2),
    };
    (socket, client)
}

#[async_trait]
impl ClientSocket for ChannelSocket {
    async fn recv(&mut self) -> Option<Result<String, ProtocolError>> {
        if self.terminated.load(Ordering::SeqCst) {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn send(&mut self, text: String) -> Result<(), ProtocolError> {
        self.outbound
            .send(text)
            .map_err(|_| ProtocolError::Socket("client end dropped".to_string()))
    }

    async fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.inbound.close();
    }
}

impl ClientEnd {
    /// Send a text frame to the server
    pub fn send(&self, text: impl Into<String>) {
        if let Some(tx) = &self.to_server {
            // The server may already have terminated us
            let _ = tx.send(text.into());
        }
    }

    /// Next frame from the server, or `None` if the server hung up or
    /// nothing arrived in time
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(self.timeout, self.from_server.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame parsed as JSON
    ///
    /// Panics if no frame arrives; only meant for tests.
    pub async fn recv_json(&mut self) -> Value {
        let text = self.recv().await.unwrap_or_else(|| panic!("no frame from server"));
        serde_json::from_str(&text).unwrap_or_else(|e| panic!("invalid frame {}: {}", text, e))
    }

    /// Whether the server closed this connection
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Wait until the server drops its half
    pub async fn closed(&mut self) -> bool {
        tokio::time::timeout(self.timeout, async {
            while self.from_server.recv().await.is_some() {}
        })
        .await
        .is_ok()
    }

    /// Hang up
    pub fn disconnect(&mut self) {
        self.to_server = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (mut socket, mut client) = channel_socket();

        client.send("hello");
        assert_eq!(socket.recv().await.unwrap().unwrap(), "hello");

        socket.send("world".to_string()).await.unwrap();
        assert_eq!(client.recv().await.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let (mut socket, mut client) = channel_socket();
        client.disconnect();
        assert!(socket.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_terminate_is_visible_to_client() {
        let (mut socket, mut client) = channel_socket();
        socket.terminate().await;
        assert!(client.is_terminated());
        drop(socket);
        assert!(client.closed().await);
    }
}
