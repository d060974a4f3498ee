//! Connection server
//!
//! Accepts client sockets and enforces a single live protocol connection. A
//! client arriving while another is connected is terminated at once; the
//! slot frees when the active connection ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clib_core::PowerSink;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::connection::{ProtocolConnection, ProtocolOptions};
use crate::socket::ClientSocket;

pub struct ConnectionServer {
    sink: Arc<dyn PowerSink>,
    options: ProtocolOptions,
    active: Arc<Mutex<Option<u64>>>,
    next_connection: AtomicU64,
}

/// Holds the active-connection slot; releases it on drop
pub struct ConnectionGuard {
    active: Arc<Mutex<Option<u64>>>,
    connection: u64,
}

impl ConnectionGuard {
    pub fn connection(&self) -> u64 {
        self.connection
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if *active == Some(self.connection) {
            *active = None;
        }
    }
}

impl ConnectionServer {
    pub fn new(sink: Arc<dyn PowerSink>, options: ProtocolOptions) -> Self {
        Self {
            sink,
            options,
            active: Arc::new(Mutex::new(None)),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Whether a client currently holds the connection slot
    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Claim the slot, or `None` if a client is already connected
    pub fn try_claim(&self) -> Option<ConnectionGuard> {
        let mut active = self.active.lock();
        if active.is_some() {
            return None;
        }
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        *active = Some(connection);
        Some(ConnectionGuard {
            active: self.active.clone(),
            connection,
        })
    }

    /// Serve one client socket to completion
    pub async fn accept<S: ClientSocket>(&self, mut socket: S) {
        let Some(guard) = self.try_claim() else {
            warn!("Client already connected, terminating new connection");
            socket.terminate().await;
            return;
        };

        let connection = guard.connection();
        info!(connection, "Client connected");

        let mut protocol = ProtocolConnection::new(self.sink.clone(), self.options.clone());
        match protocol.run(&mut socket).await {
            Ok(()) => info!(
                connection,
                frames = protocol.session().sent_frames(),
                "Client disconnected"
            ),
            Err(e) => warn!(connection, error = %e, "Client connection failed"),
        }
        drop(guard);
    }
}
