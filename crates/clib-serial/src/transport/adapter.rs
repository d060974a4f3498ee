//! Serial transport trait and types

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::TransportError;

/// Event reported by the transport outside of any request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes received from the device
    Data(Vec<u8>),
    /// Asynchronous failure, e.g. the device was unplugged
    Error(String),
}

/// Byte-oriented interface to the actuator's serial line
///
/// Inbound data is not request/response correlated; it is published to
/// subscribers as [`TransportEvent`]s.
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Open the native port
    ///
    /// Completing this call does not mean the device is ready; readiness is
    /// signalled by the first inbound byte.
    async fn open(&self) -> Result<(), TransportError>;

    /// Queue bytes for transmission
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait until all queued bytes have been transmitted
    async fn drain(&self) -> Result<(), TransportError>;

    /// Close the native port
    async fn close(&self) -> Result<(), TransportError>;

    /// Subscribe to inbound data and asynchronous errors
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Whether the native port is currently open
    fn is_open(&self) -> bool;

    /// Device path, for logging
    fn path(&self) -> &str;
}
