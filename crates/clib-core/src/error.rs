//! Common error types for power sinks

use std::time::Duration;

use thiserror::Error;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur while driving the serial channel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The underlying transport failed to open
    #[error("Channel open failed: {0}")]
    Open(String),

    /// The device never sent its handshake byte
    #[error("Channel open timed out after {0:?} waiting for device handshake")]
    OpenTimeout(Duration),

    /// Write or drain failed
    #[error("Channel write failed: {0}")]
    Write(String),

    /// Write did not drain in time
    #[error("Channel write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The underlying transport failed to close
    #[error("Channel close failed: {0}")]
    Close(String),

    /// Operation requires an open channel
    #[error("Channel is not open")]
    NotOpen,
}
