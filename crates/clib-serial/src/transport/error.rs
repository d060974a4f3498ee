//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Open failed: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Drain failed: {0}")]
    DrainFailed(String),

    #[error("Close failed: {0}")]
    CloseFailed(String),

    #[error("Port not open")]
    NotOpen,

    #[error("Port enumeration failed: {0}")]
    Enumerate(String),
}
