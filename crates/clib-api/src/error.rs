//! Protocol errors

use clib_core::ChannelError;
use thiserror::Error;

use crate::messages::{error_code, MessageId, ServerMessage};

/// Errors raised while handling client frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not a JSON array of messages
    #[error("Invalid message batch: {0}")]
    Parse(String),

    /// Message kind not recognized or fields malformed
    #[error("Unsupported command: {0}")]
    Unsupported(String),

    /// The power sink failed a write the client waited for
    #[error("Device error: {0}")]
    Device(#[from] ChannelError),

    /// Socket receive or send failed
    #[error("Socket error: {0}")]
    Socket(String),
}

impl ProtocolError {
    /// Protocol error code reported to the client
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Device(_) => error_code::DEVICE,
            Self::Parse(_) | Self::Unsupported(_) | Self::Socket(_) => {
                error_code::UNSUPPORTED_COMMAND
            }
        }
    }

    /// Whether the connection cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Socket(_))
    }

    /// Reply carrying this error
    pub fn to_message(&self, id: MessageId) -> ServerMessage {
        ServerMessage::error(id, self.error_code(), self.to_string())
    }
}
