//! Transport layer for the serial channel
//!
//! This module provides transport adapters for talking to the actuator:
//! - tokio-serial adapter for a physical serial port
//! - Mock adapter for testing
//!
//! It also enumerates the host's serial ports so a default can be suggested.

mod adapter;
pub mod error;
pub mod mock;
pub mod ports;
pub mod serial;

pub use adapter::{SerialTransport, TransportEvent};
pub use error::TransportError;
pub use ports::{list_ports, suggest_port, PortInfo};

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport adapter based on configuration
///
/// The adapter is created closed; the device controller opens it.
pub fn create_transport(config: &TransportConfig) -> Arc<dyn SerialTransport> {
    match config {
        TransportConfig::Serial(cfg) => Arc::new(serial::TokioSerialTransport::new(cfg)),
        TransportConfig::Mock(cfg) => Arc::new(mock::MockSerialTransport::new(cfg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MockConfig, SerialConfig};

    #[test]
    fn test_create_transport_reports_path() {
        let serial = create_transport(&TransportConfig::Serial(SerialConfig::new("/dev/ttyUSB7")));
        assert_eq!(serial.path(), "/dev/ttyUSB7");
        assert!(!serial.is_open());

        let mock = create_transport(&TransportConfig::Mock(MockConfig::default()));
        assert_eq!(mock.path(), "mock");
        assert!(!mock.is_open());
    }
}
