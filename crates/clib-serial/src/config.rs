//! Serial layer configuration
//!
//! Transport selection, device controller timeouts and power blender
//! parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Physical serial port via tokio-serial
    Serial(SerialConfig),
    /// In-memory transport for testing and demos
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyACM0" or "COM3")
    pub path: String,
    /// Line speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: default_baud_rate(),
        }
    }
}

pub fn default_baud_rate() -> u32 {
    9600
}

/// Mock transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated drain and close latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Emit a handshake byte as soon as the port is opened
    #[serde(default = "default_true")]
    pub handshake: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            handshake: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Controller Configuration
// =============================================================================

/// Device controller timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// How long to wait for the device handshake after the port opens
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    /// How long a single write + drain may take
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl ControllerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_open_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

fn default_open_timeout_ms() -> u64 {
    5000
}

fn default_write_timeout_ms() -> u64 {
    1000
}

// =============================================================================
// Blender Configuration
// =============================================================================

/// Power blender parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlenderConfig {
    /// Tick cadence
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,
    /// Initial roughness in [0, 1]
    #[serde(default)]
    pub roughness: f64,
    /// Initial range in [0, 1]
    #[serde(default)]
    pub range: f64,
}

impl BlenderConfig {
    /// Interval between ticks; a zero cadence falls back to the default
    pub fn tick_interval(&self) -> Duration {
        let ticks = if self.ticks_per_second == 0 {
            default_ticks_per_second()
        } else {
            self.ticks_per_second
        };
        Duration::from_secs_f64(1.0 / ticks as f64)
    }
}

impl Default for BlenderConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: default_ticks_per_second(),
            roughness: 0.0,
            range: 0.0,
        }
    }
}

pub fn default_ticks_per_second() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_from_toml() {
        let config: TransportConfig = toml::from_str(
            r#"
            type = "serial"
            path = "/dev/ttyACM0"
            "#,
        )
        .unwrap();

        match config {
            TransportConfig::Serial(serial) => {
                assert_eq!(serial.path, "/dev/ttyACM0");
                assert_eq!(serial.baud_rate, 9600);
            }
            other => panic!("Expected serial transport, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_config_defaults_to_handshake() {
        let config: TransportConfig = toml::from_str(r#"type = "mock""#).unwrap();
        match config {
            TransportConfig::Mock(mock) => {
                assert!(mock.handshake);
                assert_eq!(mock.latency_ms, 0);
            }
            other => panic!("Expected mock transport, got {:?}", other),
        }
    }

    #[test]
    fn test_tick_interval() {
        let config = BlenderConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs_f64(1.0 / 30.0));

        let zero = BlenderConfig {
            ticks_per_second: 0,
            ..Default::default()
        };
        assert_eq!(zero.tick_interval(), config.tick_interval());
    }
}
