//! Daemon configuration
//!
//! Loaded from an optional TOML file; every section and field has a default
//! so an empty file is a valid configuration.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use clib_api::{AckMode, ProtocolOptions, DEFAULT_PORT};
use clib_serial::config::{
    default_baud_rate, default_ticks_per_second, BlenderConfig, ControllerConfig, MockConfig,
    SerialConfig, TransportConfig,
};
use serde::{Deserialize, Serialize};

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub blender: BlenderSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }
}

// =============================================================================
// Server
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default)]
    pub ack_mode: AckMode,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_server_name() -> String {
    ProtocolOptions::default().server_name
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
            ack_mode: AckMode::default(),
        }
    }
}

impl ServerSection {
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    pub fn protocol_options(&self) -> ProtocolOptions {
        ProtocolOptions {
            server_name: self.server_name.clone(),
            ack_mode: self.ack_mode,
        }
    }
}

// =============================================================================
// Serial
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSection {
    /// Port to open; when unset the user is prompted
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Case-insensitive pattern used to suggest a port
    #[serde(default = "default_port_hint")]
    pub port_hint: String,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Use the in-memory transport instead of hardware
    #[serde(default)]
    pub mock: bool,
}

fn default_port_hint() -> String {
    "arduino".to_string()
}

fn default_open_timeout_ms() -> u64 {
    ControllerConfig::default().open_timeout_ms
}

fn default_write_timeout_ms() -> u64 {
    ControllerConfig::default().write_timeout_ms
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: default_baud_rate(),
            port_hint: default_port_hint(),
            open_timeout_ms: default_open_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            mock: false,
        }
    }
}

impl SerialSection {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            open_timeout_ms: self.open_timeout_ms,
            write_timeout_ms: self.write_timeout_ms,
        }
    }

    /// Transport for `path`, or the mock when enabled
    pub fn transport_config(&self, path: &str) -> TransportConfig {
        if self.mock {
            return TransportConfig::Mock(MockConfig::default());
        }
        TransportConfig::Serial(SerialConfig {
            path: path.to_string(),
            baud_rate: self.baud_rate,
        })
    }
}

// =============================================================================
// Blender
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlenderSection {
    /// Wrap the device in a power blender
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: u32,
    #[serde(default)]
    pub roughness: f64,
    #[serde(default)]
    pub range: f64,
}

impl Default for BlenderSection {
    fn default() -> Self {
        Self {
            enabled: false,
            ticks_per_second: default_ticks_per_second(),
            roughness: 0.0,
            range: 0.0,
        }
    }
}

impl BlenderSection {
    pub fn blender_config(&self) -> BlenderConfig {
        BlenderConfig {
            ticks_per_second: self.ticks_per_second,
            roughness: self.roughness,
            range: self.range,
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
