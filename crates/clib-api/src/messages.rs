//! Wire messages
//!
//! Every frame is a JSON array of messages. Each message is an object with a
//! single key naming the message kind, e.g.
//! `{"RequestDeviceList":{"Id":1}}`. Serde's externally tagged enums map onto
//! that shape directly.

use serde::{Deserialize, Serialize};

use crate::descriptor::DeviceDescriptor;

/// Client-chosen id echoed in replies; 0 is reserved for system messages
pub type MessageId = u32;

/// Id used for replies that cannot be correlated with a client message
pub const SYSTEM_MESSAGE_ID: MessageId = 0;

/// Error codes carried by [`ErrorMessage`]
pub mod error_code {
    /// Unrecognized, malformed, or otherwise unprocessable command
    pub const UNSUPPORTED_COMMAND: u32 = 1;
    /// The device rejected or failed the requested write
    pub const DEVICE: u32 = 4;
}

// =============================================================================
// Client -> Server
// =============================================================================

/// Commands accepted from the client
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum ClientMessage {
    RequestServerInfo(RequestServerInfo),
    RequestDeviceList(IdOnly),
    ScalarCmd(ScalarCmd),
    /// Deprecated predecessor of `ScalarCmd`
    VibrateCmd(VibrateCmd),
    StopDeviceCmd(StopDeviceCmd),
    StopAllDevices(IdOnly),
    StartScanning(IdOnly),
    StopScanning(IdOnly),
    Ping(IdOnly),
}

impl ClientMessage {
    pub fn id(&self) -> MessageId {
        match self {
            Self::RequestServerInfo(m) => m.id,
            Self::ScalarCmd(m) => m.id,
            Self::VibrateCmd(m) => m.id,
            Self::StopDeviceCmd(m) => m.id,
            Self::RequestDeviceList(m)
            | Self::StopAllDevices(m)
            | Self::StartScanning(m)
            | Self::StopScanning(m)
            | Self::Ping(m) => m.id,
        }
    }

    /// Message kind, as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestServerInfo(_) => "RequestServerInfo",
            Self::RequestDeviceList(_) => "RequestDeviceList",
            Self::ScalarCmd(_) => "ScalarCmd",
            Self::VibrateCmd(_) => "VibrateCmd",
            Self::StopDeviceCmd(_) => "StopDeviceCmd",
            Self::StopAllDevices(_) => "StopAllDevices",
            Self::StartScanning(_) => "StartScanning",
            Self::StopScanning(_) => "StopScanning",
            Self::Ping(_) => "Ping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdOnly {
    pub id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestServerInfo {
    pub id: MessageId,
    #[serde(default)]
    pub client_name: Option<String>,
    /// Absent in the v0 handshake
    #[serde(default)]
    pub message_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarCmd {
    pub id: MessageId,
    #[serde(default)]
    pub device_index: u32,
    #[serde(default)]
    pub scalars: Vec<ScalarSubcommand>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarSubcommand {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub scalar: f64,
    #[serde(default)]
    pub actuator_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VibrateCmd {
    pub id: MessageId,
    #[serde(default)]
    pub device_index: u32,
    #[serde(default)]
    pub speeds: Vec<SpeedSubcommand>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpeedSubcommand {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopDeviceCmd {
    pub id: MessageId,
    #[serde(default)]
    pub device_index: Option<u32>,
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Replies sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    ServerInfo(ServerInfo),
    DeviceList(DeviceList),
    Ok(IdOnly),
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn ok(id: MessageId) -> Self {
        Self::Ok(IdOnly { id })
    }

    pub fn error(id: MessageId, error_code: u32, error_message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            id,
            error_code,
            error_message: error_message.into(),
        })
    }

    pub fn id(&self) -> MessageId {
        match self {
            Self::ServerInfo(m) => m.id,
            Self::DeviceList(m) => m.id,
            Self::Ok(m) => m.id,
            Self::Error(m) => m.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    pub id: MessageId,
    pub server_name: String,
    pub message_version: u32,
    /// Milliseconds between required pings; 0 disables the ping requirement
    pub max_ping_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceList {
    pub id: MessageId,
    pub devices: Vec<DeviceDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorMessage {
    pub id: MessageId,
    pub error_code: u32,
    pub error_message: String,
}
