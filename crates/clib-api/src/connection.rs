//! Protocol connection
//!
//! One [`ProtocolConnection`] serves one client socket. It owns the session
//! (negotiated protocol version, outgoing frame counter), parses batches,
//! dispatches each command and replies with one batch per frame, preserving
//! command order.
//!
//! Device writes leave the connection through a single ordered queue, so the
//! device always ends on the power of the last command sent.

use std::sync::Arc;

use clib_core::{PowerSink, PowerValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::descriptor::{descriptor_for_version, SCALAR_MESSAGE_VERSION};
use crate::error::ProtocolError;
use crate::messages::{
    ClientMessage, DeviceList, MessageId, ServerInfo, ServerMessage, SYSTEM_MESSAGE_ID,
};
use crate::socket::ClientSocket;

pub const DEFAULT_SERVER_NAME: &str = "Clib-Server";

/// When a device command is acknowledged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Reply `Ok` at once; the write runs in the background and failures are
    /// only logged
    #[default]
    Immediate,
    /// Await the write; a failure is reported to the client as a device error
    AfterWrite,
}

/// Server-wide protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolOptions {
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default)]
    pub ack_mode: AckMode,
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            ack_mode: AckMode::default(),
        }
    }
}

/// Per-connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub message_version: u32,
    next_message_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            message_version: SCALAR_MESSAGE_VERSION,
            next_message_id: 0,
        }
    }
}

impl Session {
    /// Number the next outgoing frame, starting at 0
    pub fn next_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    /// Frames sent so far
    pub fn sent_frames(&self) -> u64 {
        self.next_message_id
    }
}

/// A device write queued by an immediately acknowledged command
struct PowerWrite {
    id: MessageId,
    power: PowerValue,
}

pub struct ProtocolConnection {
    sink: Arc<dyn PowerSink>,
    options: ProtocolOptions,
    session: Session,
    /// Started on the first immediately acknowledged command
    writes: Option<mpsc::UnboundedSender<PowerWrite>>,
}

impl ProtocolConnection {
    pub fn new(sink: Arc<dyn PowerSink>, options: ProtocolOptions) -> Self {
        Self {
            sink,
            options,
            session: Session::default(),
            writes: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve `socket` until the client disconnects
    ///
    /// Undecodable frames are answered with a system error; only socket
    /// failures end the connection.
    pub async fn run<S: ClientSocket + ?Sized>(
        &mut self,
        socket: &mut S,
    ) -> Result<(), ProtocolError> {
        while let Some(frame) = socket.recv().await {
            let replies = match frame {
                Ok(raw) => self.handle_message(&raw).await,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Rejecting frame");
                    Some(vec![e.to_message(SYSTEM_MESSAGE_ID)])
                }
            };
            if let Some(replies) = replies {
                self.send(socket, &replies).await?;
            }
        }
        Ok(())
    }

    /// Answer one frame
    ///
    /// Returns `None` for an empty frame. Anything that is not a JSON array
    /// is answered with a single system error.
    pub async fn handle_message(&mut self, raw: &str) -> Option<Vec<ServerMessage>> {
        if raw.trim().is_empty() {
            info!("Ignoring empty frame");
            return None;
        }

        let batch = match parse_batch(raw) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Rejecting frame");
                return Some(vec![e.to_message(SYSTEM_MESSAGE_ID)]);
            }
        };

        let mut replies = Vec::with_capacity(batch.len());
        for command in batch {
            replies.push(self.answer_message(command).await);
        }
        Some(replies)
    }

    /// Answer one command of a batch
    pub async fn answer_message(&mut self, command: Value) -> ServerMessage {
        let id = command_id(&command);
        match serde_json::from_value::<ClientMessage>(command) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                warn!(id, error = %e, "Unrecognized command");
                ProtocolError::Unsupported("Unrecognized or malformed command".to_string())
                    .to_message(id)
            }
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) -> ServerMessage {
        let id = message.id();
        debug!(id, kind = message.kind(), "Dispatching");

        match message {
            ClientMessage::RequestServerInfo(request) => {
                self.session.message_version = request.message_version.unwrap_or(0);
                info!(
                    client = request.client_name.as_deref().unwrap_or("<unnamed>"),
                    version = self.session.message_version,
                    "Client handshake"
                );
                ServerMessage::ServerInfo(ServerInfo {
                    id,
                    server_name: self.options.server_name.clone(),
                    message_version: self.session.message_version,
                    max_ping_time: 0,
                })
            }
            ClientMessage::RequestDeviceList(_) => ServerMessage::DeviceList(DeviceList {
                id,
                devices: vec![descriptor_for_version(self.session.message_version)],
            }),
            ClientMessage::ScalarCmd(cmd) => {
                let level = cmd.scalars.first().map(|s| s.scalar).unwrap_or(0.0);
                self.actuate(id, PowerValue::from_normalized(level)).await
            }
            ClientMessage::VibrateCmd(cmd) => {
                let level = cmd.speeds.first().map(|s| s.speed).unwrap_or(0.0);
                self.actuate(id, PowerValue::from_normalized(level)).await
            }
            ClientMessage::StopDeviceCmd(_) | ClientMessage::StopAllDevices(_) => {
                self.actuate(id, PowerValue::OFF).await
            }
            // Single fixed device, nothing to scan for
            ClientMessage::StartScanning(_)
            | ClientMessage::StopScanning(_)
            | ClientMessage::Ping(_) => ServerMessage::ok(id),
        }
    }

    async fn actuate(&mut self, id: MessageId, power: PowerValue) -> ServerMessage {
        match self.options.ack_mode {
            AckMode::Immediate => {
                let sink = &self.sink;
                let writes = self
                    .writes
                    .get_or_insert_with(|| spawn_power_writer(sink.clone()));
                if writes.send(PowerWrite { id, power }).is_err() {
                    warn!(id, %power, "Power writer stopped, dropping write");
                }
                ServerMessage::ok(id)
            }
            AckMode::AfterWrite => match self.sink.set_power(power).await {
                Ok(()) => ServerMessage::ok(id),
                Err(e) => {
                    warn!(id, %power, error = %e, "Power write failed");
                    ProtocolError::from(e).to_message(id)
                }
            },
        }
    }

    async fn send<S: ClientSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        replies: &[ServerMessage],
    ) -> Result<(), ProtocolError> {
        let frame = self.session.next_message_id();
        let text = encode(replies)?;
        debug!(frame, replies = replies.len(), "Sending batch");
        socket.send(text).await
    }
}

/// Apply queued writes one at a time, in the order they were queued
///
/// The task outlives the connection until the queue is drained.
fn spawn_power_writer(sink: Arc<dyn PowerSink>) -> mpsc::UnboundedSender<PowerWrite> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PowerWrite>();
    tokio::spawn(async move {
        while let Some(PowerWrite { id, power }) = rx.recv().await {
            if let Err(e) = sink.set_power(power).await {
                warn!(id, %power, error = %e, "Background power write failed");
            }
        }
    });
    tx
}

fn parse_batch(raw: &str) -> Result<Vec<Value>, ProtocolError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(batch)) => Ok(batch),
        Ok(_) => Err(ProtocolError::Parse("expected a JSON array".to_string())),
        Err(e) => Err(ProtocolError::Parse(e.to_string())),
    }
}

/// `Id` of the command's first property, or the system id
fn command_id(command: &Value) -> MessageId {
    command
        .as_object()
        .and_then(|fields| fields.values().next())
        .and_then(|body| body.get("Id"))
        .and_then(Value::as_u64)
        .and_then(|id| MessageId::try_from(id).ok())
        .unwrap_or(SYSTEM_MESSAGE_ID)
}

fn encode(replies: &[ServerMessage]) -> Result<String, ProtocolError> {
    serde_json::to_string(replies).map_err(|e| ProtocolError::Socket(e.to_string()))
}
