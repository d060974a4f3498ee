//! Device controller for the serial actuator
//!
//! Owns the channel lifecycle (closed -> opening -> open) and turns power
//! levels into single-byte writes.
//!
//! Opening is a two-step affair: the native port open, then a handshake byte
//! from the device. Readiness is published through a one-shot gate that every
//! concurrent `open()` caller waits on, so only one native open is attempted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clib_core::{ChannelError, ChannelResult, ChannelState, PowerSink, PowerValue};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::transport::{SerialTransport, TransportError, TransportEvent};

/// Outcome of an open attempt, shared by every waiter
#[derive(Debug, Clone)]
enum OpenGate {
    Pending,
    Ready,
    Failed(ChannelError),
}

/// Controls the single actuator behind a serial transport
pub struct DeviceController {
    transport: Arc<dyn SerialTransport>,
    config: ControllerConfig,
    state: Arc<Mutex<ChannelState>>,
    gate: Mutex<Option<watch::Receiver<OpenGate>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceController {
    pub fn new(transport: Arc<dyn SerialTransport>, config: ControllerConfig) -> Self {
        Self {
            transport,
            config,
            state: Arc::new(Mutex::new(ChannelState::Closed)),
            gate: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Current channel state
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Open the channel and wait for the device handshake
    pub async fn open(&self) -> ChannelResult<()> {
        let (mut gate, initiator) = {
            let mut state = self.state.lock();
            match *state {
                ChannelState::Opening | ChannelState::Open => match self.gate.lock().clone() {
                    Some(gate) => (gate, None),
                    None => return Ok(()),
                },
                ChannelState::Closed => {
                    *state = ChannelState::Opening;
                    let (tx, rx) = watch::channel(OpenGate::Pending);
                    *self.gate.lock() = Some(rx.clone());
                    (rx, Some(tx))
                }
            }
        };

        if let Some(tx) = initiator {
            self.begin_open(tx).await;
        } else {
            debug!(path = self.transport.path(), "Open already in progress, joining");
        }

        let outcome = match gate.wait_for(|g| !matches!(g, OpenGate::Pending)).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => OpenGate::Failed(ChannelError::Open("open attempt was abandoned".into())),
        };
        match outcome {
            OpenGate::Ready => Ok(()),
            OpenGate::Failed(e) => Err(e),
            OpenGate::Pending => Err(ChannelError::Open("open attempt was abandoned".into())),
        }
    }

    /// Native open, then hand the gate to the handshake watcher
    async fn begin_open(&self, gate: watch::Sender<OpenGate>) {
        // Subscribe before opening so the handshake byte cannot be missed
        let events = self.transport.subscribe();

        if let Err(e) = self.transport.open().await {
            error!(path = self.transport.path(), error = %e, "Failed to open serial port");
            *self.state.lock() = ChannelState::Closed;
            gate.send_replace(OpenGate::Failed(ChannelError::Open(e.to_string())));
            return;
        }
        info!(path = self.transport.path(), "Port opened, waiting for device handshake");

        let handle = tokio::spawn(watch_device(
            events,
            gate,
            self.state.clone(),
            self.transport.clone(),
            self.config.open_timeout(),
        ));
        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }

        // Safety default: never leave the actuator at whatever it had before
        if let Err(e) = self.write_power(PowerValue::OFF).await {
            warn!(error = %e, "Failed to zero power after open");
        }
    }

    /// Zero the power, then close the transport. No-op unless open.
    pub async fn close(&self) -> ChannelResult<()> {
        if self.state() != ChannelState::Open {
            debug!(state = %self.state(), "Close requested on a channel that is not open");
            return Ok(());
        }

        if let Err(e) = self.write_power(PowerValue::OFF).await {
            warn!(error = %e, "Failed to zero power before close");
        }

        self.transport
            .close()
            .await
            .map_err(|e| ChannelError::Close(e.to_string()))?;

        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
        {
            let mut state = self.state.lock();
            *state = ChannelState::Closed;
            *self.gate.lock() = None;
        }
        info!(path = self.transport.path(), "Channel closed");
        Ok(())
    }

    /// Write a power level and wait for it to drain
    pub async fn set_power(&self, power: PowerValue) -> ChannelResult<()> {
        self.write_power(power).await?;
        debug!(%power, "Power set");
        Ok(())
    }

    async fn write_power(&self, power: PowerValue) -> ChannelResult<()> {
        let timeout = self.config.write_timeout();
        let write = async {
            self.transport
                .write(&[power.as_byte()])
                .await
                .map_err(write_error)?;
            self.transport.drain().await.map_err(write_error)
        };

        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::WriteTimeout(timeout)),
        }
    }
}

#[async_trait]
impl PowerSink for DeviceController {
    async fn open(&self) -> ChannelResult<()> {
        DeviceController::open(self).await
    }

    async fn close(&self) -> ChannelResult<()> {
        DeviceController::close(self).await
    }

    async fn set_power(&self, power: PowerValue) -> ChannelResult<()> {
        DeviceController::set_power(self, power).await
    }

    fn channel_state(&self) -> ChannelState {
        self.state()
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }
}

/// Resolve the open gate on the first inbound byte, then keep logging
///
/// Asynchronous transport errors are logged only; they never fail a pending
/// write or close. A silent device fails the gate after `open_timeout`.
async fn watch_device(
    mut events: broadcast::Receiver<TransportEvent>,
    gate: watch::Sender<OpenGate>,
    state: Arc<Mutex<ChannelState>>,
    transport: Arc<dyn SerialTransport>,
    open_timeout: Duration,
) {
    let handshake = tokio::time::timeout(open_timeout, async {
        loop {
            match events.recv().await {
                Ok(TransportEvent::Data(data)) => {
                    log_device_data(&data);
                    return Ok(());
                }
                Ok(TransportEvent::Error(message)) => {
                    error!(error = %message, "Serial transport error while opening");
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Transport events lagged while opening");
                }
                Err(RecvError::Closed) => {
                    return Err(ChannelError::Open("transport event stream closed".into()));
                }
            }
        }
    })
    .await
    .unwrap_or(Err(ChannelError::OpenTimeout(open_timeout)));

    if let Err(e) = handshake {
        warn!(error = %e, "Device did not complete handshake");
        // Stay Opening until the port is shut so a new open cannot race the close
        if let Err(close_err) = transport.close().await {
            warn!(error = %close_err, "Failed to close port after handshake failure");
        }
        *state.lock() = ChannelState::Closed;
        gate.send_replace(OpenGate::Failed(e));
        return;
    }

    *state.lock() = ChannelState::Open;
    gate.send_replace(OpenGate::Ready);
    info!(path = transport.path(), "Device handshake received, channel open");

    loop {
        match events.recv().await {
            Ok(TransportEvent::Data(data)) => log_device_data(&data),
            Ok(TransportEvent::Error(message)) => {
                error!(error = %message, "Serial transport error");
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Transport events lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn write_error(e: TransportError) -> ChannelError {
    match e {
        TransportError::NotOpen => ChannelError::NotOpen,
        other => ChannelError::Write(other.to_string()),
    }
}

fn log_device_data(data: &[u8]) {
    debug!(data = %String::from_utf8_lossy(data), "Data from device");
}
