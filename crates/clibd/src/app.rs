//! Application context
//!
//! Owns the power sink and the running server. Every shutdown trigger ends
//! in [`App::shutdown`], which zeroes the power, closes the channel and then
//! stops the server, logging each failed step.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clib_api::{ConnectionServer, ProtocolOptions};
use clib_core::{PowerSink, PowerValue};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long the server gets to finish after shutdown is requested
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

pub struct App {
    sink: Arc<dyn PowerSink>,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_task: Option<JoinHandle<std::io::Result<()>>>,
}

/// What ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal(&'static str),
    ServerExited,
}

impl App {
    /// Start serving the protocol on `listener`
    pub fn start(
        sink: Arc<dyn PowerSink>,
        options: ProtocolOptions,
        listener: TcpListener,
    ) -> anyhow::Result<Self> {
        let local_addr = listener.local_addr()?;
        let server = Arc::new(ConnectionServer::new(sink.clone(), options));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let server_task = tokio::spawn(clib_api::serve(listener, server, async {
            let _ = shutdown_rx.await;
        }));
        info!("Listening on ws://{}", local_addr);

        Ok(Self {
            sink,
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            server_task: Some(server_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until a shutdown signal arrives or the server stops on its own
    pub async fn run(&mut self) -> StopReason {
        let Some(server_task) = self.server_task.as_mut() else {
            return StopReason::ServerExited;
        };

        let reason = tokio::select! {
            signal = shutdown_signal() => match signal {
                Ok(name) => StopReason::Signal(name),
                Err(e) => {
                    error!(error = %e, "Failed to listen for shutdown signals");
                    StopReason::Signal("none")
                }
            },
            result = server_task => {
                match result {
                    Ok(Ok(())) => warn!("Server stopped"),
                    Ok(Err(e)) => error!(error = %e, "Server failed"),
                    Err(e) => error!(error = %e, "Server task panicked"),
                }
                StopReason::ServerExited
            }
        };
        if reason == StopReason::ServerExited {
            self.server_task = None;
        }
        info!(?reason, "Shutting down");
        reason
    }

    /// Ordered teardown; safe to call more than once
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.sink.set_power(PowerValue::OFF).await {
            warn!(error = %e, "Failed to zero power");
        }
        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "Failed to close channel");
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.server_task.take() {
            match tokio::time::timeout(SERVER_STOP_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => info!("Server stopped"),
                Ok(Ok(Err(e))) => warn!(error = %e, "Server stopped with error"),
                Ok(Err(e)) => warn!(error = %e, "Server task panicked"),
                Err(_) => warn!("Server did not stop in time"),
            }
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
        _ = usr1.recv() => Ok("SIGUSR1"),
        _ = usr2.recv() => Ok("SIGUSR2"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
}

#[cfg(test)]
mod tests {
    use clib_core::ChannelState;
    use clib_serial::config::{ControllerConfig, MockConfig};
    use clib_serial::transport::mock::{MockCall, MockSerialTransport};
    use clib_serial::DeviceController;

    use super::*;

    async fn app() -> (Arc<MockSerialTransport>, Arc<DeviceController>, App) {
        let mock = Arc::new(MockSerialTransport::new(&MockConfig::default()));
        let controller = Arc::new(DeviceController::new(mock.clone(), ControllerConfig::default()));
        controller.open().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let app = App::start(controller.clone(), ProtocolOptions::default(), listener).unwrap();
        (mock, controller, app)
    }

    #[tokio::test]
    async fn test_shutdown_zeroes_then_closes() {
        let (mock, controller, mut app) = app().await;
        controller.set_power(PowerValue::clamped(90)).await.unwrap();

        app.shutdown().await;

        assert_eq!(controller.state(), ChannelState::Closed);
        let calls = mock.calls();
        let close = calls.iter().rposition(|c| *c == MockCall::Close).unwrap();
        assert_eq!(calls[..close].iter().rev().find_map(|c| match c {
            MockCall::Write(bytes) => Some(bytes.clone()),
            _ => None,
        }), Some(vec![0]));
        assert!(app.server_task.is_none());
    }

    #[tokio::test]
    async fn test_server_stops_listening() {
        let (_, _, mut app) = app().await;
        let addr = app.local_addr();
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

        app.shutdown().await;
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_harmless() {
        let (mock, _, mut app) = app().await;
        app.shutdown().await;
        let calls = mock.calls().len();

        app.shutdown().await;
        assert_eq!(mock.calls().len(), calls);
    }
}
