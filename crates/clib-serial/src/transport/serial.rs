//! tokio-serial adapter for a physical serial port

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{SerialTransport, TransportError, TransportEvent};
use crate::config::SerialConfig;

const READ_BUFFER_SIZE: usize = 64;

/// Serial port adapter backed by tokio-serial
pub struct TokioSerialTransport {
    config: SerialConfig,
    writer: tokio::sync::Mutex<Option<WriteHalf<SerialStream>>>,
    open: Arc<AtomicBool>,
    events_tx: broadcast::Sender<TransportEvent>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TokioSerialTransport {
    pub fn new(config: &SerialConfig) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            config: config.clone(),
            writer: tokio::sync::Mutex::new(None),
            open: Arc::new(AtomicBool::new(false)),
            events_tx,
            reader_handle: Mutex::new(None),
        }
    }

    fn start_reader(&self, mut reader: ReadHalf<SerialStream>) {
        let events_tx = self.events_tx.clone();
        let open = self.open.clone();
        let path = self.config.path.clone();

        let handle = tokio::spawn(async move {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        tracing::warn!(path = %path, "Serial port reached end of stream");
                        open.store(false, Ordering::SeqCst);
                        let _ = events_tx.send(TransportEvent::Error(
                            "device closed the connection".to_string(),
                        ));
                        break;
                    }
                    Ok(n) => {
                        // No receivers is fine
                        let _ = events_tx.send(TransportEvent::Data(buf[..n].to_vec()));
                    }
                    Err(e) => {
                        tracing::error!(path = %path, error = %e, "Serial read error");
                        open.store(false, Ordering::SeqCst);
                        let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            tracing::debug!(path = %path, "Serial reader stopped");
        });

        if let Some(previous) = self.reader_handle.lock().replace(handle) {
            previous.abort();
        }
    }
}

#[async_trait]
impl SerialTransport for TokioSerialTransport {
    async fn open(&self) -> Result<(), TransportError> {
        let stream = tokio_serial::new(&self.config.path, self.config.baud_rate)
            .open_native_async()
            .map_err(|e| {
                TransportError::OpenFailed(format!("{}: {}", self.config.path, e))
            })?;

        let (reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);
        self.open.store(true, Ordering::SeqCst);
        self.start_reader(reader);

        tracing::info!(
            path = %self.config.path,
            baud_rate = self.config.baud_rate,
            "Serial port opened"
        );
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotOpen)?;
        writer
            .write_all(data)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn drain(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotOpen)?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::DrainFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let writer = self.writer.lock().await.take();
        if let Some(handle) = self.reader_handle.lock().take() {
            handle.abort();
        }
        self.open.store(false, Ordering::SeqCst);

        if let Some(mut writer) = writer {
            writer
                .shutdown()
                .await
                .map_err(|e| TransportError::CloseFailed(e.to_string()))?;
        }
        tracing::info!(path = %self.config.path, "Serial port closed");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn path(&self) -> &str {
        &self.config.path
    }
}

impl Drop for TokioSerialTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_handle.lock().take() {
            handle.abort();
        }
    }
}
