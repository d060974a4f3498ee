//! Mock transport adapter for testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{SerialTransport, TransportError, TransportEvent};
use crate::config::MockConfig;

/// Handshake byte sent by the simulated device
pub const MOCK_HANDSHAKE: &[u8] = b"k";

/// A call made against the mock, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open,
    Write(Vec<u8>),
    Drain,
    Close,
}

/// Mock transport adapter for testing
pub struct MockSerialTransport {
    config: MockConfig,
    open: AtomicBool,
    events_tx: broadcast::Sender<TransportEvent>,
    calls: Mutex<Vec<MockCall>>,
    /// Failure to return from the next open
    open_failure: Mutex<Option<String>>,
    /// Failure to return from the next close
    close_failure: Mutex<Option<String>>,
    fail_writes: AtomicBool,
    latency: Mutex<Duration>,
}

impl MockSerialTransport {
    pub fn new(config: &MockConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            config: config.clone(),
            open: AtomicBool::new(false),
            events_tx,
            calls: Mutex::new(Vec::new()),
            open_failure: Mutex::new(None),
            close_failure: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
            latency: Mutex::new(Duration::from_millis(config.latency_ms)),
        }
    }

    /// A mock whose device stays silent until [`inject_data`](Self::inject_data)
    pub fn silent() -> Self {
        Self::new(&MockConfig {
            latency_ms: 0,
            handshake: false,
        })
    }

    /// Inject inbound bytes (simulates the device talking)
    pub fn inject_data(&self, data: &[u8]) {
        let _ = self.events_tx.send(TransportEvent::Data(data.to_vec()));
    }

    /// Inject an asynchronous transport error
    pub fn inject_error(&self, message: &str) {
        let _ = self.events_tx.send(TransportEvent::Error(message.to_string()));
    }

    pub fn fail_next_open(&self, message: &str) {
        *self.open_failure.lock() = Some(message.to_string());
    }

    pub fn fail_next_close(&self, message: &str) {
        *self.close_failure.lock() = Some(message.to_string());
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Simulated drain and close latency
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Every byte written so far, in order
    pub fn written(&self) -> Vec<u8> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::Write(data) => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == MockCall::Open)
            .count()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SerialTransport for MockSerialTransport {
    async fn open(&self) -> Result<(), TransportError> {
        self.record(MockCall::Open);
        if let Some(message) = self.open_failure.lock().take() {
            return Err(TransportError::OpenFailed(message));
        }

        self.open.store(true, Ordering::SeqCst);
        tracing::debug!("Mock transport: opened");

        if self.config.handshake {
            self.inject_data(MOCK_HANDSHAKE);
        }
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed("mock write failure".to_string()));
        }

        self.record(MockCall::Write(data.to_vec()));
        tracing::debug!(?data, "Mock transport: wrote bytes");
        Ok(())
    }

    async fn drain(&self) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.record(MockCall::Drain);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record(MockCall::Close);
        if let Some(message) = self.close_failure.lock().take() {
            return Err(TransportError::CloseFailed(message));
        }

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn path(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_is_published_on_open() {
        let mock = MockSerialTransport::new(&MockConfig::default());
        let mut events = mock.subscribe();

        mock.open().await.unwrap();

        assert!(mock.is_open());
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::Data(MOCK_HANDSHAKE.to_vec())
        );
    }

    #[tokio::test]
    async fn test_write_requires_open_port() {
        let mock = MockSerialTransport::silent();
        assert_eq!(mock.write(&[1]).await, Err(TransportError::NotOpen));

        mock.open().await.unwrap();
        mock.write(&[1]).await.unwrap();
        mock.write(&[2]).await.unwrap();
        assert_eq!(mock.written(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_one_shot() {
        let mock = MockSerialTransport::silent();
        mock.fail_next_open("busy");

        assert!(matches!(mock.open().await, Err(TransportError::OpenFailed(_))));
        assert!(mock.open().await.is_ok());
        assert_eq!(mock.open_count(), 2);
    }
}
