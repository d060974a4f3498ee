//! PowerSink trait - the capability consumed by the protocol layer
//!
//! Both the plain serial device controller and the power blender implement
//! this trait, so either can be handed to a connection server.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelResult;
use crate::power::PowerValue;

/// Lifecycle of the serial channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// No transport is open
    #[default]
    Closed,
    /// Native open requested, waiting for the device handshake
    Opening,
    /// Device handshake received
    Open,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
        };
        f.write_str(s)
    }
}

/// Something that accepts power levels for the single managed actuator
#[async_trait]
pub trait PowerSink: Send + Sync {
    /// Open the channel
    ///
    /// Idempotent: concurrent callers share one open attempt and observe the
    /// same result.
    async fn open(&self) -> ChannelResult<()>;

    /// Zero the power and close the channel. No-op unless open.
    async fn close(&self) -> ChannelResult<()>;

    /// Write a power level
    async fn set_power(&self, power: PowerValue) -> ChannelResult<()>;

    /// Current channel lifecycle state
    fn channel_state(&self) -> ChannelState;
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<PowerValue>>,
    }

    #[async_trait]
    impl PowerSink for RecordingSink {
        async fn open(&self) -> ChannelResult<()> {
            Ok(())
        }

        async fn close(&self) -> ChannelResult<()> {
            Ok(())
        }

        async fn set_power(&self, power: PowerValue) -> ChannelResult<()> {
            self.writes.lock().unwrap().push(power);
            Ok(())
        }

        fn channel_state(&self) -> ChannelState {
            ChannelState::Open
        }
    }

    #[tokio::test]
    async fn test_sink_is_object_safe() {
        let sink = Arc::new(RecordingSink::default());
        let dyn_sink: Arc<dyn PowerSink> = sink.clone();
        dyn_sink.set_power(PowerValue::clamped(300)).await.unwrap();
        assert_eq!(*sink.writes.lock().unwrap(), vec![PowerValue::FULL]);
        assert_eq!(dyn_sink.channel_state().to_string(), "open");
    }
}
