//! Power blender
//!
//! Decorates any [`PowerSink`] with a periodic tick that writes a
//! noise-perturbed version of the current power. Setting a power on the
//! blender only updates its target; the tick task is what reaches the device.
//!
//! The noise is sampled at `(0, roughness)`, so the offset only moves when the
//! roughness changes. This is bounded, reproducible jitter rather than a
//! random walk.

mod noise;

pub use noise::{NoiseSource, SimplexNoise};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clib_core::{clamp, ChannelResult, ChannelState, PowerSink, PowerValue, MAX_POWER};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::BlenderConfig;

/// Power bookkeeping driven by the blender
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlendDescriptor {
    /// Power the generator perturbs
    pub current: PowerValue,
    /// Requested power
    pub target: PowerValue,
    /// Value of `current` when `target` last changed
    pub last_target: PowerValue,
    /// Ticks needed to cover the gap at one unit per tick
    pub blend_ticks: u32,
}

/// Partial descriptor update; `None` fields are left alone
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DescriptorUpdate {
    pub target_power: Option<f64>,
    pub roughness: Option<f64>,
    pub range: Option<f64>,
}

impl DescriptorUpdate {
    pub fn target(power: f64) -> Self {
        Self {
            target_power: Some(power),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct BlendState {
    descriptor: BlendDescriptor,
    roughness: f64,
    range: f64,
}

struct BlendCore {
    sink: Arc<dyn PowerSink>,
    noise: Box<dyn NoiseSource>,
    state: Mutex<BlendState>,
}

impl BlendCore {
    fn next_value(&self, state: &BlendState) -> PowerValue {
        if state.range == 0.0 {
            return state.descriptor.current;
        }
        let offset = self.noise.sample(0.0, state.roughness) - 0.5;
        let delta = offset * state.range * MAX_POWER as f64;
        PowerValue::from_f64(state.descriptor.current.get() as f64 + delta)
    }

    async fn tick(&self) {
        let value = {
            let mut state = self.state.lock();
            state.descriptor.current = state.descriptor.target;
            self.next_value(&state)
        };
        if let Err(e) = self.sink.set_power(value).await {
            warn!(error = %e, %value, "Blender tick failed to set power");
        }
    }
}

/// Wraps a power sink with a noise-driven tick
pub struct PowerBlender {
    core: Arc<BlendCore>,
    tick_interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl PowerBlender {
    pub fn new(sink: Arc<dyn PowerSink>, config: &BlenderConfig) -> Self {
        Self::with_noise(sink, config, Box::new(SimplexNoise::new()))
    }

    pub fn with_noise(
        sink: Arc<dyn PowerSink>,
        config: &BlenderConfig,
        noise: Box<dyn NoiseSource>,
    ) -> Self {
        let blender = Self {
            core: Arc::new(BlendCore {
                sink,
                noise,
                state: Mutex::new(BlendState::default()),
            }),
            tick_interval: config.tick_interval(),
            ticker: Mutex::new(None),
        };
        blender.set_descriptor(DescriptorUpdate {
            target_power: None,
            roughness: Some(config.roughness),
            range: Some(config.range),
        });
        blender
    }

    /// Apply a partial update
    ///
    /// `target_power` is clamped to the power range, `roughness` and `range`
    /// to [0, 1]. A changed target or roughness re-anchors the blend.
    pub fn set_descriptor(&self, update: DescriptorUpdate) {
        let mut state = self.core.state.lock();
        let mut reanchor = false;

        if let Some(target) = update.target_power {
            let target = PowerValue::from_f64(target);
            if target != state.descriptor.target {
                state.descriptor.target = target;
                reanchor = true;
            }
        }
        if let Some(roughness) = update.roughness.filter(|r| !r.is_nan()) {
            let roughness = clamp(roughness, 0.0, 1.0);
            if roughness != state.roughness {
                state.roughness = roughness;
                reanchor = true;
            }
        }
        if let Some(range) = update.range.filter(|r| !r.is_nan()) {
            state.range = clamp(range, 0.0, 1.0);
        }

        if reanchor {
            let descriptor = &mut state.descriptor;
            descriptor.last_target = descriptor.current;
            descriptor.blend_ticks = (descriptor.target.get() - descriptor.current.get())
                .unsigned_abs() as u32;
            debug!(?descriptor, "Blend descriptor updated");
        }
    }

    pub fn descriptor(&self) -> BlendDescriptor {
        self.core.state.lock().descriptor
    }

    pub fn roughness(&self) -> f64 {
        self.core.state.lock().roughness
    }

    pub fn range(&self) -> f64 {
        self.core.state.lock().range
    }

    /// Value the next tick would write, without moving `current`
    pub fn next_value(&self) -> PowerValue {
        let state = self.core.state.lock();
        self.core.next_value(&state)
    }

    /// Run one tick: hold `current` at the target and write the next value
    pub async fn tick(&self) {
        self.core.tick().await;
    }

    /// Start the periodic tick task. No-op if already running.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let core = self.core.clone();
        let period = self.tick_interval;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                core.tick().await;
            }
        }));
        debug!(?period, "Blender ticking");
    }

    /// Stop the periodic tick task
    pub fn stop(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
            debug!("Blender stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }
}

#[async_trait]
impl PowerSink for PowerBlender {
    async fn open(&self) -> ChannelResult<()> {
        self.core.sink.open().await?;
        self.start();
        Ok(())
    }

    async fn close(&self) -> ChannelResult<()> {
        self.stop();
        self.core.sink.close().await
    }

    /// Retarget the blend; the tick task performs the write
    ///
    /// Stopping is a retarget to zero, so while `range` is above zero the
    /// device keeps receiving the noise offset around zero. Closing the
    /// blender is what silences the device.
    async fn set_power(&self, power: PowerValue) -> ChannelResult<()> {
        self.set_descriptor(DescriptorUpdate::target(power.get() as f64));
        Ok(())
    }

    fn channel_state(&self) -> ChannelState {
        self.core.sink.channel_state()
    }
}

impl Drop for PowerBlender {
    fn drop(&mut self) {
        self.stop();
    }
}
