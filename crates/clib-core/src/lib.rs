//! clib-core - Core traits and types for the Clib actuator bridge
//!
//! This crate provides the abstractions shared by the serial device layer and
//! the protocol layer: the [`PowerSink`] capability, the [`PowerValue`] range,
//! and the channel error taxonomy.

pub mod error;
pub mod power;
pub mod sink;

pub use error::{ChannelError, ChannelResult};
pub use power::{clamp, PowerValue, MAX_POWER, MIN_POWER};
pub use sink::{ChannelState, PowerSink};
