//! clib-serial - Serial device layer for the Clib actuator
//!
//! This crate owns everything between a power level and the serial line:
//! - [`transport`]: the [`SerialTransport`] abstraction with tokio-serial and
//!   mock adapters, plus serial port discovery
//! - [`controller`]: the [`DeviceController`] open/close/power lifecycle
//! - [`blender`]: the [`PowerBlender`] decorator that turns a target power
//!   into a noise-perturbed output signal
//!
//! # Example
//!
//! ```ignore
//! use clib_serial::config::{ControllerConfig, TransportConfig};
//! use clib_serial::{create_transport, DeviceController};
//!
//! let transport = create_transport(&TransportConfig::default());
//! let controller = DeviceController::new(transport, ControllerConfig::default());
//! controller.open().await?;
//! ```

pub mod blender;
pub mod config;
pub mod controller;
pub mod transport;

pub use blender::{BlendDescriptor, DescriptorUpdate, NoiseSource, PowerBlender, SimplexNoise};
pub use controller::DeviceController;
pub use transport::{create_transport, SerialTransport, TransportError, TransportEvent};

// Re-export the core vocabulary for convenience
pub use clib_core::{ChannelError, ChannelResult, ChannelState, PowerSink, PowerValue};
