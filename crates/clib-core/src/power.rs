//! Power values sent to the actuator

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest power level the device accepts
pub const MIN_POWER: u8 = 0;
/// Highest power level the device accepts
pub const MAX_POWER: u8 = 127;

/// Clamp `value` into `[min, max]`
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// A single-byte power level in `[MIN_POWER, MAX_POWER]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerValue(u8);

impl PowerValue {
    pub const OFF: Self = Self(MIN_POWER);
    pub const FULL: Self = Self(MAX_POWER);

    /// Build a power value from any integer, clamping out-of-range input
    pub fn clamped(value: i64) -> Self {
        Self(clamp(value, MIN_POWER as i64, MAX_POWER as i64) as u8)
    }

    /// Build a power value from a fractional level, rounding half away from zero
    ///
    /// NaN maps to [`PowerValue::OFF`].
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self::OFF;
        }
        Self(clamp(value.round(), MIN_POWER as f64, MAX_POWER as f64) as u8)
    }

    /// Scale a normalized actuator level (0.0..=1.0) onto the device range
    pub fn from_normalized(level: f64) -> Self {
        Self::from_f64(level * MAX_POWER as f64)
    }

    /// The byte written to the serial line
    pub fn as_byte(self) -> u8 {
        self.0
    }

    pub fn get(self) -> i64 {
        self.0 as i64
    }
}

impl From<PowerValue> for u8 {
    fn from(value: PowerValue) -> Self {
        value.0
    }
}

impl fmt::Display for PowerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
