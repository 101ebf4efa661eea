//! Control policy selector: which command actually reaches the actuator.
//!
//! | Mode                     | Command                         |
//! |--------------------------|---------------------------------|
//! | Normal, Recovery         | nominal, unchanged              |
//! | AttackDetected, Degraded | nominal clamped to `[-L, +L]`   |
//! | FailSafe                 | `S`; nominal law is not invoked |
//!
//! The supervisor resets the controller on FailSafe entry.

use crate::error::ControlError;
use crate::supervisor::state_machine::OperatingMode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPolicy {
    degraded_limit: f64,
    safe_control: f64,
}

impl ControlPolicy {
    pub fn new(degraded_limit: f64, safe_control: f64) -> Self {
        Self {
            degraded_limit: degraded_limit.abs(),
            safe_control,
        }
    }

    /// Produce the command for `mode`. `nominal` is only called in computing modes.
    pub fn select<F>(&self, mode: OperatingMode, nominal: F) -> Result<f64, ControlError>
    where
        F: FnOnce() -> Result<f64, ControlError>,
    {
        match mode {
            OperatingMode::Normal | OperatingMode::Recovery => nominal(),
            OperatingMode::AttackDetected | OperatingMode::Degraded => {
                Ok(clamp_to_limit(nominal()?, self.degraded_limit))
            }
            OperatingMode::FailSafe => Ok(self.safe_control),
        }
    }
}

/// Clamp to `[-limit, +limit]`, preserving sign. Boundary values are exact.
#[inline]
pub fn clamp_to_limit(value: f64, limit: f64) -> f64 {
    let limit = limit.abs();
    if value > limit {
        limit
    } else if value < -limit {
        -limit
    } else {
        value
    }
}
