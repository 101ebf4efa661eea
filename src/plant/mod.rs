//! Plant-side collaborators: physical model, nominal control law, sensor
//! perturbation and state observer.
//!
//! The supervisor only sees these through the traits below; the concrete
//! models are the simulation used by the binary.

pub mod controller;
pub mod motor;
pub mod observer;
pub mod perturbation;

use crate::error::ControlError;

/// Physical process with a single scalar state and a single actuator.
pub trait Plant {
    /// True plant state.
    fn measurement(&self) -> f64;
    /// Integrate one step under `command`.
    fn apply(&mut self, command: f64, dt: f64);
}

/// Nominal control law.
pub trait NominalController {
    /// Fails with `InvalidTimeStep` when `dt <= 0`.
    fn compute(&mut self, setpoint: f64, measurement: f64, dt: f64) -> Result<f64, ControlError>;
    /// Discard accumulated internal state (integral, previous error).
    fn reset(&mut self);
}

/// Attack or fault injected between the plant and the detector.
pub trait Perturbation {
    fn perturb(&mut self, true_value: f64) -> f64;
}
