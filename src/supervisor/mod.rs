//! Supervisory layer: anomaly detection, operating-mode rules, recovery
//! gating and the mode-dependent control policy, tied together per cycle by
//! [`cycle::Supervisor`].

pub mod cycle;
pub mod detector;
pub mod policy;
pub mod recovery;
pub mod state_machine;

pub use cycle::{CycleDecision, CycleReport, Supervisor};
pub use state_machine::{OperatingMode, TimingEvent, TransitionReason, TransitionRecord};
