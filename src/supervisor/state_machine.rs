//! Supervisory operating-mode state machine.
//!
//! Normal → (AttackDetected) → Degraded → Recovery → Normal, with FailSafe as
//! a terminal sink reached only from Degraded on a hard timing violation.
//!
//! Rules are evaluated once per cycle, first match wins:
//! 1. Degraded + hard violation on the previous cycle → FailSafe
//! 2. deadline miss on the previous cycle → Degraded
//! 3. Degraded + enough stable cycles → Recovery
//! 4. Normal + anomaly → AttackDetected → Degraded (same cycle)
//! 5. Recovery → Normal once the cycle after entry has been decided
//!
//! Every change goes through `transition`, which appends to the audit log and
//! reports to the injected sink.

use std::{fmt, str::FromStr};

use crate::error::ModeError;
use crate::utils::telemetry::{SharedSink, SupervisorEvent};

/// Closed set of operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Normal,
    /// Audit marker only; never observed by the control policy.
    AttackDetected,
    Degraded,
    FailSafe,
    Recovery,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 5] = [
        OperatingMode::Normal,
        OperatingMode::AttackDetected,
        OperatingMode::Degraded,
        OperatingMode::FailSafe,
        OperatingMode::Recovery,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperatingMode::Normal => "Normal",
            OperatingMode::AttackDetected => "AttackDetected",
            OperatingMode::Degraded => "Degraded",
            OperatingMode::FailSafe => "FailSafe",
            OperatingMode::Recovery => "Recovery",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            OperatingMode::Normal => 0,
            OperatingMode::AttackDetected => 1,
            OperatingMode::Degraded => 2,
            OperatingMode::FailSafe => 3,
            OperatingMode::Recovery => 4,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperatingMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperatingMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModeError::UnknownName(s.to_string()))
    }
}

impl TryFrom<u8> for OperatingMode {
    type Error = ModeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        OperatingMode::ALL
            .into_iter()
            .find(|m| m.code() == code)
            .ok_or(ModeError::UnknownCode(code))
    }
}

/// Timing classification of the previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingEvent {
    #[default]
    OnTime,
    /// Deadline exceeded, still within the jitter tolerance.
    SoftMiss,
    /// Deadline plus jitter tolerance exceeded.
    HardViolation,
}

/// Why a transition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    HardTimingViolation,
    DeadlineMiss,
    StabilityRestored,
    SensorAnomaly,
    AttackContainment,
    RecoveryComplete,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::HardTimingViolation => "hard real-time violation",
            TransitionReason::DeadlineMiss => "deadline miss",
            TransitionReason::StabilityRestored => "residual stable",
            TransitionReason::SensorAnomaly => "sensor anomaly",
            TransitionReason::AttackContainment => "attack containment",
            TransitionReason::RecoveryComplete => "recovery complete",
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit entry. Append-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRecord {
    pub cycle: u64,
    pub from: OperatingMode,
    pub to: OperatingMode,
    pub reason: TransitionReason,
}

/// Per-cycle inputs to rule evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ModeInputs {
    pub timing: TimingEvent,
    pub anomaly: bool,
    pub stable_cycles: u32,
    pub required_stable_cycles: u32,
}

pub struct SupervisoryStateMachine {
    mode: OperatingMode,
    audit: Vec<TransitionRecord>,
    recovery_entered: Option<u64>,
    sink: SharedSink,
}

impl SupervisoryStateMachine {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            mode: OperatingMode::Normal,
            audit: Vec::new(),
            recovery_entered: None,
            sink,
        }
    }

    #[inline]
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn audit_log(&self) -> &[TransitionRecord] {
        &self.audit
    }

    /// Apply rules 1–4 for `cycle`. Returns the mode the cycle's control
    /// decision is made in.
    pub fn evaluate(&mut self, inputs: ModeInputs, cycle: u64) -> OperatingMode {
        use OperatingMode as M;
        use TimingEvent as T;

        let (next, reason) = match (self.mode, inputs.timing) {
            // Terminal.
            (M::FailSafe, _) => return self.mode,

            (M::Degraded, T::HardViolation) => (M::FailSafe, TransitionReason::HardTimingViolation),
            (M::Degraded, T::SoftMiss) => return self.mode,
            (M::Normal | M::AttackDetected | M::Recovery, T::SoftMiss) => {
                (M::Degraded, TransitionReason::DeadlineMiss)
            }
            (M::Normal | M::AttackDetected | M::Recovery, T::HardViolation) => {
                (M::Degraded, TransitionReason::HardTimingViolation)
            }

            (M::Degraded, T::OnTime) if inputs.stable_cycles >= inputs.required_stable_cycles => {
                (M::Recovery, TransitionReason::StabilityRestored)
            }
            (M::Degraded, T::OnTime) => return self.mode,

            (M::Normal, T::OnTime) if inputs.anomaly => {
                self.transition(M::AttackDetected, TransitionReason::SensorAnomaly, cycle);
                (M::Degraded, TransitionReason::AttackContainment)
            }
            (M::AttackDetected, T::OnTime) => (M::Degraded, TransitionReason::AttackContainment),
            (M::Normal | M::Recovery, T::OnTime) => return self.mode,
        };

        self.transition(next, reason, cycle);
        self.mode
    }

    /// Rule 5: leave Recovery once a full cycle has been decided in it.
    /// Called after the cycle's control decision.
    pub fn settle(&mut self, cycle: u64) {
        if let (OperatingMode::Recovery, Some(entered)) = (self.mode, self.recovery_entered) {
            if cycle > entered {
                self.transition(OperatingMode::Normal, TransitionReason::RecoveryComplete, cycle);
            }
        }
    }

    fn transition(&mut self, to: OperatingMode, reason: TransitionReason, cycle: u64) {
        let record = TransitionRecord {
            cycle,
            from: self.mode,
            to,
            reason,
        };
        self.mode = to;
        self.recovery_entered = (to == OperatingMode::Recovery).then_some(cycle);
        self.audit.push(record);
        self.sink.emit(&SupervisorEvent::Transition(record));
    }
}
