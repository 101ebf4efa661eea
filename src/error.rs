//! Error types for the supervisor.
//!
//! Only configuration problems and controller argument faults are errors.
//! Deadline misses and jitter violations are data: they drive mode
//! transitions and never show up here.

use thiserror::Error;

/// Startup configuration rejected. Detected once, before the first cycle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("residual threshold must be > 0 (got {0})")]
    NonPositiveThreshold(f64),
    #[error("deadline {deadline}s exceeds sample period {period}s")]
    DeadlineExceedsPeriod { deadline: f64, period: f64 },
    #[error("recovery requires at least one stable cycle (got {0})")]
    ZeroStableCycles(u32),
    #[error("config validation: {0}")]
    Invalid(String),
}

/// Nominal control law fault. Fatal for the cycle.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("dt must be > 0 (got {0})")]
    InvalidTimeStep(f64),
    #[error("controller rejected setpoint {0}")]
    SetpointRejected(f64),
}

/// Unrecognised operating mode value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("unknown operating mode name '{0}'")]
    UnknownName(String),
    #[error("unknown operating mode code {0}")]
    UnknownCode(u8),
}

/// Anything that aborts a supervised run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cycle {cycle}: {source}")]
    Control {
        cycle: u64,
        #[source]
        source: ControlError,
    },
}
