//! Process-wide configuration, fixed at startup.
//!
//! Defaults reproduce the reference motor-speed setup (50 ms period, 5 ms
//! jitter tolerance). An optional TOML file overrides any subset of fields;
//! the upper-case constant names (`SAMPLE_TIME`, `DEADLINE`, ...) are accepted
//! as aliases. `validate()` runs once before the supervisor is built and the
//! result is never mutated afterwards.

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_SAMPLE_TIME: f64 = 0.05;
pub const DEFAULT_DEADLINE: f64 = 0.05;
pub const DEFAULT_MAX_JITTER: f64 = 0.005;
pub const DEFAULT_ATTACK_THRESHOLD: f64 = 0.3;
pub const DEFAULT_DEGRADED_CONTROL_LIMIT: f64 = 0.4;
pub const DEFAULT_RECOVERY_STABLE_CYCLES: u32 = 5;
pub const DEFAULT_SAFE_CONTROL: f64 = 0.0;

/// Supervisor timing and safety parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Control period [s].
    #[serde(alias = "SAMPLE_TIME")]
    pub sample_time: f64,
    /// Deadline [s], must be <= `sample_time`.
    #[serde(alias = "DEADLINE")]
    pub deadline: f64,
    /// Tolerance beyond the deadline before a miss counts as a hard violation [s].
    #[serde(alias = "MAX_JITTER")]
    pub max_jitter: f64,
    /// Residual threshold; strictly greater residuals flag an anomaly.
    #[serde(alias = "ATTACK_THRESHOLD")]
    pub attack_threshold: f64,
    /// Symmetric actuation clamp applied while degraded.
    #[serde(alias = "DEGRADED_CONTROL_LIMIT")]
    pub degraded_control_limit: f64,
    /// Consecutive stable cycles required before leaving Degraded.
    #[serde(alias = "RECOVERY_STABLE_CYCLES")]
    pub recovery_stable_cycles: u32,
    /// Fixed actuation value while in FailSafe.
    #[serde(alias = "SAFE_CONTROL")]
    pub safe_control: f64,
    pub sim: SimConfig,
}

/// Settings for the bundled plant, controller and perturbation models.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub setpoint: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Symmetric output limit of the nominal PID.
    pub output_limit: f64,
    /// Plant damping coefficient.
    pub plant_a: f64,
    /// Plant control gain.
    pub plant_b: f64,
    pub attack_probability: f64,
    pub attack_strength: f64,
    pub fault_probability: f64,
    pub fault_magnitude: f64,
    /// Kalman observer process / measurement noise.
    pub observer_q: f64,
    pub observer_r: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_time: DEFAULT_SAMPLE_TIME,
            deadline: DEFAULT_DEADLINE,
            max_jitter: DEFAULT_MAX_JITTER,
            attack_threshold: DEFAULT_ATTACK_THRESHOLD,
            degraded_control_limit: DEFAULT_DEGRADED_CONTROL_LIMIT,
            recovery_stable_cycles: DEFAULT_RECOVERY_STABLE_CYCLES,
            safe_control: DEFAULT_SAFE_CONTROL,
            sim: SimConfig::default(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            setpoint: 10.0,
            kp: 1.0,
            ki: 0.1,
            kd: 0.01,
            output_limit: 50.0,
            plant_a: 0.8,
            plant_b: 1.2,
            attack_probability: 0.2,
            attack_strength: 0.5,
            fault_probability: 0.05,
            fault_magnitude: 5.0,
            observer_q: 0.01,
            observer_r: 0.1,
        }
    }
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations the supervisor cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("sample_time", self.sample_time),
            ("deadline", self.deadline),
            ("max_jitter", self.max_jitter),
            ("attack_threshold", self.attack_threshold),
            ("degraded_control_limit", self.degraded_control_limit),
            ("safe_control", self.safe_control),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must be finite")));
        }

        for (name, secs) in [
            ("sample_time", self.sample_time),
            ("deadline", self.deadline),
            ("max_jitter", self.max_jitter),
        ] {
            if secs >= 0.0 && Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "{name} is not a representable duration (got {secs})"
                )));
            }
        }

        if self.sample_time <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sample_time must be > 0 (got {})",
                self.sample_time
            )));
        }
        if self.deadline <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "deadline must be > 0 (got {})",
                self.deadline
            )));
        }
        if self.deadline > self.sample_time {
            return Err(ConfigError::DeadlineExceedsPeriod {
                deadline: self.deadline,
                period: self.sample_time,
            });
        }
        if self.max_jitter < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_jitter must be >= 0 (got {})",
                self.max_jitter
            )));
        }
        if self.attack_threshold <= 0.0 {
            return Err(ConfigError::NonPositiveThreshold(self.attack_threshold));
        }
        if self.degraded_control_limit < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "degraded_control_limit must be >= 0 (got {})",
                self.degraded_control_limit
            )));
        }
        if self.recovery_stable_cycles < 1 {
            return Err(ConfigError::ZeroStableCycles(self.recovery_stable_cycles));
        }

        self.sim.validate()
    }

    #[inline]
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.sample_time)
    }
}

impl SimConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("attack_probability", self.attack_probability),
            ("fault_probability", self.fault_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1] (got {p})"
                )));
            }
        }
        if !(self.output_limit > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "output_limit must be > 0 (got {})",
                self.output_limit
            )));
        }
        if self.fault_magnitude < 0.0 || !self.fault_magnitude.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "fault_magnitude must be finite and >= 0 (got {})",
                self.fault_magnitude
            )));
        }
        if self.observer_r <= 0.0 || self.observer_q < 0.0 {
            return Err(ConfigError::Invalid(
                "observer noise must satisfy q >= 0 and r > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let cfg = Config { attack_threshold: 0.0, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::NonPositiveThreshold(_))));
    }

    #[test]
    fn rejects_deadline_beyond_period() {
        let cfg = Config { deadline: 0.06, ..Config::default() };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DeadlineExceedsPeriod { .. })
        ));
    }

    #[test]
    fn rejects_zero_stable_cycles() {
        let cfg = Config { recovery_stable_cycles: 0, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroStableCycles(0))));
    }

    #[test]
    fn rejects_unrepresentable_durations() {
        let cfg = Config { sample_time: 1e20, deadline: 1e20, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = Config { max_jitter: 1e30, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let mut cfg = Config::default();
        cfg.sim.attack_probability = 1.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn toml_overrides_and_aliases() {
        let cfg = Config::from_toml_str(
            r#"
            SAMPLE_TIME = 0.02
            deadline = 0.015
            recovery_stable_cycles = 3

            [sim]
            setpoint = 4.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sample_time, 0.02);
        assert_eq!(cfg.deadline, 0.015);
        assert_eq!(cfg.recovery_stable_cycles, 3);
        assert_eq!(cfg.sim.setpoint, 4.0);
        assert_eq!(cfg.max_jitter, DEFAULT_MAX_JITTER);
    }

    #[test]
    fn toml_validation_runs_on_load() {
        let err = Config::from_toml_str("attack_threshold = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveThreshold(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("sampel_time = 0.1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.toml");
        std::fs::write(&path, "max_jitter = 0.002\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.max_jitter, 0.002);

        let missing = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
