//! controller.rs
//! Nominal PID control law built on `pidgeon`.
//!
//! Output limits with anti-windup bound the command. `reset()` rebuilds the
//! underlying controller so no integral or derivative history survives.

use pidgeon::{ControllerConfig, PidController as Pid};

use crate::error::ControlError;
use crate::plant::NominalController;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Symmetric output bound.
    pub output_limit: f64,
}

pub struct PidController {
    gains: PidGains,
    pid: Pid,
    setpoint: Option<f64>,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            pid: build(&gains),
            setpoint: None,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }
}

fn build(gains: &PidGains) -> Pid {
    let config = ControllerConfig::new()
        .with_kp(gains.kp)
        .with_ki(gains.ki)
        .with_kd(gains.kd)
        .with_output_limits(-gains.output_limit, gains.output_limit)
        .with_anti_windup(true);
    Pid::new(config)
}

impl NominalController for PidController {
    fn compute(&mut self, setpoint: f64, measurement: f64, dt: f64) -> Result<f64, ControlError> {
        if !(dt > 0.0) {
            return Err(ControlError::InvalidTimeStep(dt));
        }

        if self.setpoint.is_none_or(|sp| (sp - setpoint).abs() > f64::EPSILON) {
            if self.pid.set_setpoint(setpoint).is_err() {
                return Err(ControlError::SetpointRejected(setpoint));
            }
            self.setpoint = Some(setpoint);
        }

        Ok(self.pid.compute(measurement, dt))
    }

    fn reset(&mut self) {
        self.pid = build(&self.gains);
        self.setpoint = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains() -> PidGains {
        PidGains {
            kp: 1.0,
            ki: 0.1,
            kd: 0.01,
            output_limit: 50.0,
        }
    }

    #[test]
    fn rejects_non_positive_dt() {
        let mut pid = PidController::new(gains());
        assert_eq!(pid.compute(10.0, 0.0, 0.0), Err(ControlError::InvalidTimeStep(0.0)));
        assert_eq!(pid.compute(10.0, 0.0, -0.05), Err(ControlError::InvalidTimeStep(-0.05)));
    }

    #[test]
    fn drives_towards_setpoint_within_limits() {
        let mut pid = PidController::new(gains());
        let u = pid.compute(10.0, 0.0, 0.05).unwrap();
        assert!(u > 0.0);
        assert!(u <= 50.0);

        let mut pid = PidController::new(gains());
        let u = pid.compute(0.0, 10.0, 0.05).unwrap();
        assert!(u < 0.0);
    }

    #[test]
    fn reset_discards_history() {
        let mut fresh = PidController::new(gains());
        let first = fresh.compute(10.0, 2.0, 0.05).unwrap();

        let mut used = PidController::new(gains());
        for _ in 0..50 {
            used.compute(10.0, 0.0, 0.05).unwrap();
        }
        used.reset();
        let after_reset = used.compute(10.0, 2.0, 0.05).unwrap();

        assert_eq!(first, after_reset);
    }
}
