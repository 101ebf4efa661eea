//! DC motor speed model.
//!
//! Discrete-time: `w(k+1) = w(k) + dt * (-a*w + b*u)`, speed clamped at 0.

use crate::plant::Plant;

#[derive(Debug, Clone)]
pub struct MotorPlant {
    speed: f64,
    /// Damping.
    a: f64,
    /// Control gain.
    b: f64,
}

impl MotorPlant {
    pub fn new(a: f64, b: f64) -> Self {
        Self { speed: 0.0, a, b }
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Coefficients of the equivalent `x' = A x + B u` discretisation for `dt`.
    pub fn discrete_model(&self, dt: f64) -> (f64, f64) {
        (1.0 - dt * self.a, dt * self.b)
    }
}

impl Default for MotorPlant {
    fn default() -> Self {
        Self::new(0.8, 1.2)
    }
}

impl Plant for MotorPlant {
    fn measurement(&self) -> f64 {
        self.speed
    }

    fn apply(&mut self, command: f64, dt: f64) {
        self.speed += dt * (-self.a * self.speed + self.b * command);
        // Physical constraint: the motor does not run backwards.
        if self.speed < 0.0 {
            self.speed = 0.0;
        }
    }
}
