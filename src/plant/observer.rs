//! Scalar Kalman observer.
//!
//! Alternative source for the detector's expected value: instead of the
//! simulator's true plant state, the prediction `a*x + b*u` from the previous
//! estimate and the last applied command.

#[derive(Debug, Clone)]
pub struct KalmanObserver {
    a: f64,
    b: f64,
    q: f64,
    r: f64,
    x_hat: f64,
    p: f64,
}

impl KalmanObserver {
    pub fn new(a: f64, b: f64, q: f64, r: f64) -> Self {
        Self {
            a,
            b,
            q,
            r,
            x_hat: 0.0,
            p: 1.0,
        }
    }

    #[inline]
    pub fn estimate(&self) -> f64 {
        self.x_hat
    }

    /// A-priori prediction for the next measurement under command `u`.
    #[inline]
    pub fn predict(&self, u: f64) -> f64 {
        self.a * self.x_hat + self.b * u
    }

    /// Predict/correct with measurement `z`. Returns `(estimate, |estimate - z|)`.
    pub fn update(&mut self, u: f64, z: f64) -> (f64, f64) {
        let x_pred = self.predict(u);
        let p_pred = self.a * self.p * self.a + self.q;

        let k = p_pred / (p_pred + self.r);
        self.x_hat = x_pred + k * (z - x_pred);
        self.p = (1.0 - k) * p_pred;

        (self.x_hat, (self.x_hat - z).abs())
    }
}
