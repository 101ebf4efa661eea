//! Consecutive-stable-cycle counter gating Degraded → Recovery.

#[derive(Debug, Default, Clone)]
pub struct RecoveryTracker {
    stable_cycles: u32,
}

impl RecoveryTracker {
    pub const fn new() -> Self {
        Self { stable_cycles: 0 }
    }

    #[inline]
    pub fn stable_cycles(&self) -> u32 {
        self.stable_cycles
    }

    /// Count the cycle as stable when `residual < threshold`, otherwise start over.
    pub fn record_cycle(&mut self, residual: f64, threshold: f64) -> u32 {
        if residual < threshold {
            self.stable_cycles = self.stable_cycles.saturating_add(1);
        } else {
            self.stable_cycles = 0;
        }
        self.stable_cycles
    }

    pub fn reset(&mut self) {
        self.stable_cycles = 0;
    }
}
