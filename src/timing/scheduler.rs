//! Fixed-period cycle scheduler.
//!
//! Sleeps out the remainder of the period with a `SpinSleeper` (coarse OS
//! sleep, then spin) for sub-millisecond wake-up accuracy. A cycle that is
//! already late returns immediately so the overrun shows up as data.

use std::time::{Duration, Instant};

use spin_sleep::{SpinSleeper, SpinStrategy};

/// Native sleep accuracy handed to `SpinSleeper` [ns].
const SLEEP_ACCURACY_NS: u32 = 100_000;

pub struct CycleScheduler {
    period: Duration,
    sleeper: SpinSleeper,
}

impl CycleScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            sleeper: SpinSleeper::new(SLEEP_ACCURACY_NS).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait out the rest of the period started at `cycle_start`.
    ///
    /// On time: suspends for `period - elapsed` and reports the nominal
    /// `period`. Late: returns the true elapsed time without suspending.
    pub fn wait_for_next_cycle(&self, cycle_start: Instant) -> Duration {
        let elapsed = cycle_start.elapsed();
        match self.period.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => {
                self.sleeper.sleep(remaining);
                self.period
            }
            _ => elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_ago(d: Duration) -> Instant {
        Instant::now().checked_sub(d).expect("monotonic clock too close to origin")
    }

    #[test]
    fn late_cycle_returns_immediately_with_true_elapsed() {
        let sched = CycleScheduler::new(Duration::from_millis(50));
        let start = started_ago(Duration::from_millis(70));

        let call = Instant::now();
        let elapsed = sched.wait_for_next_cycle(start);
        let blocked = call.elapsed();

        assert!(elapsed >= Duration::from_millis(70));
        assert!(elapsed < Duration::from_millis(90), "elapsed {elapsed:?}");
        assert!(blocked < Duration::from_millis(5), "blocked {blocked:?}");
    }

    #[test]
    fn on_time_cycle_sleeps_remainder_and_reports_period() {
        let sched = CycleScheduler::new(Duration::from_millis(50));
        let start = started_ago(Duration::from_millis(10));

        let call = Instant::now();
        let elapsed = sched.wait_for_next_cycle(start);
        let blocked = call.elapsed();

        assert_eq!(elapsed, Duration::from_millis(50));
        assert!(blocked >= Duration::from_millis(38), "blocked {blocked:?}");
        assert!(blocked < Duration::from_millis(60), "blocked {blocked:?}");
    }
}
