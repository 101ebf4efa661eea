//! Shutdown summary: schedulability verdict plus aggregate run statistics.

use std::{fmt, time::Duration};

use log::info;

use crate::supervisor::state_machine::OperatingMode;
use crate::timing::monitor::Verdict;

/// Statistics summary for a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean. `None` for an empty slice.
pub fn calculate_stats(data: &[f64]) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

/// Flushed once when the run ends, including after an interrupt.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownSummary {
    pub max_execution_time: Duration,
    pub utilization: f64,
    pub verdict: Verdict,
    pub cycles: u64,
    pub deadline_misses: usize,
    pub jitter: Option<Stats>,
    pub final_mode: OperatingMode,
    pub transitions: usize,
}

impl ShutdownSummary {
    /// Emit the summary at info level.
    pub fn log(&self) {
        info!("=== SUPERVISOR SHUTDOWN SUMMARY ===");
        for line in self.to_string().lines() {
            info!("{}", line);
        }
    }
}

impl fmt::Display for ShutdownSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cycles            : {}", self.cycles)?;
        writeln!(
            f,
            "max execution (s) : {:.6}",
            self.max_execution_time.as_secs_f64()
        )?;
        writeln!(f, "utilization       : {:.3}", self.utilization)?;
        writeln!(f, "verdict           : {}", self.verdict)?;
        writeln!(f, "deadline misses   : {}", self.deadline_misses)?;
        if let Some(j) = &self.jitter {
            writeln!(
                f,
                "jitter (s)        : min={:+.6} max={:+.6} mean={:+.6}",
                j.min, j.max, j.mean
            )?;
        }
        writeln!(f, "transitions       : {}", self.transitions)?;
        write!(f, "final mode        : {}", self.final_mode)
    }
}
