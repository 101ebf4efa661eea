//! Execution monitor: per-cycle jitter history, WCET and the post-run
//! schedulability check.
//!
//! One timing model for the whole supervisor. A cycle's response time is the
//! true elapsed time when it overran the period, otherwise its processing
//! time. Signed jitter `response - deadline` is kept for every cycle; the
//! deadline-miss count is derived from it (positive entries) and the same
//! value classifies the cycle for the mode rules.

use std::{fmt, time::Duration};

use crate::utils::{
    export::{Stats, calculate_stats},
    telemetry::{SharedSink, SupervisorEvent},
};

/// Single-task rate-monotonic utilization bound (≈ ln 2).
pub const RM_UTILIZATION_BOUND: f64 = 0.69;

/// Timing of one completed cycle. Never mutated after append.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleRecord {
    pub cycle: u64,
    /// Cycle start, seconds since supervisor start.
    pub start: f64,
    /// As returned by the scheduler: the period when on time.
    pub elapsed: Duration,
    pub deadline: Duration,
    pub response: Duration,
    /// `response - deadline` [s]; positive means the deadline was missed.
    pub jitter: f64,
    pub execution: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Schedulable,
    SchedulingRisk,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Schedulable => f.write_str("schedulable"),
            Verdict::SchedulingRisk => f.write_str("scheduling risk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulabilityReport {
    pub max_execution_time: Duration,
    pub utilization: f64,
    pub verdict: Verdict,
}

pub struct ExecutionMonitor {
    period: Duration,
    records: Vec<CycleRecord>,
    max_execution: Duration,
    sink: SharedSink,
}

impl ExecutionMonitor {
    pub fn new(period: Duration, sink: SharedSink) -> Self {
        Self {
            period,
            records: Vec::new(),
            max_execution: Duration::ZERO,
            sink,
        }
    }

    /// Response time of a cycle: the true elapsed time for an overrun, the
    /// processing time when the scheduler slept out the period.
    #[inline]
    pub fn response_time(&self, elapsed: Duration, execution: Duration) -> Duration {
        if elapsed > self.period { elapsed } else { execution }
    }

    /// Append a cycle's timing; warns through the sink when the deadline was missed.
    /// Returns the signed jitter [s].
    pub fn record_cycle(
        &mut self,
        start: f64,
        elapsed: Duration,
        deadline: Duration,
        execution: Duration,
    ) -> f64 {
        let cycle = self.records.len() as u64;
        let response = self.response_time(elapsed, execution);
        let jitter = response.as_secs_f64() - deadline.as_secs_f64();
        self.records.push(CycleRecord {
            cycle,
            start,
            elapsed,
            deadline,
            response,
            jitter,
            execution,
        });

        if jitter > 0.0 {
            self.sink.emit(&SupervisorEvent::JitterWarning {
                cycle,
                response: response.as_secs_f64(),
                deadline: deadline.as_secs_f64(),
                jitter,
            });
        }
        jitter
    }

    /// Running maximum of per-cycle processing time.
    pub fn track_execution_time(&mut self, duration: Duration) {
        if duration > self.max_execution {
            self.max_execution = duration;
        }
    }

    #[inline]
    pub fn max_execution_time(&self) -> Duration {
        self.max_execution
    }

    pub fn records(&self) -> &[CycleRecord] {
        &self.records
    }

    pub fn jitter_log(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.jitter).collect()
    }

    pub fn deadline_misses(&self) -> usize {
        self.records.iter().filter(|r| r.jitter > 0.0).count()
    }

    pub fn jitter_stats(&self) -> Option<Stats> {
        calculate_stats(&self.jitter_log())
    }

    /// Run once at shutdown.
    pub fn schedulability(&self) -> SchedulabilityReport {
        schedulability(self.max_execution, self.period)
    }
}

/// `utilization = wcet / period`; schedulable strictly below the RM bound.
pub fn schedulability(max_execution_time: Duration, period: Duration) -> SchedulabilityReport {
    let utilization = max_execution_time.as_secs_f64() / period.as_secs_f64();
    let verdict = if utilization < RM_UTILIZATION_BOUND {
        Verdict::Schedulable
    } else {
        Verdict::SchedulingRisk
    };
    SchedulabilityReport {
        max_execution_time,
        utilization,
        verdict,
    }
}
