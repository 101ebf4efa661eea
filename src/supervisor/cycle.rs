//! Per-cycle decision procedure.
//!
//! A cycle is split in two so the plant and the scheduler wait can sit in
//! between:
//! - `decide()`: detector → mode rules → recovery tracker → control policy.
//! - `complete_cycle()`: monitor update, timing classification for the next
//!   cycle's rules, Recovery → Normal settle, structured record.
//!
//! Timing results of cycle `k` feed the rules of cycle `k + 1`.

use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{ConfigError, SupervisorError};
use crate::plant::NominalController;
use crate::supervisor::{
    detector::{ResidualDetector, ResidualSample},
    policy::ControlPolicy,
    recovery::RecoveryTracker,
    state_machine::{ModeInputs, OperatingMode, SupervisoryStateMachine, TimingEvent, TransitionRecord},
};
use crate::timing::monitor::ExecutionMonitor;
use crate::utils::{
    export::ShutdownSummary,
    telemetry::{SharedSink, SupervisorEvent},
};

/// Structured per-cycle record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Seconds since supervisor start.
    pub timestamp: f64,
    /// Mode the control decision was made in.
    pub mode: OperatingMode,
    pub measurement: f64,
    pub command: f64,
    pub residual: f64,
    pub stable_cycles: u32,
}

/// Output of `decide()`, consumed by `complete_cycle()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleDecision {
    pub cycle: u64,
    pub timestamp: f64,
    pub mode: OperatingMode,
    pub sample: ResidualSample,
    pub command: f64,
    pub stable_cycles: u32,
}

pub struct Supervisor {
    deadline: Duration,
    max_jitter: f64,
    required_stable_cycles: u32,
    detector: ResidualDetector,
    machine: SupervisoryStateMachine,
    tracker: RecoveryTracker,
    policy: ControlPolicy,
    monitor: ExecutionMonitor,
    sink: SharedSink,
    cycle: u64,
    pending_timing: TimingEvent,
    run_start: Instant,
}

impl Supervisor {
    /// Validates `config`; a rejected configuration never reaches the first cycle.
    pub fn new(config: &Config, sink: SharedSink) -> Result<Self, ConfigError> {
        config.validate()?;
        let period = config.period();
        Ok(Self {
            deadline: Duration::from_secs_f64(config.deadline),
            max_jitter: config.max_jitter,
            required_stable_cycles: config.recovery_stable_cycles,
            detector: ResidualDetector::new(config.attack_threshold)?,
            machine: SupervisoryStateMachine::new(sink.clone()),
            tracker: RecoveryTracker::new(),
            policy: ControlPolicy::new(config.degraded_control_limit, config.safe_control),
            monitor: ExecutionMonitor::new(period, sink.clone()),
            sink,
            cycle: 0,
            pending_timing: TimingEvent::OnTime,
            run_start: Instant::now(),
        })
    }

    #[inline]
    pub fn mode(&self) -> OperatingMode {
        self.machine.mode()
    }

    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[inline]
    pub fn stable_cycles(&self) -> u32 {
        self.tracker.stable_cycles()
    }

    pub fn audit_log(&self) -> &[TransitionRecord] {
        self.machine.audit_log()
    }

    pub fn monitor(&self) -> &ExecutionMonitor {
        &self.monitor
    }

    /// Choose this cycle's actuation command.
    ///
    /// `controller` is not touched while in FailSafe. It is reset when
    /// FailSafe is entered. A controller error aborts the cycle.
    pub fn decide<C>(
        &mut self,
        expected: f64,
        measured: f64,
        controller: &mut C,
        setpoint: f64,
        dt: f64,
    ) -> Result<CycleDecision, SupervisorError>
    where
        C: NominalController + ?Sized,
    {
        let cycle = self.cycle;
        let timestamp = self.run_start.elapsed().as_secs_f64();
        let sample = self.detector.evaluate(expected, measured);

        let prior = self.machine.mode();
        let mode = self.machine.evaluate(
            ModeInputs {
                timing: std::mem::take(&mut self.pending_timing),
                anomaly: sample.is_attack,
                stable_cycles: self.tracker.stable_cycles(),
                required_stable_cycles: self.required_stable_cycles,
            },
            cycle,
        );

        if mode == OperatingMode::Degraded && prior != OperatingMode::Degraded {
            self.tracker.reset();
        }
        if mode == OperatingMode::FailSafe && prior != OperatingMode::FailSafe {
            controller.reset();
        }
        if mode == OperatingMode::Degraded {
            self.tracker.record_cycle(sample.residual, sample.threshold);
        }

        let command = self
            .policy
            .select(mode, || controller.compute(setpoint, measured, dt))
            .map_err(|source| SupervisorError::Control { cycle, source })?;

        Ok(CycleDecision {
            cycle,
            timestamp,
            mode,
            sample,
            command,
            stable_cycles: self.tracker.stable_cycles(),
        })
    }

    /// Close the cycle with its timing.
    ///
    /// `elapsed` is what the scheduler returned (the period when on time);
    /// `execution` is the processing time before the wait.
    pub fn complete_cycle(
        &mut self,
        decision: &CycleDecision,
        elapsed: Duration,
        execution: Duration,
    ) -> CycleReport {
        let jitter = self
            .monitor
            .record_cycle(decision.timestamp, elapsed, self.deadline, execution);
        self.monitor.track_execution_time(execution);
        self.pending_timing = self.classify(jitter);

        self.machine.settle(decision.cycle);

        let report = CycleReport {
            cycle: decision.cycle,
            timestamp: decision.timestamp,
            mode: decision.mode,
            measurement: decision.sample.measured,
            command: decision.command,
            residual: decision.sample.residual,
            stable_cycles: decision.stable_cycles,
        };
        self.sink.emit(&SupervisorEvent::Cycle(report));
        self.cycle += 1;
        report
    }

    /// Timing class from the signed jitter the monitor recorded.
    fn classify(&self, jitter: f64) -> TimingEvent {
        if jitter > self.max_jitter {
            TimingEvent::HardViolation
        } else if jitter > 0.0 {
            TimingEvent::SoftMiss
        } else {
            TimingEvent::OnTime
        }
    }

    pub fn summary(&self) -> ShutdownSummary {
        let sched = self.monitor.schedulability();
        ShutdownSummary {
            max_execution_time: sched.max_execution_time,
            utilization: sched.utilization,
            verdict: sched.verdict,
            cycles: self.cycle,
            deadline_misses: self.monitor.deadline_misses(),
            jitter: self.monitor.jitter_stats(),
            final_mode: self.machine.mode(),
            transitions: self.machine.audit_log().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use crate::supervisor::state_machine::TransitionReason;
    use crate::utils::telemetry::MemorySink;
    use std::sync::Arc;

    /// Returns a fixed command and counts calls.
    struct FixedController {
        output: f64,
        calls: u32,
        resets: u32,
    }

    impl NominalController for FixedController {
        fn compute(&mut self, _sp: f64, _m: f64, dt: f64) -> Result<f64, ControlError> {
            if dt <= 0.0 {
                return Err(ControlError::InvalidTimeStep(dt));
            }
            self.calls += 1;
            Ok(self.output)
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    const ON_TIME: Duration = Duration::from_millis(50);
    const EXEC: Duration = Duration::from_millis(2);

    fn setup(threshold: f64, stable: u32) -> (Supervisor, Arc<MemorySink>, FixedController) {
        let config = Config {
            attack_threshold: threshold,
            recovery_stable_cycles: stable,
            ..Config::default()
        };
        let sink = Arc::new(MemorySink::default());
        let sup = Supervisor::new(&config, sink.clone()).unwrap();
        let ctl = FixedController { output: 10.0, calls: 0, resets: 0 };
        (sup, sink, ctl)
    }

    fn step(sup: &mut Supervisor, ctl: &mut FixedController, e: f64, m: f64, elapsed: Duration, exec: Duration) -> CycleReport {
        let d = sup.decide(e, m, ctl, 10.0, 0.05).unwrap();
        sup.complete_cycle(&d, elapsed, exec)
    }

    #[test]
    fn rejects_invalid_config() {
        let config = Config { attack_threshold: 0.0, ..Config::default() };
        assert!(Supervisor::new(&config, Arc::new(MemorySink::default())).is_err());
    }

    #[test]
    fn attack_in_normal_lands_in_degraded_same_cycle() {
        let (mut sup, sink, mut ctl) = setup(1.5, 3);
        let r = step(&mut sup, &mut ctl, 10.0, 12.0, ON_TIME, EXEC);

        assert_eq!(r.mode, OperatingMode::Degraded);
        assert_eq!(r.residual, 2.0);
        assert_eq!(r.stable_cycles, 0);
        assert_eq!(r.command, 0.4);
        assert_eq!(sup.mode(), OperatingMode::Degraded);

        let modes: Vec<_> = sink.transitions().iter().map(|t| t.to).collect();
        assert_eq!(modes, vec![OperatingMode::AttackDetected, OperatingMode::Degraded]);
    }

    #[test]
    fn soft_miss_degrades_next_cycle() {
        let (mut sup, _, mut ctl) = setup(0.3, 3);
        let late = Duration::from_millis(53);
        let r0 = step(&mut sup, &mut ctl, 1.0, 1.0, late, late);
        assert_eq!(r0.mode, OperatingMode::Normal);
        assert_eq!(r0.command, 10.0);

        let r1 = step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, EXEC);
        assert_eq!(r1.mode, OperatingMode::Degraded);
        assert_eq!(r1.command, 0.4);
        assert_eq!(sup.monitor().deadline_misses(), 1);
    }

    #[test]
    fn hard_violation_in_degraded_reaches_fail_safe() {
        let (mut sup, sink, mut ctl) = setup(0.3, 3);
        let very_late = Duration::from_millis(80);

        step(&mut sup, &mut ctl, 0.0, 5.0, ON_TIME, EXEC);
        assert_eq!(sup.mode(), OperatingMode::Degraded);
        step(&mut sup, &mut ctl, 0.0, 0.0, very_late, very_late);
        let calls_before = ctl.calls;

        let r = step(&mut sup, &mut ctl, 0.0, 0.0, ON_TIME, EXEC);
        assert_eq!(r.mode, OperatingMode::FailSafe);
        assert_eq!(r.command, 0.0);
        assert_eq!(ctl.calls, calls_before);
        assert_eq!(ctl.resets, 1);

        // Terminal, and the controller stays frozen.
        for _ in 0..10 {
            let r = step(&mut sup, &mut ctl, 0.0, 0.0, ON_TIME, EXEC);
            assert_eq!(r.mode, OperatingMode::FailSafe);
        }
        assert_eq!(ctl.calls, calls_before);
        assert_eq!(sink.transitions().last().unwrap().to, OperatingMode::FailSafe);
    }

    #[test]
    fn overrun_classification_uses_true_elapsed() {
        let (mut sup, _, mut ctl) = setup(0.3, 3);
        step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, EXEC);
        assert_eq!(sup.pending_timing, TimingEvent::OnTime);
        step(&mut sup, &mut ctl, 1.0, 1.0, Duration::from_millis(54), Duration::from_millis(54));
        assert_eq!(sup.pending_timing, TimingEvent::SoftMiss);
        step(&mut sup, &mut ctl, 1.0, 1.0, Duration::from_millis(56), Duration::from_millis(56));
        assert_eq!(sup.pending_timing, TimingEvent::HardViolation);
    }

    #[test]
    fn short_deadline_misses_agree_with_transitions() {
        let config = Config { deadline: 0.03, ..Config::default() };
        let sink = Arc::new(MemorySink::default());
        let mut sup = Supervisor::new(&config, sink.clone()).unwrap();
        let mut ctl = FixedController { output: 10.0, calls: 0, resets: 0 };

        // Scheduler slept: processing well inside the deadline.
        for _ in 0..5 {
            step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, EXEC);
        }
        assert_eq!(sup.mode(), OperatingMode::Normal);
        assert_eq!(sup.summary().deadline_misses, 0);
        assert!(sink.transitions().is_empty());
        assert!(!sink.events().iter().any(|e| matches!(e, SupervisorEvent::JitterWarning { .. })));

        // Processing overran the 30 ms deadline within tolerance.
        step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, Duration::from_millis(33));
        assert_eq!(sup.pending_timing, TimingEvent::SoftMiss);
        let r = step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, EXEC);
        assert_eq!(r.mode, OperatingMode::Degraded);
        assert_eq!(sup.summary().deadline_misses, 1);
        assert_eq!(sink.transitions()[0].reason, TransitionReason::DeadlineMiss);

        // Beyond deadline + tolerance while degraded.
        step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, Duration::from_millis(40));
        assert_eq!(sup.pending_timing, TimingEvent::HardViolation);
        assert_eq!(step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, EXEC).mode, OperatingMode::FailSafe);
        assert_eq!(sup.summary().deadline_misses, 2);
    }

    #[test]
    fn controller_error_aborts_cycle() {
        let (mut sup, _, mut ctl) = setup(0.3, 3);
        let err = sup.decide(1.0, 1.0, &mut ctl, 10.0, 0.0).unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Control { cycle: 0, source: ControlError::InvalidTimeStep(_) }
        ));
    }

    #[test]
    fn summary_reflects_run() {
        let (mut sup, _, mut ctl) = setup(0.3, 3);
        step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, Duration::from_millis(30));
        step(&mut sup, &mut ctl, 1.0, 1.0, ON_TIME, Duration::from_millis(5));
        let s = sup.summary();
        assert_eq!(s.cycles, 2);
        assert_eq!(s.max_execution_time, Duration::from_millis(30));
        assert!((s.utilization - 0.6).abs() < 1e-9);
        assert_eq!(s.final_mode, OperatingMode::Normal);
        assert_eq!(s.transitions, 0);
    }
}
