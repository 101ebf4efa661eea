//! Closed-loop runner: simulated motor, PID law and sensor perturbations
//! around the supervisor, paced by the cycle scheduler.
//!
//! Per cycle:
//! 1. read the true plant state and perturb it into the sensed value
//! 2. pick the expected value (true state, or the observer's prediction)
//! 3. `Supervisor::decide` → command → `Plant::apply`
//! 4. wait out the period, then `Supervisor::complete_cycle`
//!
//! The running flag is only checked between cycles.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use clap::ValueEnum;
use log::{error, info};

use crate::config::Config;
use crate::error::{ConfigError, SupervisorError};
use crate::plant::{
    Perturbation, Plant,
    controller::{PidController, PidGains},
    motor::MotorPlant,
    observer::KalmanObserver,
    perturbation::{FaultInjector, PerturbationChain, SensorAttacker, make_rng},
};
use crate::supervisor::cycle::{CycleReport, Supervisor};
use crate::timing::scheduler::CycleScheduler;
use crate::utils::{export::ShutdownSummary, telemetry::SharedSink};

/// Where the detector's expected value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExpectedSource {
    /// True plant state from the simulator.
    #[default]
    Plant,
    /// Kalman observer prediction from the previous estimate and command.
    Observer,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after this many cycles; `None` runs until the flag clears.
    pub max_cycles: Option<u64>,
    pub expected: ExpectedSource,
    /// Seed for the perturbation RNGs.
    pub seed: Option<u64>,
}

pub struct Runner {
    plant: MotorPlant,
    controller: PidController,
    perturbation: PerturbationChain,
    observer: Option<KalmanObserver>,
    scheduler: CycleScheduler,
    supervisor: Supervisor,
    setpoint: f64,
    dt: f64,
    last_command: f64,
    max_cycles: Option<u64>,
    running: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(
        config: &Config,
        options: RunOptions,
        sink: SharedSink,
        running: Arc<AtomicBool>,
    ) -> Result<Self, ConfigError> {
        let supervisor = Supervisor::new(config, sink)?;
        let sim = &config.sim;
        let dt = config.sample_time;

        let plant = MotorPlant::new(sim.plant_a, sim.plant_b);
        let controller = PidController::new(PidGains {
            kp: sim.kp,
            ki: sim.ki,
            kd: sim.kd,
            output_limit: sim.output_limit,
        });

        // Independent streams so enabling one model does not shift the other.
        let fault_seed = options.seed.map(|s| s.wrapping_add(1));
        let perturbation = PerturbationChain::new()
            .with(SensorAttacker::new(
                sim.attack_probability,
                sim.attack_strength,
                make_rng(options.seed),
            ))
            .with(FaultInjector::new(
                sim.fault_probability,
                sim.fault_magnitude,
                make_rng(fault_seed),
            ));

        let observer = match options.expected {
            ExpectedSource::Plant => None,
            ExpectedSource::Observer => {
                let (a, b) = plant.discrete_model(dt);
                Some(KalmanObserver::new(a, b, sim.observer_q, sim.observer_r))
            }
        };

        Ok(Self {
            plant,
            controller,
            perturbation,
            observer,
            scheduler: CycleScheduler::new(config.period()),
            supervisor,
            setpoint: sim.setpoint,
            dt,
            last_command: 0.0,
            max_cycles: options.max_cycles,
            running,
        })
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// One full control cycle including the wait for the next period.
    pub fn run_cycle(&mut self) -> Result<CycleReport, SupervisorError> {
        let cycle_start = Instant::now();

        let true_value = self.plant.measurement();
        let measured = self.perturbation.perturb(true_value);
        let expected = match self.observer.as_mut() {
            Some(obs) => {
                let predicted = obs.predict(self.last_command);
                obs.update(self.last_command, measured);
                predicted
            }
            None => true_value,
        };

        let decision = self.supervisor.decide(
            expected,
            measured,
            &mut self.controller,
            self.setpoint,
            self.dt,
        )?;
        self.plant.apply(decision.command, self.dt);
        self.last_command = decision.command;

        let execution = cycle_start.elapsed();
        let elapsed = self.scheduler.wait_for_next_cycle(cycle_start);

        Ok(self.supervisor.complete_cycle(&decision, elapsed, execution))
    }

    /// Run until the cycle limit or until the running flag clears. The
    /// shutdown summary is logged on every exit path.
    pub fn run(&mut self) -> Result<ShutdownSummary, SupervisorError> {
        info!(
            "control loop started: period={:?} setpoint={} expected={:?}",
            self.scheduler.period(),
            self.setpoint,
            if self.observer.is_some() { ExpectedSource::Observer } else { ExpectedSource::Plant },
        );

        while self.running.load(Ordering::SeqCst) {
            if self.max_cycles.is_some_and(|n| self.supervisor.cycle() >= n) {
                break;
            }
            if let Err(e) = self.run_cycle() {
                error!("control loop aborted: {}", e);
                self.supervisor.summary().log();
                return Err(e);
            }
        }

        info!("control loop stopped after {} cycles", self.supervisor.cycle());
        let summary = self.supervisor.summary();
        summary.log();
        Ok(summary)
    }
}
