//! # Supervisory Controller Entry Point
//!
//! Runs the simulated motor loop under the timing-aware supervisor.
//!
//! ## Threads
//! - **control-loop:** `ThreadPriority::Max`, optionally pinned to one core.
//!   Owns the plant, controller, scheduler and supervisor.
//! - **telemetry-export:** drains per-cycle records to CSV when `--trace` is given.
//!
//! ## Shutdown
//! Ctrl-C clears the running flag; the loop finishes the current cycle,
//! logs the shutdown summary and exits.

use std::{
    error::Error,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use clap::Parser;
use log::{error, info, warn};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use cps_supervisor::{
    config::Config,
    error::SupervisorError,
    runner::{ExpectedSource, RunOptions, Runner},
    utils::{
        export::ShutdownSummary,
        telemetry::{FanoutSink, LogSink, SharedSink, TelemetryRecorder},
    },
};

#[derive(Parser, Debug)]
#[command(name = "cps_supervisor")]
#[command(version)]
#[command(about = "Timing-aware supervisory controller for a simulated motor loop")]
struct Cli {
    /// TOML configuration file; built-in defaults otherwise.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after N cycles instead of running until interrupted.
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Write every supervisor event to this CSV file.
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Seed for reproducible attacks and faults.
    #[arg(long)]
    seed: Option<u64>,

    /// Source of the detector's expected value.
    #[arg(long, value_enum, default_value_t = ExpectedSource::Plant)]
    expected: ExpectedSource,

    /// Pin the control-loop thread to this core.
    #[arg(long, value_name = "ID")]
    core: Option<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    info!("=== CPS SUPERVISOR START ===");

    let config = match &cli.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            Config::load(path)?
        }
        None => Config::default(),
    };
    config.validate()?;
    info!(
        "period={}s deadline={}s max_jitter={}s threshold={} stable_cycles={}",
        config.sample_time,
        config.deadline,
        config.max_jitter,
        config.attack_threshold,
        config.recovery_stable_cycles
    );

    let recorder = match &cli.trace {
        Some(path) => {
            let recorder = Arc::new(TelemetryRecorder::new());
            recorder.start_file_exporter(path)?;
            info!("tracing events to {}", path.display());
            Some(recorder)
        }
        None => None,
    };

    let mut fanout = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(recorder) = &recorder {
        fanout = fanout.with(recorder.clone());
    }
    let sink: SharedSink = Arc::new(fanout);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let options = RunOptions {
        max_cycles: cli.cycles,
        expected: cli.expected,
        seed: cli.seed,
    };
    let core = cli.core;

    // The runner is built on the control thread so none of its state crosses threads.
    let handle = thread::Builder::new()
        .name("control-loop".into())
        .spawn_with_priority(
            ThreadPriority::Max,
            move |priority| -> Result<ShutdownSummary, SupervisorError> {
                if let Err(e) = priority {
                    warn!("could not raise control-loop priority: {:?}", e);
                }
                if let Some(core) = core {
                    pin_to_core(core);
                }
                let mut runner = Runner::new(&config, options, sink, running)?;
                runner.run()
            },
        )?;

    let outcome = handle
        .join()
        .map_err(|_| "control-loop thread panicked")?;

    if let Some(recorder) = &recorder {
        recorder.stop();
        if recorder.dropped() > 0 {
            warn!("telemetry dropped {} events", recorder.dropped());
        }
    }

    match outcome {
        Ok(summary) => {
            println!("{summary}");
            info!("=== CPS SUPERVISOR FINISHED ===");
            Ok(())
        }
        Err(e) => {
            error!("supervisor stopped with error: {}", e);
            Err(Box::new(e))
        }
    }
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(id) if core_affinity::set_for_current(*id) => info!("control loop pinned to core {}", core),
        Some(_) => error!("failed to pin control loop to core {}", core),
        None => error!("core {} not found among available cores", core),
    }
}
