//! Supervisor event sinks.
//!
//! The state machine and the monitor never log directly: they hand events to
//! an injected `EventSink`. Available sinks:
//! - **LogSink:** forwards to the `log` facade (error on FailSafe entry, warn
//!   for transitions and jitter, info for per-cycle records).
//! - **TelemetryRecorder:** lock-free queue (4K capacity) drained by a
//!   background thread into CSV. Never blocks the control loop; drops and
//!   counts when full.
//! - **MemorySink:** keeps every event in memory for inspection.
//! - **FanoutSink:** forwards each event to several sinks.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{Level, debug, error, log};
use parking_lot::Mutex;
use serde::Serialize;

use crate::supervisor::{
    cycle::CycleReport,
    state_machine::{OperatingMode, TransitionRecord},
};

const TELEMETRY_CAPACITY: usize = 4_096;
const EXPORTER_POLL_MS: u64 = 5;
const FLUSH_BATCHES: usize = 8;

/// Everything the supervisor reports while running.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// Mode change, including the AttackDetected audit marker.
    Transition(TransitionRecord),
    /// Cycle finished after its deadline.
    JitterWarning {
        cycle: u64,
        /// Response time [s].
        response: f64,
        deadline: f64,
        jitter: f64,
    },
    /// Structured per-cycle record.
    Cycle(CycleReport),
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SupervisorEvent);
}

pub type SharedSink = Arc<dyn EventSink>;

// ============================================================================
// LogSink
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    /// Severity an event is logged at. FailSafe entry is the only error.
    pub fn level(event: &SupervisorEvent) -> Level {
        match event {
            SupervisorEvent::Transition(t) if t.to == OperatingMode::FailSafe => Level::Error,
            SupervisorEvent::Transition(_) | SupervisorEvent::JitterWarning { .. } => Level::Warn,
            SupervisorEvent::Cycle(_) => Level::Info,
        }
    }
}

impl EventSink for LogSink {
    fn emit(&self, event: &SupervisorEvent) {
        let level = Self::level(event);
        match event {
            SupervisorEvent::Transition(t) if t.to == OperatingMode::FailSafe => {
                log!(
                    level,
                    "FAIL-SAFE ACTIVATED: cycle={} {} -> {} reason=\"{}\"",
                    t.cycle, t.from, t.to, t.reason
                );
            }
            SupervisorEvent::Transition(t) => {
                log!(
                    level,
                    "mode transition: cycle={} {} -> {} reason=\"{}\"",
                    t.cycle, t.from, t.to, t.reason
                );
            }
            SupervisorEvent::JitterWarning { cycle, response, deadline, jitter } => {
                log!(
                    level,
                    "deadline miss: cycle={} response={:.6}s deadline={:.6}s jitter={:+.6}s",
                    cycle, response, deadline, jitter
                );
            }
            SupervisorEvent::Cycle(r) => {
                log!(
                    level,
                    "cycle={} t={:.3} mode={} measurement={:.4} command={:.4} residual={:.4} stable={}",
                    r.cycle, r.timestamp, r.mode, r.measurement, r.command, r.residual, r.stable_cycles
                );
            }
        }
    }
}

// ============================================================================
// MemorySink
// ============================================================================

#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SupervisorEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<SupervisorEvent> {
        self.events.lock().clone()
    }

    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SupervisorEvent::Transition(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn cycles(&self) -> Vec<CycleReport> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SupervisorEvent::Cycle(r) => Some(*r),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &SupervisorEvent) {
        self.events.lock().push(event.clone());
    }
}

// ============================================================================
// FanoutSink
// ============================================================================

#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &SupervisorEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

// ============================================================================
// TelemetryRecorder
// ============================================================================

/// Flat CSV row; columns that do not apply to an event stay empty.
#[derive(Debug, Serialize)]
struct CsvRow {
    cycle: u64,
    event: &'static str,
    timestamp_s: Option<f64>,
    mode: Option<&'static str>,
    measurement: Option<f64>,
    command: Option<f64>,
    residual: Option<f64>,
    stable_cycles: Option<u32>,
    jitter_s: Option<f64>,
    detail: String,
}

impl CsvRow {
    fn from_event(event: &SupervisorEvent) -> Self {
        let empty = CsvRow {
            cycle: 0,
            event: "",
            timestamp_s: None,
            mode: None,
            measurement: None,
            command: None,
            residual: None,
            stable_cycles: None,
            jitter_s: None,
            detail: String::new(),
        };
        match event {
            SupervisorEvent::Cycle(r) => CsvRow {
                cycle: r.cycle,
                event: "cycle",
                timestamp_s: Some(r.timestamp),
                mode: Some(r.mode.name()),
                measurement: Some(r.measurement),
                command: Some(r.command),
                residual: Some(r.residual),
                stable_cycles: Some(r.stable_cycles),
                ..empty
            },
            SupervisorEvent::Transition(t) => CsvRow {
                cycle: t.cycle,
                event: "transition",
                mode: Some(t.to.name()),
                detail: format!("{}->{}: {}", t.from, t.to, t.reason),
                ..empty
            },
            SupervisorEvent::JitterWarning { cycle, jitter, .. } => CsvRow {
                cycle: *cycle,
                event: "deadline_miss",
                jitter_s: Some(*jitter),
                ..empty
            },
        }
    }
}

/// Non-blocking recorder with a background CSV exporter.
///
/// `emit()` pushes an owned copy of the event onto a bounded lock-free queue
/// and returns immediately. The exporter thread only ever sees those copies.
pub struct TelemetryRecorder {
    queue: Arc<ArrayQueue<SupervisorEvent>>,
    dropped: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    exporter: Mutex<Option<JoinHandle<()>>>,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::with_capacity(TELEMETRY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
            dropped: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            exporter: Mutex::new(None),
        }
    }

    /// Events lost to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Create `path` and start exporting into it.
    pub fn start_file_exporter(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        self.start_exporter(BufWriter::new(file))
    }

    /// Spawn the exporter thread draining the queue into `out` as CSV.
    pub fn start_exporter<W>(&self, out: W) -> io::Result<()>
    where
        W: Write + Send + 'static,
    {
        let mut guard = self.exporter.lock();
        if guard.is_some() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exporter already running"));
        }

        let queue = self.queue.clone();
        let running = self.running.clone();
        let dropped = self.dropped.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("telemetry-export".into())
            .spawn(move || {
                let mut wtr = Writer::from_writer(out);
                let mut batches = 0usize;

                while running.load(Ordering::SeqCst) {
                    let mut any = false;
                    while let Some(event) = queue.pop() {
                        any = true;
                        if let Err(e) = wtr.serialize(CsvRow::from_event(&event)) {
                            error!("telemetry row write failed: {}", e);
                        }
                    }
                    if any {
                        batches += 1;
                        if batches >= FLUSH_BATCHES {
                            if let Err(e) = wtr.flush() {
                                error!("telemetry flush failed: {}", e);
                            }
                            batches = 0;
                        }
                    } else {
                        thread::sleep(Duration::from_millis(EXPORTER_POLL_MS));
                    }
                }

                // Final drain after stop.
                while let Some(event) = queue.pop() {
                    if let Err(e) = wtr.serialize(CsvRow::from_event(&event)) {
                        error!("telemetry row write failed: {}", e);
                    }
                }
                if let Err(e) = wtr.flush() {
                    error!("telemetry flush failed: {}", e);
                }
                debug!(
                    "telemetry exporter exiting, dropped={}",
                    dropped.load(Ordering::Relaxed)
                );
            })?;

        *guard = Some(handle);
        Ok(())
    }

    /// Stop the exporter and wait for the final drain.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.exporter.lock().take() {
            if handle.join().is_err() {
                error!("telemetry exporter panicked");
            }
        }
    }
}

impl EventSink for TelemetryRecorder {
    fn emit(&self, event: &SupervisorEvent) {
        if self.queue.push(event.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for TelemetryRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::state_machine::TransitionReason;

    fn report(cycle: u64) -> CycleReport {
        CycleReport {
            cycle,
            timestamp: cycle as f64 * 0.05,
            mode: OperatingMode::Degraded,
            measurement: 9.5,
            command: 0.4,
            residual: 0.1,
            stable_cycles: 2,
        }
    }

    fn transition() -> TransitionRecord {
        TransitionRecord {
            cycle: 3,
            from: OperatingMode::Normal,
            to: OperatingMode::AttackDetected,
            reason: TransitionReason::SensorAnomaly,
        }
    }

    #[test]
    fn memory_sink_filters_by_kind() {
        let sink = MemorySink::default();
        sink.emit(&SupervisorEvent::Cycle(report(0)));
        sink.emit(&SupervisorEvent::Transition(transition()));
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.cycles(), vec![report(0)]);
        assert_eq!(sink.transitions(), vec![transition()]);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::default());
        let b = Arc::new(MemorySink::default());
        let fan = FanoutSink::new().with(a.clone()).with(b.clone());
        fan.emit(&SupervisorEvent::Cycle(report(1)));
        assert_eq!(a.cycles().len(), 1);
        assert_eq!(b.cycles().len(), 1);
    }

    #[test]
    fn log_sink_severity_routing() {
        let fail_safe = TransitionRecord {
            cycle: 9,
            from: OperatingMode::Degraded,
            to: OperatingMode::FailSafe,
            reason: TransitionReason::HardTimingViolation,
        };
        let miss = SupervisorEvent::JitterWarning {
            cycle: 2,
            response: 0.052,
            deadline: 0.05,
            jitter: 0.002,
        };

        assert_eq!(LogSink::level(&SupervisorEvent::Transition(fail_safe)), Level::Error);
        assert_eq!(LogSink::level(&SupervisorEvent::Transition(transition())), Level::Warn);
        assert_eq!(LogSink::level(&miss), Level::Warn);
        assert_eq!(LogSink::level(&SupervisorEvent::Cycle(report(0))), Level::Info);

        // Every event kind goes through without a logger installed.
        for event in [SupervisorEvent::Transition(fail_safe), miss, SupervisorEvent::Cycle(report(0))] {
            LogSink.emit(&event);
        }
    }

    #[test]
    fn recorder_drops_when_full() {
        let rec = TelemetryRecorder::with_capacity(2);
        for i in 0..5 {
            rec.emit(&SupervisorEvent::Cycle(report(i)));
        }
        assert_eq!(rec.dropped(), 3);
    }

    #[test]
    fn exporter_writes_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");

        let rec = TelemetryRecorder::new();
        rec.start_file_exporter(&path).unwrap();
        rec.emit(&SupervisorEvent::Cycle(report(0)));
        rec.emit(&SupervisorEvent::Transition(transition()));
        rec.emit(&SupervisorEvent::JitterWarning {
            cycle: 4,
            response: 0.07,
            deadline: 0.05,
            jitter: 0.02,
        });
        rec.stop();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("cycle,event,timestamp_s,mode"));
        assert!(lines[1].starts_with("0,cycle,0.0,Degraded,9.5,0.4,0.1,2"));
        assert!(lines[2].contains("transition"));
        assert!(lines[2].contains("Normal->AttackDetected: sensor anomaly"));
        assert!(lines[3].starts_with("4,deadline_miss"));
    }

    #[test]
    fn exporter_cannot_start_twice() {
        let rec = TelemetryRecorder::new();
        rec.start_exporter(io::sink()).unwrap();
        assert!(rec.start_exporter(io::sink()).is_err());
        rec.stop();
    }
}
