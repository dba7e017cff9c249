//! Run controller
//!
//! Owns one benchmark run end to end: validates config, prepares the
//! workload, spawns the worker pool, enforces the deadline, and freezes
//! the final report. A controller is single-use; build a fresh one to
//! run again.

use crate::config::{Family, RunConfig};
use crate::context::RunContext;
use crate::error::{BenchError, Result};
use crate::report::{build_report, IntervalSample, MetricsSnapshot, Report};
use crate::worker::{self, RunShared, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Run life-cycle state. Transitions are monotonic and terminal states
/// are sticky.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed(_) | RunState::Cancelled
        )
    }
}

/// A workload family bound to a database handle. Families differ only
/// in the sessions they create; the life cycle is the controller's.
pub trait Benchmark: Send + Sync {
    /// Schema creation, data load, and statement preparation checks.
    fn prepare(&self, ctx: &RunContext) -> Result<()>;

    /// One session per worker, each with its own connection.
    fn sessions(&self, workers: usize) -> Result<Vec<Box<dyn Session>>>;

    /// Drop whatever `prepare` created. Never invoked implicitly.
    fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Point-in-time status for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub run_id: Uuid,
    pub name: String,
    pub family: Family,
    pub state: RunState,
    /// Percent complete in `[0, 100]`.
    pub progress: f64,
    pub elapsed_secs: f64,
    pub metrics: MetricsSnapshot,
}

const CAUSE_NONE: u8 = 0;
const CAUSE_DEADLINE: u8 = 1;
const CAUSE_STOP: u8 = 2;
const CAUSE_FATAL: u8 = 3;

const PROGRESS_TICK: Duration = Duration::from_millis(100);

pub struct Controller {
    run_id: Uuid,
    config: RunConfig,
    benchmark: Box<dyn Benchmark>,
    ctx: Arc<RunContext>,
    shared: Arc<RunShared>,

    state: Mutex<RunState>,
    state_cvar: Condvar,
    progress_bits: AtomicU64,
    cause: AtomicU8,
    failure: Mutex<Option<String>>,

    started_at: Mutex<Option<DateTime<Utc>>>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    measure_start: Mutex<Option<Instant>>,
    final_elapsed: Mutex<Option<Duration>>,
    intervals: Mutex<Vec<IntervalSample>>,
}

impl Controller {
    /// Validates the config and wires the run; no side effects beyond
    /// construction.
    pub fn new(config: RunConfig, benchmark: Box<dyn Benchmark>) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            run_id: Uuid::new_v4(),
            config,
            benchmark,
            ctx: RunContext::new(),
            shared: Arc::new(RunShared::new()),
            state: Mutex::new(RunState::Pending),
            state_cvar: Condvar::new(),
            progress_bits: AtomicU64::new(0f64.to_bits()),
            cause: AtomicU8::new(CAUSE_NONE),
            failure: Mutex::new(None),
            started_at: Mutex::new(None),
            ended_at: Mutex::new(None),
            measure_start: Mutex::new(None),
            final_elapsed: Mutex::new(None),
            intervals: Mutex::new(Vec::new()),
        }))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Starts the run on a supervising thread. A second call while the
    /// run is live (or after it finished) is rejected.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != RunState::Pending {
                return Err(BenchError::AlreadyRunning);
            }
            *state = RunState::Running;
        }
        self.state_cvar.notify_all();
        info!(
            run_id = %self.run_id,
            family = %self.config.family(),
            workers = self.config.worker_count(),
            duration_secs = self.config.duration_secs,
            "benchmark starting"
        );
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name("stampede-run".into())
            .spawn(move || controller.run())
            .map_err(|e| BenchError::Internal(format!("spawn run thread: {}", e)))?;
        Ok(())
    }

    /// Requests cancellation. Idempotent: calls after the first are
    /// no-ops.
    pub fn stop(&self) {
        if self
            .cause
            .compare_exchange(CAUSE_NONE, CAUSE_STOP, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(run_id = %self.run_id, "stop requested");
        }
        self.ctx.cancel();
        // A stop before start() short-circuits the pending controller.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == RunState::Pending {
            *state = RunState::Cancelled;
            drop(state);
            self.pin_progress();
            self.state_cvar.notify_all();
        }
    }

    pub fn state(&self) -> RunState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress_bits.load(Ordering::SeqCst))
    }

    /// Measured elapsed time (excludes warmup); frozen at terminal
    /// transition.
    pub fn elapsed(&self) -> Duration {
        if let Some(d) = *self
            .final_elapsed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return d;
        }
        self.measure_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn status(&self) -> StatusSnapshot {
        let elapsed = self.elapsed();
        StatusSnapshot {
            run_id: self.run_id,
            name: self.config.name.clone(),
            family: self.config.family(),
            state: self.state(),
            progress: self.progress(),
            elapsed_secs: elapsed.as_secs_f64(),
            metrics: MetricsSnapshot::collect(
                &self.shared.stats,
                &self.shared.sampler,
                elapsed,
                self.config.family(),
            ),
        }
    }

    pub fn report(&self) -> Report {
        build_report(
            self.run_id,
            &self.config,
            self.state(),
            *self
                .started_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            *self.ended_at.lock().unwrap_or_else(PoisonError::into_inner),
            self.elapsed(),
            &self.shared.stats,
            &self.shared.sampler,
            self.intervals
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            self.failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }

    /// Blocks until the run reaches a terminal state or the timeout
    /// elapses; returns the state either way.
    pub fn wait_for_terminal(&self, timeout: Duration) -> RunState {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .state_cvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        state.clone()
    }

    /// Blocks until terminal, then freezes the report.
    pub fn wait_for_report(&self) -> Report {
        loop {
            if self
                .wait_for_terminal(Duration::from_secs(3600))
                .is_terminal()
            {
                return self.report();
            }
        }
    }

    /// Drops whatever the workload's prepare step created.
    pub fn cleanup(&self) -> Result<()> {
        self.benchmark.cleanup()
    }

    fn run(self: Arc<Self>) {
        if let Err(err) = self.benchmark.prepare(&self.ctx) {
            error!(run_id = %self.run_id, error = %err, "prepare failed");
            self.record_failure(err);
            self.finalize();
            return;
        }
        if self.ctx.is_cancelled() {
            self.finalize();
            return;
        }

        let sessions = match self.benchmark.sessions(self.config.worker_count()) {
            Ok(sessions) => sessions,
            Err(err) => {
                error!(run_id = %self.run_id, error = %err, "session setup failed");
                self.record_failure(err);
                self.finalize();
                return;
            }
        };

        let started = Instant::now();
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        let warmup = self.config.warmup();
        if warmup.is_zero() {
            *self
                .measure_start
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(started);
        }
        self.ctx
            .set_deadline(started + warmup + self.config.duration());

        let fatal = {
            let this = &self;
            thread::scope(|scope| {
                scope.spawn(move || this.ticker_loop(started));
                worker::run_pool(sessions, &self.ctx, &self.shared)
            })
        };

        if let Some(err) = fatal {
            self.record_failure(err);
        }
        self.ctx.cancel();
        self.finalize();
    }

    /// 100ms housekeeping tick: warmup flip, progress, interval
    /// samples, deadline detection.
    fn ticker_loop(&self, started: Instant) {
        let warmup = self.config.warmup();
        let duration = self.config.duration();
        let interval = self.config.report_interval();
        let mut warmed_up = warmup.is_zero();
        let mut last_sample_at = Duration::ZERO;
        let mut prev_success = 0u64;

        while !self.ctx.is_cancelled() {
            self.ctx.sleep(PROGRESS_TICK);
            let since_start = started.elapsed();

            if !warmed_up && since_start >= warmup {
                warmed_up = true;
                self.shared.stats.reset();
                self.shared.sampler.reset();
                *self
                    .measure_start
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
                info!(run_id = %self.run_id, "warmup complete, measurement started");
            }

            if warmed_up {
                let measured = self.elapsed();
                let pct = (measured.as_secs_f64() / duration.as_secs_f64() * 100.0).min(100.0);
                self.bump_progress(pct);

                if measured - last_sample_at >= interval {
                    let snap = self
                        .shared
                        .stats
                        .snapshot(measured, self.config.family() == Family::Tpcc);
                    let latency = self.shared.sampler.snapshot();
                    let window = (measured - last_sample_at).as_secs_f64();
                    let interval_tps = if window > 0.0 {
                        (snap.successful_transactions - prev_success) as f64 / window
                    } else {
                        0.0
                    };
                    self.intervals
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(IntervalSample {
                            elapsed_secs: measured.as_secs_f64(),
                            total_transactions: snap.total_transactions,
                            successful_transactions: snap.successful_transactions,
                            failed_transactions: snap.failed_transactions,
                            interval_tps,
                            latency_p95_ms: latency.p95_ms,
                            latency_p99_ms: latency.p99_ms,
                        });
                    prev_success = snap.successful_transactions;
                    last_sample_at = measured;
                }
            }

            if let Some(deadline) = self.ctx.deadline() {
                if Instant::now() >= deadline {
                    let _ = self.cause.compare_exchange(
                        CAUSE_NONE,
                        CAUSE_DEADLINE,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    self.ctx.cancel();
                    break;
                }
            }
        }
    }

    /// Monotonic progress update.
    fn bump_progress(&self, pct: f64) {
        let _ = self
            .progress_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                let current = f64::from_bits(bits);
                if pct > current {
                    Some(pct.to_bits())
                } else {
                    None
                }
            });
    }

    fn pin_progress(&self) {
        self.progress_bits
            .store(100f64.to_bits(), Ordering::SeqCst);
    }

    fn record_failure(&self, err: BenchError) {
        let _ = self.cause.compare_exchange(
            CAUSE_NONE,
            CAUSE_FATAL,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(err.to_string());
        }
        self.ctx.cancel();
    }

    /// Commits the terminal state. The first observed cause wins; a
    /// failure after a stop still lands in stats but the state stays
    /// `Cancelled`.
    fn finalize(&self) {
        let elapsed = self.elapsed();
        {
            let mut final_elapsed = self
                .final_elapsed
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if final_elapsed.is_none() {
                *final_elapsed = Some(elapsed);
            }
        }
        let terminal = match self.cause.load(Ordering::SeqCst) {
            CAUSE_STOP => RunState::Cancelled,
            CAUSE_FATAL => {
                let reason = self
                    .failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
                    .unwrap_or_else(|| "unknown failure".into());
                RunState::Failed(reason)
            }
            _ => RunState::Completed,
        };
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_terminal() {
                return;
            }
            match terminal {
                RunState::Completed => {
                    info!(run_id = %self.run_id, elapsed_secs = elapsed.as_secs_f64(), "benchmark completed")
                }
                RunState::Cancelled => {
                    warn!(run_id = %self.run_id, elapsed_secs = elapsed.as_secs_f64(), "benchmark cancelled")
                }
                RunState::Failed(ref reason) => {
                    error!(run_id = %self.run_id, reason = %reason, "benchmark failed")
                }
                _ => {}
            }
            *state = terminal;
        }
        *self.ended_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        self.pin_progress();
        self.state_cvar.notify_all();
    }
}
