//! Worker pool
//!
//! N parallel virtual clients, each owning one database session. A
//! worker loops until the run context cancels: pace, execute one
//! transaction, record the outcome. Fatal errors cancel every peer.

use crate::context::RunContext;
use crate::db::DbError;
use crate::distribution::TxClass;
use crate::error::BenchError;
use crate::sampler::LatencySampler;
use crate::stats::StatsAggregator;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Aggregators shared by every worker of a run.
pub struct RunShared {
    pub stats: StatsAggregator,
    pub sampler: LatencySampler,
}

impl RunShared {
    pub fn new() -> Self {
        Self {
            stats: StatsAggregator::new(),
            sampler: LatencySampler::new(),
        }
    }
}

impl Default for RunShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one transaction attempt at the worker boundary.
pub enum StepError {
    /// Counted in stats; the worker keeps going.
    Tx { class: TxClass, source: DbError },
    /// Counted, then cancels the whole run (single-query adhoc
    /// fail-fast, broken session).
    Fatal { class: TxClass, source: BenchError },
}

/// One virtual client. Created per worker by the benchmark family;
/// holds its own connection and parameters.
pub trait Session: Send {
    /// Pre-transaction pacing (keying/think time, rate limiting).
    /// Returns `false` when interrupted by cancellation.
    fn pace(&mut self, _ctx: &RunContext) -> bool {
        true
    }

    /// Execute one logical transaction, returning its class on commit.
    fn execute(&mut self, ctx: &RunContext, shared: &RunShared) -> Result<TxClass, StepError>;
}

enum WorkerExit {
    Cancelled,
    Fatal(BenchError),
}

fn worker_loop(
    worker_id: usize,
    mut session: Box<dyn Session>,
    ctx: &RunContext,
    shared: &RunShared,
) -> WorkerExit {
    debug!(worker_id, "worker started");
    while !ctx.is_cancelled() {
        if !session.pace(ctx) {
            break;
        }
        if ctx.is_cancelled() {
            break;
        }
        let started = Instant::now();
        match session.execute(ctx, shared) {
            Ok(class) => {
                shared.sampler.record(started.elapsed());
                shared.stats.record_success(class);
            }
            Err(StepError::Tx { class, source }) => {
                shared.stats.record_failure(class);
                debug!(worker_id, class = %class, error = %source, "transaction failed");
            }
            Err(StepError::Fatal { class, source }) => {
                shared.stats.record_failure(class);
                error!(worker_id, error = %source, "fatal worker error, cancelling run");
                ctx.cancel();
                return WorkerExit::Fatal(source);
            }
        }
    }
    debug!(worker_id, "worker exiting");
    WorkerExit::Cancelled
}

/// Runs every session on its own thread and joins them all. Returns the
/// first fatal error, if any worker raised one.
pub fn run_pool(
    sessions: Vec<Box<dyn Session>>,
    ctx: &RunContext,
    shared: &RunShared,
) -> Option<BenchError> {
    let mut fatal = None;
    thread::scope(|scope| {
        let handles: Vec<_> = sessions
            .into_iter()
            .enumerate()
            .map(|(worker_id, session)| {
                scope.spawn(move || worker_loop(worker_id, session, ctx, shared))
            })
            .collect();
        for handle in handles {
            match handle.join() {
                Ok(WorkerExit::Cancelled) => {}
                Ok(WorkerExit::Fatal(err)) => {
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                }
                Err(_) => {
                    warn!("worker panicked");
                    ctx.cancel();
                    if fatal.is_none() {
                        fatal = Some(BenchError::Internal("worker panicked".into()));
                    }
                }
            }
        }
    });
    fatal
}
