//! Transaction execution harness
//!
//! Wraps one logical transaction body in BEGIN/COMMIT with rollback on
//! every failure path, and restarts the body from the top on
//! deadlock-class errors, up to the retry budget.

use crate::context::RunContext;
use crate::db::{default_deadlock_predicate, Connection, DbError, DeadlockPredicate};
use crate::stats::StatsAggregator;
use tracing::debug;

/// Deadlock retries per transaction invocation; the attempt count is
/// therefore bounded by `MAX_DEADLOCK_RETRIES + 1`.
pub const MAX_DEADLOCK_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct TxOptions {
    /// Run statements without an explicit transaction wrapper.
    pub skip_trx: bool,
    pub is_deadlock: DeadlockPredicate,
}

impl TxOptions {
    pub fn new() -> Self {
        Self {
            skip_trx: false,
            is_deadlock: default_deadlock_predicate(),
        }
    }

    pub fn without_trx() -> Self {
        Self {
            skip_trx: true,
            is_deadlock: default_deadlock_predicate(),
        }
    }
}

impl Default for TxOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `body` inside a transaction. On a deadlock-class error the
/// transaction is rolled back and the body restarted from the top; after
/// `MAX_DEADLOCK_RETRIES` consecutive deadlocks the error surfaces.
pub fn run_in_transaction<T>(
    conn: &mut dyn Connection,
    opts: &TxOptions,
    ctx: &RunContext,
    stats: &StatsAggregator,
    mut body: impl FnMut(&mut dyn Connection) -> Result<T, DbError>,
) -> Result<T, DbError> {
    let mut attempt = 0u32;
    loop {
        if !opts.skip_trx {
            conn.begin()?;
        }
        let result = body(conn).and_then(|out| {
            if !opts.skip_trx {
                conn.commit()?;
            }
            Ok(out)
        });
        match result {
            Ok(out) => return Ok(out),
            Err(err) => {
                if !opts.skip_trx {
                    // The transaction may already be gone (e.g. an
                    // aborted commit); a failed rollback is not
                    // actionable here.
                    let _ = conn.rollback();
                }
                if (opts.is_deadlock)(&err)
                    && attempt < MAX_DEADLOCK_RETRIES
                    && !ctx.is_cancelled()
                {
                    attempt += 1;
                    stats.record_deadlock_retry();
                    debug!(attempt, error = %err, "deadlock, restarting transaction");
                    continue;
                }
                return Err(err);
            }
        }
    }
}
