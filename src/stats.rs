//! Thread-safe run statistics
//!
//! Counters for transactions, per-class outcomes, and lock conflicts.
//! Mutators take a short exclusive section; `snapshot` builds a
//! consistent view and derives TPS/TPMC/efficiency from it.

use crate::distribution::TxClass;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounters {
    pub count: u64,
    pub errors: u64,
}

#[derive(Default)]
struct StatsInner {
    total: u64,
    successful: u64,
    failed: u64,
    deadlocks: u64,
    retries: u64,
    per_class: BTreeMap<TxClass, ClassCounters>,
}

pub struct StatsAggregator {
    inner: Mutex<StatsInner>,
}

/// Consistent view of the counters plus the derived figures.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    pub deadlock_count: u64,
    pub retry_count: u64,
    pub per_class: BTreeMap<TxClass, ClassCounters>,
    /// Successful transactions per wall-clock second.
    pub tps: f64,
    /// New-Order transactions per minute; `None` outside TPC-C.
    pub tpmc: Option<f64>,
    /// `(total - errors) / total * 100`, or 0 when total is 0.
    pub efficiency: f64,
    pub success_rate: f64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner::default()),
        }
    }

    pub fn record_success(&self, class: TxClass) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.total += 1;
        inner.successful += 1;
        inner.per_class.entry(class).or_default().count += 1;
    }

    pub fn record_failure(&self, class: TxClass) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.total += 1;
        inner.failed += 1;
        inner.per_class.entry(class).or_default().errors += 1;
    }

    /// One deadlock-class conflict observed; every retry is preceded by
    /// exactly one of these.
    pub fn record_deadlock_retry(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.deadlocks += 1;
        inner.retries += 1;
    }

    pub fn snapshot(&self, elapsed: Duration, tpcc: bool) -> StatsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let secs = elapsed.as_secs_f64();
        let tps = if secs > 0.0 {
            inner.successful as f64 / secs
        } else {
            0.0
        };
        let tpmc = if tpcc {
            let new_orders = inner
                .per_class
                .get(&TxClass::NewOrder)
                .map_or(0, |c| c.count);
            Some(if secs > 0.0 {
                new_orders as f64 / (secs / 60.0)
            } else {
                0.0
            })
        } else {
            None
        };
        let efficiency = if inner.total > 0 {
            (inner.total - inner.failed) as f64 / inner.total as f64 * 100.0
        } else {
            0.0
        };
        let success_rate = if inner.total > 0 {
            inner.successful as f64 / inner.total as f64 * 100.0
        } else {
            0.0
        };
        StatsSnapshot {
            total_transactions: inner.total,
            successful_transactions: inner.successful,
            failed_transactions: inner.failed,
            deadlock_count: inner.deadlocks,
            retry_count: inner.retries,
            per_class: inner.per_class.clone(),
            tps,
            tpmc,
            efficiency,
            success_rate,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *inner = StatsInner::default();
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
