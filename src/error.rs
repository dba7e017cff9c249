//! Error taxonomy for benchmark runs

use crate::db::DbError;
use crate::distribution::TxClass;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    /// Validation failure before any side effect; never transitions state.
    #[error("invalid config: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The supplied database handle cannot be acquired or pinged.
    #[error("connection unavailable")]
    ConnectionUnavailable(#[source] DbError),

    /// Statement preparation failed; the run transitions to `Failed`.
    #[error("prepare failed: {stmt}")]
    PrepareFailed {
        stmt: String,
        #[source]
        source: DbError,
    },

    /// A transaction ultimately failed after retries; counted, non-fatal.
    #[error("{class} transaction failed")]
    TransactionFailed {
        class: TxClass,
        #[source]
        source: DbError,
    },

    /// A second start while a run is active.
    #[error("a benchmark is already running")]
    AlreadyRunning,

    /// Status or stop with no run to act on.
    #[error("no active benchmark")]
    NoActiveBenchmark,

    /// Benign terminator; never counted as a failure.
    #[error("run cancelled")]
    Cancelled,

    #[error("internal: {0}")]
    Internal(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl BenchError {
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        BenchError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Stable tag retained in reports after a `Failed` terminal state.
    pub fn kind(&self) -> &'static str {
        match self {
            BenchError::InvalidConfig { .. } => "invalid_config",
            BenchError::ConnectionUnavailable(_) => "connection_unavailable",
            BenchError::PrepareFailed { .. } => "prepare_failed",
            BenchError::TransactionFailed { .. } => "transaction_failed",
            BenchError::AlreadyRunning => "already_running",
            BenchError::NoActiveBenchmark => "no_active_benchmark",
            BenchError::Cancelled => "cancelled",
            BenchError::Internal(_) => "internal",
            BenchError::Db(_) => "db",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BenchError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
