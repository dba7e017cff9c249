//! Database abstraction shared by all workload families
//!
//! The engine never pools connections itself: a [`Database`] hands out one
//! [`Connection`] per worker, and pool capacity is the connection
//! registry's concern.

pub mod postgres;
pub mod sqlite;

use crate::error::BenchError;
use crate::value::{Row, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres: {0}")]
    Postgres(#[from] ::postgres::Error),

    #[error("decode: {0}")]
    Decode(String),

    /// Backend-agnostic error text; used by test doubles.
    #[error("{0}")]
    Backend(String),
}

/// SQL dialect quirks the schema builders care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Column definition for an auto-incrementing integer primary key.
    pub fn auto_increment_pk(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
        }
    }
}

/// Classifies an error as deadlock-class, i.e. retryable inside a
/// transaction invocation.
pub type DeadlockPredicate = Arc<dyn Fn(&DbError) -> bool + Send + Sync>;

/// Matches the lock-conflict vocabulary of the supported backends:
/// MySQL 1213 / PostgreSQL 40P01 report "deadlock", SQLite reports
/// "database is locked" / "database table is locked" on busy handles.
pub fn default_deadlock_predicate() -> DeadlockPredicate {
    Arc::new(|err: &DbError| {
        let text = err.to_string().to_ascii_lowercase();
        text.contains("deadlock") || text.contains("is locked")
    })
}

/// A factory of connections to one logical database. Shared by every
/// worker of a run.
pub trait Database: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError>;

    fn dialect(&self) -> Dialect;

    /// Cheap liveness check used at prepare time.
    fn ping(&self) -> Result<(), DbError> {
        self.connect().map(|_| ())
    }
}

/// One session against the database, owned by a single worker.
pub trait Connection: Send {
    /// Execute a statement, returning the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Run a query and decode every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Compile a statement without running it; surfaces syntax errors at
    /// prepare time.
    fn prepare(&mut self, sql: &str) -> Result<(), DbError>;

    fn begin(&mut self) -> Result<(), DbError>;
    fn commit(&mut self) -> Result<(), DbError>;
    fn rollback(&mut self) -> Result<(), DbError>;

    fn query_row(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>, DbError> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

/// Builds a database handle from a DSN:
/// `sqlite::memory:`, `sqlite:<path>`, or `postgres://...`.
pub fn from_dsn(dsn: &str) -> Result<Arc<dyn Database>, BenchError> {
    if dsn == "sqlite::memory:" {
        let name = format!("stampede-{}", uuid::Uuid::new_v4());
        return Ok(Arc::new(sqlite::SqliteDatabase::in_memory(&name)));
    }
    if let Some(path) = dsn.strip_prefix("sqlite:") {
        return Ok(Arc::new(sqlite::SqliteDatabase::open(path)));
    }
    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        return Ok(Arc::new(postgres::PostgresDatabase::new(dsn)));
    }
    Err(BenchError::invalid_config(
        "connection",
        format!("unsupported DSN: {}", dsn),
    ))
}
