//! Shared test doubles for the integration suite

use stampede::db::{Connection, Database, DbError, Dialect};
use stampede::value::{Row, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How the mock behaves on every statement.
#[derive(Clone, Copy)]
pub enum MockBehavior {
    /// Succeed after the given per-call latency.
    Ok(Duration),
    /// Fail every call with a non-deadlock error after the latency.
    FailAll(Duration),
}

/// Passthrough mock database: counts calls, simulates latency, and
/// either succeeds or fails every statement.
pub struct MockDatabase {
    behavior: MockBehavior,
    pub calls: Arc<AtomicU64>,
}

impl MockDatabase {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Database for MockDatabase {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        Ok(Box::new(MockConnection {
            behavior: self.behavior,
            calls: Arc::clone(&self.calls),
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

pub struct MockConnection {
    behavior: MockBehavior,
    calls: Arc<AtomicU64>,
}

impl MockConnection {
    fn step(&self) -> Result<(), DbError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockBehavior::Ok(latency) => {
                std::thread::sleep(latency);
                Ok(())
            }
            MockBehavior::FailAll(latency) => {
                std::thread::sleep(latency);
                Err(DbError::Backend("mock failure".into()))
            }
        }
    }
}

impl Connection for MockConnection {
    fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<u64, DbError> {
        self.step().map(|_| 1)
    }

    fn query(&mut self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, DbError> {
        self.step().map(|_| vec![Row::new(vec![Value::Int(1)])])
    }

    fn prepare(&mut self, _sql: &str) -> Result<(), DbError> {
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        Ok(())
    }
}
