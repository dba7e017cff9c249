//! Adhoc workload family
//!
//! Executes a query template (or a weighted query list) in a tight loop
//! across N workers. In single-query mode any execution error is fatal
//! and cancels the run; in multi-query mode errors are counted and the
//! workers keep going.

use crate::config::AdhocConfig;
use crate::context::RunContext;
use crate::controller::Benchmark;
use crate::db::{Connection, Database};
use crate::distribution::{QuerySelector, TxClass};
use crate::error::{BenchError, Result};
use crate::worker::{RunShared, Session, StepError};
use std::sync::Arc;
use tracing::info;

pub struct AdhocBenchmark {
    db: Arc<dyn Database>,
    config: AdhocConfig,
    selector: Option<Arc<QuerySelector>>,
}

impl AdhocBenchmark {
    pub fn new(db: Arc<dyn Database>, config: AdhocConfig) -> Self {
        Self {
            db,
            config,
            selector: None,
        }
    }

    fn build_selector(&self) -> Result<Option<Arc<QuerySelector>>> {
        if self.config.is_single_query() {
            return Ok(None);
        }
        let selector = QuerySelector::new(
            self.config.queries.clone(),
            &self.config.weights,
            self.config.query_distribution,
        )?;
        Ok(Some(Arc::new(selector)))
    }
}

impl Benchmark for AdhocBenchmark {
    fn prepare(&self, _ctx: &RunContext) -> Result<()> {
        self.db.ping().map_err(BenchError::ConnectionUnavailable)?;

        // Surface statement errors at prepare time rather than in the
        // hot loop.
        let mut conn = self
            .db
            .connect()
            .map_err(BenchError::ConnectionUnavailable)?;
        let mut check = |sql: &str| -> Result<()> {
            conn.prepare(sql).map_err(|e| BenchError::PrepareFailed {
                stmt: sql.to_string(),
                source: e,
            })
        };
        if self.config.is_single_query() {
            check(&self.config.query_template)?;
        } else {
            for sql in &self.config.queries {
                check(sql)?;
            }
        }
        info!(queries = self.config.queries.len().max(1), "adhoc workload prepared");
        Ok(())
    }

    fn sessions(&self, workers: usize) -> Result<Vec<Box<dyn Session>>> {
        let selector = self.build_selector()?;
        let mut sessions: Vec<Box<dyn Session>> = Vec::with_capacity(workers);
        for _ in 0..workers {
            let conn = self
                .db
                .connect()
                .map_err(BenchError::ConnectionUnavailable)?;
            sessions.push(Box::new(AdhocSession {
                conn,
                query: self.config.query_template.clone(),
                selector: selector.clone(),
            }));
        }
        Ok(sessions)
    }
}

struct AdhocSession {
    conn: Box<dyn Connection>,
    query: String,
    /// `None` in single-query (fail-fast) mode.
    selector: Option<Arc<QuerySelector>>,
}

impl Session for AdhocSession {
    fn execute(&mut self, _ctx: &RunContext, _shared: &RunShared) -> std::result::Result<TxClass, StepError> {
        match &self.selector {
            None => match self.conn.query(&self.query, &[]) {
                Ok(_) => Ok(TxClass::Adhoc),
                Err(source) => Err(StepError::Fatal {
                    class: TxClass::Adhoc,
                    source: BenchError::TransactionFailed {
                        class: TxClass::Adhoc,
                        source,
                    },
                }),
            },
            Some(selector) => {
                let sql = selector.select().to_string();
                match self.conn.query(&sql, &[]) {
                    Ok(_) => Ok(TxClass::Adhoc),
                    Err(source) => Err(StepError::Tx {
                        class: TxClass::Adhoc,
                        source,
                    }),
                }
            }
        }
    }
}
