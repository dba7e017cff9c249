//! sysbench-style OLTP workload family
//!
//! Parametric micro-workloads against the synthetic `sbtestN` schema.

pub mod executor;
pub mod loader;

use crate::config::OltpConfig;
use crate::context::RunContext;
use crate::controller::Benchmark;
use crate::db::{Connection, Database};
use crate::distribution::TxClass;
use crate::error::{BenchError, Result};
use crate::executor::TxOptions;
use crate::worker::{RunShared, Session, StepError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Table name for a 1-based sbtest index.
pub fn sbtest_table(n: i64) -> String {
    format!("sbtest{}", n)
}

pub struct OltpBenchmark {
    db: Arc<dyn Database>,
    config: OltpConfig,
}

impl OltpBenchmark {
    pub fn new(db: Arc<dyn Database>, config: OltpConfig) -> Self {
        Self { db, config }
    }
}

impl Benchmark for OltpBenchmark {
    fn prepare(&self, ctx: &RunContext) -> Result<()> {
        self.db.ping().map_err(BenchError::ConnectionUnavailable)?;
        let mut conn = self
            .db
            .connect()
            .map_err(BenchError::ConnectionUnavailable)?;

        loader::create_schema(conn.as_mut(), &self.config, self.db.dialect())?;
        loader::load_tables(conn.as_mut(), &self.config, ctx)?;
        if ctx.is_cancelled() {
            return Ok(());
        }

        let probe = format!("SELECT c FROM {} WHERE id = ?", sbtest_table(1));
        conn.prepare(&probe).map_err(|e| BenchError::PrepareFailed {
            stmt: probe.clone(),
            source: e,
        })?;
        info!(
            tables = self.config.num_tables,
            table_size = self.config.table_size,
            test_type = %self.config.test_type,
            "oltp workload prepared"
        );
        Ok(())
    }

    fn sessions(&self, workers: usize) -> Result<Vec<Box<dyn Session>>> {
        // trx_rate is a global target; each worker paces itself at its
        // share of the budget.
        let pace = if self.config.trx_rate > 0.0 {
            Some(Duration::from_secs_f64(
                workers as f64 / self.config.trx_rate,
            ))
        } else {
            None
        };
        let mut sessions: Vec<Box<dyn Session>> = Vec::with_capacity(workers);
        for _ in 0..workers {
            let conn = self
                .db
                .connect()
                .map_err(BenchError::ConnectionUnavailable)?;
            sessions.push(Box::new(OltpSession {
                conn,
                config: self.config.clone(),
                opts: TxOptions {
                    skip_trx: self.config.skip_trx,
                    ..TxOptions::new()
                },
                pace,
                rng: StdRng::from_entropy(),
            }));
        }
        Ok(sessions)
    }

    fn cleanup(&self) -> Result<()> {
        let mut conn = self
            .db
            .connect()
            .map_err(BenchError::ConnectionUnavailable)?;
        loader::drop_schema(conn.as_mut(), &self.config)?;
        Ok(())
    }
}

struct OltpSession {
    conn: Box<dyn Connection>,
    config: OltpConfig,
    opts: TxOptions,
    pace: Option<Duration>,
    rng: StdRng,
}

impl Session for OltpSession {
    fn pace(&mut self, ctx: &RunContext) -> bool {
        match self.pace {
            Some(interval) => ctx.sleep(interval),
            None => true,
        }
    }

    fn execute(&mut self, ctx: &RunContext, shared: &RunShared) -> std::result::Result<TxClass, StepError> {
        executor::run_transaction(
            self.conn.as_mut(),
            &self.config,
            &self.opts,
            ctx,
            &shared.stats,
            &mut self.rng,
        )
        .map(|_| TxClass::Oltp)
        .map_err(|source| StepError::Tx {
            class: TxClass::Oltp,
            source,
        })
    }
}
