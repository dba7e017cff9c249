//! TPC-C workload family
//!
//! Five-transaction OLTP benchmark: schema creation, bulk data load,
//! and terminal-driven mixed execution.

pub mod executor;
pub mod loader;
pub mod schema;
pub mod terminal;

use crate::config::TpccConfig;
use crate::context::RunContext;
use crate::controller::Benchmark;
use crate::db::Database;
use crate::distribution::{tpcc_distribution, Distribution};
use crate::error::{BenchError, Result};
use crate::worker::Session;
use std::sync::Arc;
use terminal::Terminal;
use tracing::info;

pub struct TpccBenchmark {
    db: Arc<dyn Database>,
    config: TpccConfig,
}

impl TpccBenchmark {
    pub fn new(db: Arc<dyn Database>, config: TpccConfig) -> Self {
        Self { db, config }
    }

    fn mix(&self) -> Result<Distribution> {
        tpcc_distribution(
            self.config.new_order_pct,
            self.config.payment_pct,
            self.config.order_status_pct,
            self.config.delivery_pct,
            self.config.stock_level_pct,
        )
    }
}

impl Benchmark for TpccBenchmark {
    fn prepare(&self, ctx: &RunContext) -> Result<()> {
        self.db.ping().map_err(BenchError::ConnectionUnavailable)?;
        if !self.config.load_data {
            info!("tpcc schema load skipped, using existing tables");
            return Ok(());
        }
        let mut conn = self
            .db
            .connect()
            .map_err(BenchError::ConnectionUnavailable)?;
        schema::drop_all(conn.as_mut())?;
        schema::create_all(conn.as_mut())?;
        drop(conn);
        loader::load(&self.db, &self.config, ctx)?;
        Ok(())
    }

    fn sessions(&self, workers: usize) -> Result<Vec<Box<dyn Session>>> {
        let mix = Arc::new(self.mix()?);
        let mut sessions: Vec<Box<dyn Session>> = Vec::with_capacity(workers);
        for id in 0..workers {
            let conn = self
                .db
                .connect()
                .map_err(BenchError::ConnectionUnavailable)?;
            sessions.push(Box::new(Terminal::new(
                id,
                self.config.clone(),
                conn,
                Arc::clone(&mix),
            )));
        }
        info!(terminals = workers, warehouses = self.config.warehouses, "tpcc terminals ready");
        Ok(sessions)
    }

    fn cleanup(&self) -> Result<()> {
        let mut conn = self
            .db
            .connect()
            .map_err(BenchError::ConnectionUnavailable)?;
        schema::drop_all(conn.as_mut())
    }
}
