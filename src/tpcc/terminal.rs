//! TPC-C terminal
//!
//! One virtual terminal per worker, identified by an integer id and
//! bound to a home warehouse and district. The terminal draws the next
//! transaction class from the shared mix, optionally applies the
//! keying/think pacing, and runs the body through the retry harness.

use super::executor::{
    execute_delivery, execute_new_order, execute_order_status, execute_payment,
    execute_stock_level, NewOrderParams, PaymentParams,
};
use super::loader::CUSTOMERS_PER_DISTRICT;
use crate::config::TpccConfig;
use crate::context::RunContext;
use crate::db::Connection;
use crate::distribution::{keying_time, think_time, Distribution, TxClass};
use crate::executor::{run_in_transaction, TxOptions};
use crate::worker::{RunShared, Session, StepError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Stock-Level threshold, drawn fresh per transaction, uniform in
/// [10, 20].
pub fn stock_level_threshold(rng: &mut impl Rng) -> i64 {
    rng.gen_range(10..=20)
}

pub struct Terminal {
    pub id: usize,
    pub home_w_id: i64,
    pub home_d_id: i64,
    config: TpccConfig,
    conn: Box<dyn Connection>,
    mix: Arc<Distribution>,
    opts: TxOptions,
    rng: StdRng,
    pending: Option<TxClass>,
}

impl Terminal {
    pub fn new(
        id: usize,
        config: TpccConfig,
        conn: Box<dyn Connection>,
        mix: Arc<Distribution>,
    ) -> Self {
        let home_w_id = (id as i64 % config.warehouses) + 1;
        let home_d_id = (id as i64 % 10) + 1;
        Self {
            id,
            home_w_id,
            home_d_id,
            config,
            conn,
            mix,
            opts: TxOptions::new(),
            rng: StdRng::from_entropy(),
            pending: None,
        }
    }

    fn run_class(
        &mut self,
        class: TxClass,
        ctx: &RunContext,
        shared: &RunShared,
    ) -> Result<(), crate::db::DbError> {
        let conn = self.conn.as_mut();
        match class {
            TxClass::NewOrder => {
                let params = NewOrderParams::generate(
                    &self.config,
                    self.home_w_id,
                    self.home_d_id,
                    &mut self.rng,
                );
                run_in_transaction(conn, &self.opts, ctx, &shared.stats, |conn| {
                    execute_new_order(conn, &params)
                })
                .map(|_| ())
            }
            TxClass::Payment => {
                let params =
                    PaymentParams::generate(self.home_w_id, self.home_d_id, &mut self.rng);
                run_in_transaction(conn, &self.opts, ctx, &shared.stats, |conn| {
                    execute_payment(conn, &params)
                })
            }
            TxClass::OrderStatus => {
                let c_id = self.rng.gen_range(1..=CUSTOMERS_PER_DISTRICT);
                let (w_id, d_id) = (self.home_w_id, self.home_d_id);
                run_in_transaction(conn, &self.opts, ctx, &shared.stats, |conn| {
                    execute_order_status(conn, w_id, d_id, c_id)
                })
            }
            TxClass::Delivery => {
                let carrier_id = self.rng.gen_range(1..=10i64);
                let w_id = self.home_w_id;
                run_in_transaction(conn, &self.opts, ctx, &shared.stats, |conn| {
                    execute_delivery(conn, w_id, carrier_id)
                })
                .map(|_| ())
            }
            TxClass::StockLevel => {
                let threshold = stock_level_threshold(&mut self.rng);
                let (w_id, d_id) = (self.home_w_id, self.home_d_id);
                run_in_transaction(conn, &self.opts, ctx, &shared.stats, |conn| {
                    execute_stock_level(conn, w_id, d_id, threshold)
                })
                .map(|_| ())
            }
            // The mix only hands out the five TPC-C classes.
            other => unreachable!("tpcc mix produced {}", other),
        }
    }
}

impl Session for Terminal {
    fn pace(&mut self, ctx: &RunContext) -> bool {
        let class = self.mix.select();
        self.pending = Some(class);
        if !self.config.keying_and_think {
            return true;
        }
        let pause = keying_time(class) + think_time(class, &mut self.rng);
        ctx.sleep(pause)
    }

    fn execute(
        &mut self,
        ctx: &RunContext,
        shared: &RunShared,
    ) -> Result<TxClass, StepError> {
        let class = match self.pending.take() {
            Some(class) => class,
            None => self.mix.select(),
        };
        self.run_class(class, ctx, shared)
            .map(|_| class)
            .map_err(|source| StepError::Tx { class, source })
    }
}
