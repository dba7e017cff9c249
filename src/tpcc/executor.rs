//! The five TPC-C transaction bodies
//!
//! Each function executes one logical transaction against an open
//! connection. Transaction wrapping and deadlock retries belong to the
//! caller (the terminal runs these through the shared harness).

use super::loader::{CUSTOMERS_PER_DISTRICT, DISTRICTS_PER_WAREHOUSE, ITEMS};
use crate::bind;
use crate::config::TpccConfig;
use crate::db::{Connection, DbError};
use crate::value::Value;
use chrono::Utc;
use rand::Rng;

fn now() -> chrono::NaiveDateTime {
    Utc::now().naive_utc()
}

fn missing(what: &str) -> DbError {
    DbError::Backend(format!("{} not found", what))
}

#[derive(Debug, Clone, Copy)]
pub struct NewOrderLine {
    pub i_id: i64,
    pub supply_w_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrderParams {
    pub w_id: i64,
    pub d_id: i64,
    pub c_id: i64,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrderParams {
    /// Draws parameters for a terminal's home warehouse/district: item
    /// count uniform in the configured range, 1% remote supply when
    /// more than one warehouse exists.
    pub fn generate(cfg: &TpccConfig, w_id: i64, d_id: i64, rng: &mut impl Rng) -> Self {
        let count = rng.gen_range(cfg.new_order_items_min..=cfg.new_order_items_max);
        let lines = (0..count)
            .map(|_| {
                let supply_w_id = if cfg.warehouses > 1 && rng.gen_range(0..100) == 0 {
                    // Random *other* warehouse.
                    let mut other = rng.gen_range(1..=cfg.warehouses - 1);
                    if other >= w_id {
                        other += 1;
                    }
                    other
                } else {
                    w_id
                };
                NewOrderLine {
                    i_id: rng.gen_range(1..=ITEMS),
                    supply_w_id,
                    quantity: rng.gen_range(1..=10),
                }
            })
            .collect();
        Self {
            w_id,
            d_id,
            c_id: rng.gen_range(1..=CUSTOMERS_PER_DISTRICT),
            lines,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewOrderOutput {
    pub order_id: i64,
    /// `sum(amount) * (1 + w_tax + d_tax) * (1 - c_discount)`; reported,
    /// not persisted.
    pub total_amount: f64,
}

pub fn execute_new_order(
    conn: &mut dyn Connection,
    params: &NewOrderParams,
) -> Result<NewOrderOutput, DbError> {
    let (w_id, d_id) = (params.w_id, params.d_id);

    let w_tax = conn
        .query_row("SELECT w_tax FROM warehouse WHERE w_id = ?", bind!(w_id))?
        .ok_or_else(|| missing("warehouse"))?
        .get_f64(0)?;

    let district = conn
        .query_row(
            "SELECT d_tax, d_next_o_id FROM district WHERE d_w_id = ? AND d_id = ?",
            bind!(w_id, d_id),
        )?
        .ok_or_else(|| missing("district"))?;
    let d_tax = district.get_f64(0)?;
    let o_id = district.get_i64(1)?;

    conn.execute(
        "UPDATE district SET d_next_o_id = d_next_o_id + 1 WHERE d_w_id = ? AND d_id = ?",
        bind!(w_id, d_id),
    )?;

    let customer = conn
        .query_row(
            "SELECT c_discount, c_last, c_credit FROM customer \
             WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?",
            bind!(w_id, d_id, params.c_id),
        )?
        .ok_or_else(|| missing("customer"))?;
    let c_discount = customer.get_f64(0)?;

    let all_local = params.lines.iter().all(|l| l.supply_w_id == w_id) as i64;
    conn.execute(
        "INSERT INTO orders (o_id, o_d_id, o_w_id, o_c_id, o_entry_d, o_carrier_id, \
         o_ol_cnt, o_all_local) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            Value::Int(o_id),
            Value::Int(d_id),
            Value::Int(w_id),
            Value::Int(params.c_id),
            Value::Timestamp(now()),
            Value::Null,
            Value::Int(params.lines.len() as i64),
            Value::Int(all_local),
        ],
    )?;
    conn.execute(
        "INSERT INTO new_order (no_o_id, no_d_id, no_w_id) VALUES (?, ?, ?)",
        bind!(o_id, d_id, w_id),
    )?;

    let dist_col = format!("s_dist_{:02}", d_id);
    let mut sum_amount = 0.0;
    for (index, line) in params.lines.iter().enumerate() {
        let item = conn
            .query_row(
                "SELECT i_price, i_name FROM item WHERE i_id = ?",
                bind!(line.i_id),
            )?
            .ok_or_else(|| missing("item"))?;
        let i_price = item.get_f64(0)?;

        let stock = conn
            .query_row(
                &format!(
                    "SELECT s_quantity, {}, s_ytd, s_order_cnt, s_remote_cnt \
                     FROM stock WHERE s_w_id = ? AND s_i_id = ?",
                    dist_col
                ),
                bind!(line.supply_w_id, line.i_id),
            )?
            .ok_or_else(|| missing("stock"))?;
        let s_quantity = stock.get_i64(0)?;
        let dist_info = stock.get_str(1)?.to_string();
        let s_remote_cnt = stock.get_i64(4)?;

        // Wrap-around rule keeps quantity in [10, 100].
        let mut new_quantity = s_quantity - line.quantity;
        if new_quantity < 10 {
            new_quantity += 91;
        }
        let remote = (line.supply_w_id != w_id) as i64;

        conn.execute(
            "UPDATE stock SET s_quantity = ?, s_ytd = s_ytd + ?, \
             s_order_cnt = s_order_cnt + 1, s_remote_cnt = ? \
             WHERE s_w_id = ? AND s_i_id = ?",
            bind!(
                new_quantity,
                line.quantity,
                s_remote_cnt + remote,
                line.supply_w_id,
                line.i_id
            ),
        )?;

        let amount = line.quantity as f64 * i_price;
        sum_amount += amount;
        conn.execute(
            "INSERT INTO order_line (ol_o_id, ol_d_id, ol_w_id, ol_number, ol_i_id, \
             ol_supply_w_id, ol_delivery_d, ol_quantity, ol_amount, ol_dist_info) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            &[
                Value::Int(o_id),
                Value::Int(d_id),
                Value::Int(w_id),
                Value::Int(index as i64 + 1),
                Value::Int(line.i_id),
                Value::Int(line.supply_w_id),
                Value::Null,
                Value::Int(line.quantity),
                Value::Float(amount),
                Value::Text(dist_info),
            ],
        )?;
    }

    Ok(NewOrderOutput {
        order_id: o_id,
        total_amount: sum_amount * (1.0 + w_tax + d_tax) * (1.0 - c_discount),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct PaymentParams {
    pub w_id: i64,
    pub d_id: i64,
    pub c_id: i64,
    pub amount: f64,
}

impl PaymentParams {
    /// Amount drawn in whole cents from [1.00, 5000.00].
    pub fn generate(w_id: i64, d_id: i64, rng: &mut impl Rng) -> Self {
        Self {
            w_id,
            d_id,
            c_id: rng.gen_range(1..=CUSTOMERS_PER_DISTRICT),
            amount: rng.gen_range(100..=500_000i64) as f64 / 100.0,
        }
    }
}

pub fn execute_payment(conn: &mut dyn Connection, params: &PaymentParams) -> Result<(), DbError> {
    conn.execute(
        "UPDATE warehouse SET w_ytd = w_ytd + ? WHERE w_id = ?",
        bind!(params.amount, params.w_id),
    )?;
    conn.execute(
        "UPDATE district SET d_ytd = d_ytd + ? WHERE d_w_id = ? AND d_id = ?",
        bind!(params.amount, params.w_id, params.d_id),
    )?;
    conn.execute(
        "UPDATE customer SET c_balance = c_balance - ?, c_ytd_payment = c_ytd_payment + ?, \
         c_payment_cnt = c_payment_cnt + 1 WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?",
        bind!(
            params.amount,
            params.amount,
            params.w_id,
            params.d_id,
            params.c_id
        ),
    )?;
    conn.execute(
        "INSERT INTO history (h_c_id, h_c_d_id, h_c_w_id, h_d_id, h_w_id, h_date, h_amount, \
         h_data) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            Value::Int(params.c_id),
            Value::Int(params.d_id),
            Value::Int(params.w_id),
            Value::Int(params.d_id),
            Value::Int(params.w_id),
            Value::Timestamp(now()),
            Value::Float(params.amount),
            Value::Text(format!("W{}D{}", params.w_id, params.d_id)),
        ],
    )?;
    Ok(())
}

/// Read-only: the customer's most recent order and its lines.
pub fn execute_order_status(
    conn: &mut dyn Connection,
    w_id: i64,
    d_id: i64,
    c_id: i64,
) -> Result<(), DbError> {
    let latest = conn.query_row(
        "SELECT o_id, o_carrier_id FROM orders \
         WHERE o_w_id = ? AND o_d_id = ? AND o_c_id = ? ORDER BY o_id DESC LIMIT 1",
        bind!(w_id, d_id, c_id),
    )?;
    if let Some(order) = latest {
        let o_id = order.get_i64(0)?;
        conn.query(
            "SELECT ol_i_id, ol_supply_w_id, ol_quantity, ol_amount, ol_delivery_d \
             FROM order_line WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id = ?",
            bind!(w_id, d_id, o_id),
        )?;
    }
    Ok(())
}

/// Delivers the oldest pending order of each district; districts with
/// no pending order are skipped.
pub fn execute_delivery(
    conn: &mut dyn Connection,
    w_id: i64,
    carrier_id: i64,
) -> Result<u32, DbError> {
    let mut delivered = 0;
    for d_id in 1..=DISTRICTS_PER_WAREHOUSE {
        let oldest = conn
            .query_row(
                "SELECT MIN(no_o_id) FROM new_order WHERE no_w_id = ? AND no_d_id = ?",
                bind!(w_id, d_id),
            )?
            .and_then(|row| row.opt_i64(0).ok().flatten());
        let o_id = match oldest {
            Some(o_id) => o_id,
            None => continue,
        };

        conn.execute(
            "DELETE FROM new_order WHERE no_w_id = ? AND no_d_id = ? AND no_o_id = ?",
            bind!(w_id, d_id, o_id),
        )?;
        let c_id = conn
            .query_row(
                "SELECT o_c_id FROM orders WHERE o_w_id = ? AND o_d_id = ? AND o_id = ?",
                bind!(w_id, d_id, o_id),
            )?
            .ok_or_else(|| missing("order"))?
            .get_i64(0)?;
        let total = conn
            .query_row(
                "SELECT COALESCE(SUM(ol_amount), 0) FROM order_line \
                 WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id = ?",
                bind!(w_id, d_id, o_id),
            )?
            .ok_or_else(|| missing("order lines"))?
            .get_f64(0)?;

        conn.execute(
            "UPDATE orders SET o_carrier_id = ? WHERE o_w_id = ? AND o_d_id = ? AND o_id = ?",
            bind!(carrier_id, w_id, d_id, o_id),
        )?;
        conn.execute(
            "UPDATE order_line SET ol_delivery_d = ? \
             WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id = ?",
            &[
                Value::Timestamp(now()),
                Value::Int(w_id),
                Value::Int(d_id),
                Value::Int(o_id),
            ],
        )?;
        conn.execute(
            "UPDATE customer SET c_balance = c_balance + ?, c_delivery_cnt = c_delivery_cnt + 1 \
             WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?",
            bind!(total, w_id, d_id, c_id),
        )?;
        delivered += 1;
    }
    Ok(delivered)
}

/// Read-only: distinct low-stock items across the district's last 20
/// orders. Threshold is drawn in [10, 20] by the caller.
pub fn execute_stock_level(
    conn: &mut dyn Connection,
    w_id: i64,
    d_id: i64,
    threshold: i64,
) -> Result<i64, DbError> {
    let next_o_id = conn
        .query_row(
            "SELECT d_next_o_id FROM district WHERE d_w_id = ? AND d_id = ?",
            bind!(w_id, d_id),
        )?
        .ok_or_else(|| missing("district"))?
        .get_i64(0)?;

    let count = conn
        .query_row(
            "SELECT COUNT(DISTINCT s_i_id) FROM order_line \
             JOIN stock ON s_w_id = ? AND s_i_id = ol_i_id \
             WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id >= ? AND ol_o_id < ? \
             AND s_quantity < ?",
            bind!(w_id, w_id, d_id, next_o_id - 20, next_o_id, threshold),
        )?
        .ok_or_else(|| missing("stock level count"))?
        .get_i64(0)?;
    Ok(count)
}
