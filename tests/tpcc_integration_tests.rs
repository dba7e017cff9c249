//! TPC-C end-to-end tests on in-memory SQLite
//!
//! A full mixed run against the real loader, plus transaction-level
//! checks (New-Order, Payment, Order-Status, Delivery) against a small
//! hand-seeded dataset.

use stampede::bind;
use stampede::config::{FamilyConfig, RunConfig, TpccConfig};
use stampede::controller::RunState;
use stampede::db::sqlite::SqliteDatabase;
use stampede::db::{Connection, Database};
use stampede::registry::BenchmarkRegistry;
use stampede::tpcc::executor::{
    execute_delivery, execute_new_order, execute_order_status, execute_payment,
    execute_stock_level, NewOrderLine, NewOrderParams, PaymentParams,
};
use stampede::tpcc::schema;
use stampede::value::Value;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_mixed_run_against_loaded_warehouse() {
    // One warehouse, two terminals, five seconds of the 45/43/4/4/4
    // mix. The run completes with work in every class.
    let registry = BenchmarkRegistry::with_builtin();
    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory("tpcc-it-run"));
    let tpcc = TpccConfig {
        terminals: 2,
        ..TpccConfig::default()
    };
    let mut config = RunConfig::new("tpcc-s4", 2, 5.0, FamilyConfig::Tpcc(tpcc));
    config.report_interval_secs = 1.0;

    let controller = registry.create_controller(config, db).unwrap();
    controller.start().unwrap();
    let state = controller.wait_for_terminal(Duration::from_secs(300));
    assert_eq!(state, RunState::Completed);

    let report = controller.report();
    assert!(report.metrics.total_transactions > 0);
    assert!(report.metrics.tpmc.unwrap_or(0.0) > 0.0);
    let efficiency = report.metrics.efficiency;
    assert!(
        efficiency > 0.0 && efficiency <= 100.0,
        "efficiency out of range: {}",
        efficiency
    );
    for class in [
        "new_order",
        "payment",
        "order_status",
        "delivery",
        "stock_level",
    ] {
        let counters = report
            .metrics
            .per_class
            .get(class)
            .unwrap_or_else(|| panic!("missing class {}", class));
        assert!(counters.count > 0, "no committed {} transactions", class);
    }
    assert!(!report.intervals.is_empty());
}

/// Hand-seeded single-warehouse fixture: one district, two customers,
/// two items with known prices, stock for both.
fn seeded_connection(name: &str) -> (Arc<SqliteDatabase>, Box<dyn Connection>) {
    let db = Arc::new(SqliteDatabase::in_memory(name));
    let mut conn = db.connect().unwrap();
    schema::create_all(conn.as_mut()).unwrap();

    conn.execute(
        "INSERT INTO warehouse (w_id, w_name, w_street_1, w_street_2, w_city, w_state, w_zip, \
         w_tax, w_ytd) VALUES (1, 'wh1', 's1', 's2', 'city', 'ST', '123411111', 0.1, 300000.0)",
        bind!(),
    )
    .unwrap();
    conn.execute(
        "INSERT INTO district (d_id, d_w_id, d_name, d_street_1, d_street_2, d_city, d_state, \
         d_zip, d_tax, d_ytd, d_next_o_id) \
         VALUES (1, 1, 'd1', 's1', 's2', 'city', 'ST', '123411111', 0.1, 30000.0, 3001)",
        bind!(),
    )
    .unwrap();
    for c_id in [1i64, 2] {
        conn.execute(
            "INSERT INTO customer (c_id, c_d_id, c_w_id, c_first, c_middle, c_last, c_street_1, \
             c_street_2, c_city, c_state, c_zip, c_phone, c_since, c_credit, c_credit_lim, \
             c_discount, c_balance, c_ytd_payment, c_payment_cnt, c_delivery_cnt, c_data) \
             VALUES (?, 1, 1, 'first', 'OE', 'BAR', 's1', 's2', 'city', 'ST', '123411111', \
             '1234567890123456', '2024-01-01 00:00:00', 'GC', 50000.0, 0.0, -10.0, 10.0, 1, 0, 'data')",
            bind!(c_id),
        )
        .unwrap();
    }
    for (i_id, price) in [(1i64, 10.0f64), (2, 20.0)] {
        conn.execute(
            "INSERT INTO item (i_id, i_im_id, i_name, i_price, i_data) VALUES (?, 1, 'item', ?, 'd')",
            bind!(i_id, price),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO stock (s_i_id, s_w_id, s_quantity, s_dist_01, s_dist_02, s_dist_03, \
             s_dist_04, s_dist_05, s_dist_06, s_dist_07, s_dist_08, s_dist_09, s_dist_10, \
             s_ytd, s_order_cnt, s_remote_cnt, s_data) \
             VALUES (?, 1, 50, 'd01', 'd02', 'd03', 'd04', 'd05', 'd06', 'd07', 'd08', 'd09', \
             'd10', 0, 0, 0, 'sd')",
            bind!(i_id),
        )
        .unwrap();
    }
    (db, conn)
}

fn f64_at(conn: &mut dyn Connection, sql: &str, params: &[Value]) -> f64 {
    conn.query_row(sql, params)
        .unwrap()
        .unwrap()
        .get_f64(0)
        .unwrap()
}

fn i64_at(conn: &mut dyn Connection, sql: &str, params: &[Value]) -> i64 {
    conn.query_row(sql, params)
        .unwrap()
        .unwrap()
        .get_i64(0)
        .unwrap()
}

#[test]
fn test_new_order_payment_order_status_sequence() {
    let (_db, mut conn) = seeded_connection("tpcc-it-s5");
    let conn = conn.as_mut();

    // New-Order with two known lines.
    let params = NewOrderParams {
        w_id: 1,
        d_id: 1,
        c_id: 1,
        lines: vec![
            NewOrderLine {
                i_id: 1,
                supply_w_id: 1,
                quantity: 1,
            },
            NewOrderLine {
                i_id: 2,
                supply_w_id: 1,
                quantity: 1,
            },
        ],
    };
    let output = execute_new_order(conn, &params).unwrap();
    assert_eq!(output.order_id, 3001);
    // (10 + 20) * (1 + 0.1 + 0.1) * (1 - 0.0)
    assert!((output.total_amount - 36.0).abs() < 1e-9);

    // District cursor advanced by exactly one.
    assert_eq!(
        i64_at(conn, "SELECT d_next_o_id FROM district WHERE d_w_id = 1 AND d_id = 1", bind!()),
        3002
    );

    // One undelivered order with its matching new_order row.
    assert_eq!(
        i64_at(conn, "SELECT COUNT(*) FROM orders WHERE o_carrier_id IS NULL", bind!()),
        1
    );
    assert_eq!(
        i64_at(
            conn,
            "SELECT COUNT(*) FROM new_order WHERE no_w_id = 1 AND no_d_id = 1 AND no_o_id = 3001",
            bind!()
        ),
        1
    );
    assert_eq!(
        i64_at(conn, "SELECT COUNT(*) FROM order_line WHERE ol_o_id = 3001", bind!()),
        2
    );
    // Stock decremented with the wrap rule inactive at these levels.
    assert_eq!(
        i64_at(conn, "SELECT s_quantity FROM stock WHERE s_w_id = 1 AND s_i_id = 1", bind!()),
        49
    );
    assert_eq!(
        i64_at(conn, "SELECT s_order_cnt FROM stock WHERE s_w_id = 1 AND s_i_id = 1", bind!()),
        1
    );

    // Payment of exactly 100.0.
    let payment = PaymentParams {
        w_id: 1,
        d_id: 1,
        c_id: 1,
        amount: 100.0,
    };
    execute_payment(conn, &payment).unwrap();
    let balance = f64_at(
        conn,
        "SELECT c_balance FROM customer WHERE c_w_id = 1 AND c_d_id = 1 AND c_id = 1",
        bind!(),
    );
    assert!((balance - (-110.0)).abs() < 1e-9);
    let ytd_payment = f64_at(
        conn,
        "SELECT c_ytd_payment FROM customer WHERE c_w_id = 1 AND c_d_id = 1 AND c_id = 1",
        bind!(),
    );
    assert!((ytd_payment - 110.0).abs() < 1e-9);
    assert_eq!(i64_at(conn, "SELECT COUNT(*) FROM history", bind!()), 1);
    let w_ytd = f64_at(conn, "SELECT w_ytd FROM warehouse WHERE w_id = 1", bind!());
    assert!((w_ytd - 300_100.0).abs() < 1e-9);

    // Order-Status reads commit without touching state.
    execute_order_status(conn, 1, 1, 1).unwrap();
    assert_eq!(
        i64_at(conn, "SELECT COUNT(*) FROM orders", bind!()),
        1
    );
}

#[test]
fn test_delivery_completes_pending_order() {
    let (_db, mut conn) = seeded_connection("tpcc-it-s6");
    let conn = conn.as_mut();

    let params = NewOrderParams {
        w_id: 1,
        d_id: 1,
        c_id: 1,
        lines: vec![
            NewOrderLine {
                i_id: 1,
                supply_w_id: 1,
                quantity: 1,
            },
            NewOrderLine {
                i_id: 2,
                supply_w_id: 1,
                quantity: 1,
            },
        ],
    };
    execute_new_order(conn, &params).unwrap();

    let delivered = execute_delivery(conn, 1, 1).unwrap();
    assert_eq!(delivered, 1);

    // new_order row gone, carrier set, every line stamped.
    assert_eq!(i64_at(conn, "SELECT COUNT(*) FROM new_order", bind!()), 0);
    assert_eq!(
        i64_at(conn, "SELECT o_carrier_id FROM orders WHERE o_id = 3001", bind!()),
        1
    );
    assert_eq!(
        i64_at(
            conn,
            "SELECT COUNT(*) FROM order_line WHERE ol_o_id = 3001 AND ol_delivery_d IS NULL",
            bind!()
        ),
        0
    );

    // Balance credited with the order-line sum (10 + 20), delivery
    // count bumped.
    let balance = f64_at(
        conn,
        "SELECT c_balance FROM customer WHERE c_w_id = 1 AND c_d_id = 1 AND c_id = 1",
        bind!(),
    );
    assert!((balance - 20.0).abs() < 1e-9, "balance {}", balance);
    assert_eq!(
        i64_at(
            conn,
            "SELECT c_delivery_cnt FROM customer WHERE c_w_id = 1 AND c_d_id = 1 AND c_id = 1",
            bind!()
        ),
        1
    );

    // NewOrder/Orders bijection holds after delivery: no undelivered
    // orders remain and new_order is empty.
    assert_eq!(
        i64_at(conn, "SELECT COUNT(*) FROM orders WHERE o_carrier_id IS NULL", bind!()),
        0
    );

    // A second delivery pass finds nothing to do.
    assert_eq!(execute_delivery(conn, 1, 2).unwrap(), 0);
}

#[test]
fn test_stock_level_counts_low_stock_items() {
    let (_db, mut conn) = seeded_connection("tpcc-it-sl");
    let conn = conn.as_mut();

    let params = NewOrderParams {
        w_id: 1,
        d_id: 1,
        c_id: 1,
        lines: vec![NewOrderLine {
            i_id: 1,
            supply_w_id: 1,
            quantity: 1,
        }],
    };
    execute_new_order(conn, &params).unwrap();

    // Threshold above the remaining quantity counts the item; below
    // does not.
    assert_eq!(execute_stock_level(conn, 1, 1, 100).unwrap(), 1);
    assert_eq!(execute_stock_level(conn, 1, 1, 10).unwrap(), 0);
}

#[test]
fn test_new_order_bijection_under_mixed_traffic() {
    // Several new orders and deliveries in sequence: new_order always
    // matches exactly the undelivered orders.
    let (_db, mut conn) = seeded_connection("tpcc-it-bij");
    let conn = conn.as_mut();

    for _ in 0..5 {
        let params = NewOrderParams {
            w_id: 1,
            d_id: 1,
            c_id: 2,
            lines: vec![NewOrderLine {
                i_id: 1,
                supply_w_id: 1,
                quantity: 2,
            }],
        };
        execute_new_order(conn, &params).unwrap();
    }
    execute_delivery(conn, 1, 3).unwrap();
    execute_delivery(conn, 1, 4).unwrap();

    let pending = i64_at(conn, "SELECT COUNT(*) FROM new_order", bind!());
    let undelivered = i64_at(
        conn,
        "SELECT COUNT(*) FROM orders WHERE o_carrier_id IS NULL",
        bind!(),
    );
    assert_eq!(pending, 3);
    assert_eq!(pending, undelivered);

    // Every pending row points at exactly one undelivered order.
    let orphans = i64_at(
        conn,
        "SELECT COUNT(*) FROM new_order WHERE NOT EXISTS (\
         SELECT 1 FROM orders WHERE o_w_id = no_w_id AND o_d_id = no_d_id \
         AND o_id = no_o_id AND o_carrier_id IS NULL)",
        bind!(),
    );
    assert_eq!(orphans, 0);
}
