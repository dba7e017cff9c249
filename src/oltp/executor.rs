//! OLTP transaction bodies
//!
//! One call executes one logical transaction of the configured test
//! type. Statements run through the shared transaction harness, which
//! owns BEGIN/COMMIT and the deadlock retry discipline.

use super::sbtest_table;
use crate::bind;
use crate::config::{OltpConfig, OltpTestType};
use crate::context::RunContext;
use crate::datagen;
use crate::db::{Connection, DbError};
use crate::executor::{run_in_transaction, TxOptions};
use crate::stats::StatsAggregator;
use rand::Rng;

/// Executes one transaction of `cfg.test_type`.
pub fn run_transaction(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    opts: &TxOptions,
    ctx: &RunContext,
    stats: &StatsAggregator,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    // Parameters are drawn up front so a deadlock retry replays the
    // same logical transaction.
    let plan = Plan::draw(cfg, rng);
    run_in_transaction(conn, opts, ctx, stats, |conn| plan.apply(conn, cfg))
}

/// Pre-drawn randomness for one transaction invocation.
struct Plan {
    kind: OltpTestType,
    seed: u64,
}

impl Plan {
    fn draw(cfg: &OltpConfig, rng: &mut impl Rng) -> Self {
        Self {
            kind: effective_type(cfg, rng),
            seed: rng.gen(),
        }
    }

    fn apply(&self, conn: &mut dyn Connection, cfg: &OltpConfig) -> Result<(), DbError> {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        match self.kind {
            OltpTestType::PointSelect => point_selects(conn, cfg, &mut rng),
            OltpTestType::ReadOnly => read_body(conn, cfg, &mut rng),
            OltpTestType::WriteOnly => write_body(conn, cfg, &mut rng),
            OltpTestType::ReadWrite => {
                read_body(conn, cfg, &mut rng)?;
                write_body(conn, cfg, &mut rng)
            }
            OltpTestType::IndexUpdate => index_updates(conn, cfg, &mut rng),
            OltpTestType::NonIndexUpdate => non_index_updates(conn, cfg, &mut rng),
            OltpTestType::DeleteInsert => delete_inserts(conn, cfg, &mut rng),
        }
    }
}

/// Resolves the body actually executed this invocation: the read_only /
/// write_only flags pin it, and in read-write mode non-zero weights
/// pick one side per draw.
fn effective_type(cfg: &OltpConfig, rng: &mut impl Rng) -> OltpTestType {
    if cfg.read_only {
        return OltpTestType::ReadOnly;
    }
    if cfg.write_only {
        return OltpTestType::WriteOnly;
    }
    if cfg.test_type == OltpTestType::ReadWrite
        && cfg.read_weight > 0.0
        && cfg.write_weight > 0.0
    {
        return if rng.gen_range(0.0..1.0) < cfg.read_weight {
            OltpTestType::ReadOnly
        } else {
            OltpTestType::WriteOnly
        };
    }
    cfg.test_type
}

fn table(cfg: &OltpConfig, rng: &mut impl Rng) -> String {
    sbtest_table(rng.gen_range(1..=cfg.num_tables))
}

fn rand_id(cfg: &OltpConfig, rng: &mut impl Rng) -> i64 {
    rng.gen_range(1..=cfg.table_size)
}

fn point_selects(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    for _ in 0..cfg.point_selects {
        let t = table(cfg, rng);
        conn.query(
            &format!("SELECT c FROM {} WHERE id = ?", t),
            bind!(rand_id(cfg, rng)),
        )?;
    }
    Ok(())
}

fn range_queries(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    for _ in 0..cfg.simple_ranges {
        let t = table(cfg, rng);
        let id = rand_id(cfg, rng);
        conn.query(
            &format!("SELECT c FROM {} WHERE id BETWEEN ? AND ?", t),
            bind!(id, id + cfg.range_size),
        )?;
    }
    for _ in 0..cfg.sum_ranges {
        let t = table(cfg, rng);
        let id = rand_id(cfg, rng);
        conn.query(
            &format!("SELECT SUM(k) FROM {} WHERE id BETWEEN ? AND ?", t),
            bind!(id, id + cfg.range_size),
        )?;
    }
    for _ in 0..cfg.order_ranges {
        let t = table(cfg, rng);
        let id = rand_id(cfg, rng);
        conn.query(
            &format!("SELECT c FROM {} WHERE id BETWEEN ? AND ? ORDER BY c", t),
            bind!(id, id + cfg.range_size),
        )?;
    }
    for _ in 0..cfg.distinct_ranges {
        let t = table(cfg, rng);
        let id = rand_id(cfg, rng);
        conn.query(
            &format!("SELECT DISTINCT c FROM {} WHERE id BETWEEN ? AND ?", t),
            bind!(id, id + cfg.range_size),
        )?;
    }
    Ok(())
}

fn read_body(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    point_selects(conn, cfg, rng)?;
    range_queries(conn, cfg, rng)
}

fn write_body(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    index_updates(conn, cfg, rng)?;
    non_index_updates(conn, cfg, rng)
}

fn index_updates(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    for _ in 0..cfg.index_updates {
        let t = table(cfg, rng);
        conn.execute(
            &format!("UPDATE {} SET k = k + 1 WHERE id = ?", t),
            bind!(rand_id(cfg, rng)),
        )?;
    }
    Ok(())
}

fn non_index_updates(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    for _ in 0..cfg.non_index_updates {
        let t = table(cfg, rng);
        conn.execute(
            &format!("UPDATE {} SET c = ? WHERE id = ?", t),
            bind!(datagen::sbtest_c_value(rng), rand_id(cfg, rng)),
        )?;
    }
    Ok(())
}

fn delete_inserts(
    conn: &mut dyn Connection,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> Result<(), DbError> {
    for _ in 0..cfg.deletes.max(cfg.inserts) {
        let t = table(cfg, rng);
        let id = rand_id(cfg, rng);
        conn.execute(&format!("DELETE FROM {} WHERE id = ?", t), bind!(id))?;
        conn.execute(
            &format!("INSERT INTO {} (id, k, c, pad) VALUES (?, ?, ?, ?)", t),
            bind!(
                id,
                rng.gen_range(1..=cfg.table_size),
                datagen::sbtest_c_value(rng),
                datagen::sbtest_pad_value(rng)
            ),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OltpTestType;
    use crate::context::RunContext;
    use crate::db::sqlite::SqliteDatabase;
    use crate::db::Database;
    use crate::oltp::loader;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn loaded(name: &str, cfg: &OltpConfig) -> Box<dyn Connection> {
        let db = SqliteDatabase::in_memory(name);
        let mut conn = db.connect().unwrap();
        loader::create_schema(conn.as_mut(), cfg, db.dialect()).unwrap();
        loader::load_tables(conn.as_mut(), cfg, &RunContext::new()).unwrap();
        conn
    }

    fn run(conn: &mut dyn Connection, cfg: &OltpConfig) -> Result<(), DbError> {
        let ctx = RunContext::new();
        let stats = StatsAggregator::new();
        let mut rng = StdRng::seed_from_u64(42);
        run_transaction(conn, cfg, &TxOptions::new(), &ctx, &stats, &mut rng)
    }

    #[test]
    fn test_point_select_transaction() {
        let cfg = OltpConfig::new(OltpTestType::PointSelect, 100, 1);
        let mut conn = loaded("oltp-exec-ps", &cfg);
        run(conn.as_mut(), &cfg).unwrap();
    }

    #[test]
    fn test_read_only_transaction() {
        let cfg = OltpConfig::new(OltpTestType::ReadOnly, 100, 1);
        let mut conn = loaded("oltp-exec-ro", &cfg);
        run(conn.as_mut(), &cfg).unwrap();
    }

    #[test]
    fn test_write_only_mutates_rows() {
        let cfg = OltpConfig::new(OltpTestType::WriteOnly, 50, 1);
        let mut conn = loaded("oltp-exec-wo", &cfg);
        let before = conn
            .query_row("SELECT SUM(k) FROM sbtest1", bind!())
            .unwrap()
            .unwrap()
            .get_i64(0)
            .unwrap();
        run(conn.as_mut(), &cfg).unwrap();
        let after = conn
            .query_row("SELECT SUM(k) FROM sbtest1", bind!())
            .unwrap()
            .unwrap()
            .get_i64(0)
            .unwrap();
        // One index update adds exactly 1 to some k.
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_read_write_transaction() {
        let cfg = OltpConfig::new(OltpTestType::ReadWrite, 100, 2);
        let mut conn = loaded("oltp-exec-rw", &cfg);
        run(conn.as_mut(), &cfg).unwrap();
    }

    #[test]
    fn test_delete_insert_preserves_row_count() {
        let cfg = OltpConfig::new(OltpTestType::DeleteInsert, 50, 1);
        let mut conn = loaded("oltp-exec-di", &cfg);
        run(conn.as_mut(), &cfg).unwrap();
        let count = conn
            .query_row("SELECT COUNT(*) FROM sbtest1", bind!())
            .unwrap()
            .unwrap()
            .get_i64(0)
            .unwrap();
        assert_eq!(count, 50);
    }

    #[test]
    fn test_read_only_flag_pins_body() {
        let mut cfg = OltpConfig::new(OltpTestType::ReadWrite, 50, 1);
        cfg.read_only = true;
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(effective_type(&cfg, &mut rng), OltpTestType::ReadOnly);
        }
    }

    #[test]
    fn test_read_write_weights_split_bodies() {
        let mut cfg = OltpConfig::new(OltpTestType::ReadWrite, 50, 1);
        cfg.read_weight = 0.5;
        cfg.write_weight = 0.5;
        let mut rng = StdRng::seed_from_u64(2);
        let mut reads = 0;
        let mut writes = 0;
        for _ in 0..200 {
            match effective_type(&cfg, &mut rng) {
                OltpTestType::ReadOnly => reads += 1,
                OltpTestType::WriteOnly => writes += 1,
                other => panic!("unexpected body {:?}", other),
            }
        }
        assert!(reads > 50 && writes > 50);
    }
}
