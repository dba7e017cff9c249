//! sbtest schema creation and bulk load

use super::sbtest_table;
use crate::bind;
use crate::config::OltpConfig;
use crate::context::RunContext;
use crate::datagen;
use crate::db::{Connection, DbError, Dialect};
use crate::error::Result;
use rand::Rng;
use tracing::{debug, info};

const LOAD_BATCH: i64 = 1000;

/// Creates (or recreates) the `sbtest1..N` tables, plus the optional
/// secondary index on `k`.
pub fn create_schema(conn: &mut dyn Connection, cfg: &OltpConfig, dialect: Dialect) -> Result<()> {
    for n in 1..=cfg.num_tables {
        let table = sbtest_table(n);
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table), bind!())?;
        let id_column = if cfg.auto_inc {
            dialect.auto_increment_pk()
        } else {
            "INT PRIMARY KEY"
        };
        conn.execute(
            &format!(
                "CREATE TABLE {} (\
                 id {}, \
                 k INT DEFAULT 0, \
                 c CHAR(120) DEFAULT '', \
                 pad CHAR(60) DEFAULT '')",
                table, id_column
            ),
            bind!(),
        )?;
        if cfg.use_secondary_index {
            conn.execute(
                &format!("CREATE INDEX k_{} ON {} (k)", n, table),
                bind!(),
            )?;
        }
    }
    info!(tables = cfg.num_tables, "sbtest schema created");
    Ok(())
}

/// Bulk-inserts `table_size` rows per table, batched into transactions.
/// Returns early (without error) when the run context cancels.
pub fn load_tables(conn: &mut dyn Connection, cfg: &OltpConfig, ctx: &RunContext) -> Result<()> {
    let mut rng = rand::thread_rng();
    for n in 1..=cfg.num_tables {
        let table = sbtest_table(n);
        let insert = format!("INSERT INTO {} (id, k, c, pad) VALUES (?, ?, ?, ?)", table);
        let mut id = 1i64;
        while id <= cfg.table_size {
            if ctx.is_cancelled() {
                return Ok(());
            }
            let batch_end = (id + LOAD_BATCH - 1).min(cfg.table_size);
            insert_batch(conn, &insert, id, batch_end, cfg, &mut rng)?;
            id = batch_end + 1;
        }
        debug!(table = %table, rows = cfg.table_size, "sbtest table loaded");
    }
    info!(
        tables = cfg.num_tables,
        rows_per_table = cfg.table_size,
        "sbtest load complete"
    );
    Ok(())
}

fn insert_batch(
    conn: &mut dyn Connection,
    insert: &str,
    from: i64,
    to: i64,
    cfg: &OltpConfig,
    rng: &mut impl Rng,
) -> std::result::Result<(), DbError> {
    conn.begin()?;
    for id in from..=to {
        let result = conn.execute(
            insert,
            bind!(
                id,
                rng.gen_range(1..=cfg.table_size),
                datagen::sbtest_c_value(rng),
                datagen::sbtest_pad_value(rng)
            ),
        );
        if let Err(err) = result {
            let _ = conn.rollback();
            return Err(err);
        }
    }
    conn.commit()?;
    Ok(())
}

/// Drops every sbtest table.
pub fn drop_schema(conn: &mut dyn Connection, cfg: &OltpConfig) -> Result<()> {
    for n in 1..=cfg.num_tables {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", sbtest_table(n)), bind!())?;
    }
    info!(tables = cfg.num_tables, "sbtest schema dropped");
    Ok(())
}
