//! SQLite backend over rusqlite
//!
//! The in-memory variant uses a shared-cache URI so every worker
//! connection observes the same database; the handle keeps one anchor
//! connection alive for the lifetime of the run.

use super::{Connection, Database, DbError, Dialect};
use crate::value::{Row, Value};
use rusqlite::types::ValueRef;
use rusqlite::OpenFlags;
use std::sync::Mutex;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

pub struct SqliteDatabase {
    uri: String,
    // Keeps a shared-cache in-memory database alive between connects.
    anchor: Mutex<Option<rusqlite::Connection>>,
}

impl SqliteDatabase {
    /// On-disk database at `path`.
    pub fn open(path: impl Into<String>) -> Self {
        Self {
            uri: path.into(),
            anchor: Mutex::new(None),
        }
    }

    /// Named in-memory database shared across all connections.
    pub fn in_memory(name: &str) -> Self {
        let uri = format!("file:{}?mode=memory&cache=shared", name);
        let db = Self {
            uri,
            anchor: Mutex::new(None),
        };
        if let Ok(conn) = db.raw_connect() {
            *db.anchor.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn);
        }
        db
    }

    fn raw_connect(&self) -> Result<rusqlite::Connection, DbError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(&self.uri, flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

impl Database for SqliteDatabase {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        Ok(Box::new(SqliteConnection {
            conn: self.raw_connect()?,
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    fn decode(cell: ValueRef<'_>) -> Value {
        match cell {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => Value::Null,
        }
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let n = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
        Ok(n as u64)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(Self::decode(row.get_ref(i)?));
            }
            out.push(Row::new(values));
        }
        Ok(out)
    }

    fn prepare(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.prepare_cached(sql)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl rusqlite::types::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            Value::Int(v) => v.to_sql(),
            Value::Float(v) => v.to_sql(),
            Value::Text(v) => Ok(rusqlite::types::ToSqlOutput::from(v.as_str())),
            Value::Timestamp(v) => v.to_sql(),
            Value::Null => rusqlite::types::Null.to_sql(),
        }
    }
}
