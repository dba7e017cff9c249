//! PostgreSQL backend over the blocking `postgres` client
//!
//! Statements are prepared once per connection and cached; bind
//! parameters are converted to the exact types the server described
//! for each placeholder (INT columns take i32, DECIMAL takes numeric,
//! and NULLs are typed per column), since the wire protocol does not
//! widen between integer types.

use super::{Connection, Database, DbError, Dialect};
use crate::value::{Row, Value};
use chrono::NaiveDateTime;
use postgres::types::{ToSql, Type};
use postgres::{NoTls, Statement};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub struct PostgresDatabase {
    conn_string: String,
}

impl PostgresDatabase {
    pub fn new(conn_string: impl Into<String>) -> Self {
        Self {
            conn_string: conn_string.into(),
        }
    }
}

impl Database for PostgresDatabase {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let client = postgres::Client::connect(&self.conn_string, NoTls)?;
        Ok(Box::new(PostgresConnection {
            client,
            statements: HashMap::new(),
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

pub struct PostgresConnection {
    client: postgres::Client,
    statements: HashMap<String, Statement>,
}

/// Rewrites `?` placeholders to PostgreSQL's `$1..$n`, leaving quoted
/// literals untouched.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut in_quote = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_quote = !in_quote;
                out.push(ch);
            }
            '?' if !in_quote => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

/// A bind value converted to the exact wire type the server described
/// for its placeholder. `None` payloads are typed NULLs.
#[derive(Debug)]
enum PgParam {
    I16(Option<i16>),
    I32(Option<i32>),
    I64(Option<i64>),
    F32(Option<f32>),
    F64(Option<f64>),
    Numeric(Option<Decimal>),
    Bool(Option<bool>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
}

impl PgParam {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            PgParam::I16(v) => v,
            PgParam::I32(v) => v,
            PgParam::I64(v) => v,
            PgParam::F32(v) => v,
            PgParam::F64(v) => v,
            PgParam::Numeric(v) => v,
            PgParam::Bool(v) => v,
            PgParam::Text(v) => v,
            PgParam::Timestamp(v) => v,
        }
    }
}

fn is_text(ty: &Type) -> bool {
    *ty == Type::VARCHAR || *ty == Type::TEXT || *ty == Type::BPCHAR
}

fn typed_null(ty: &Type) -> Result<PgParam, DbError> {
    if *ty == Type::INT2 {
        Ok(PgParam::I16(None))
    } else if *ty == Type::INT4 {
        Ok(PgParam::I32(None))
    } else if *ty == Type::INT8 {
        Ok(PgParam::I64(None))
    } else if *ty == Type::FLOAT4 {
        Ok(PgParam::F32(None))
    } else if *ty == Type::FLOAT8 {
        Ok(PgParam::F64(None))
    } else if *ty == Type::NUMERIC {
        Ok(PgParam::Numeric(None))
    } else if *ty == Type::BOOL {
        Ok(PgParam::Bool(None))
    } else if *ty == Type::TIMESTAMP {
        Ok(PgParam::Timestamp(None))
    } else if is_text(ty) {
        Ok(PgParam::Text(None))
    } else {
        Err(DbError::Decode(format!(
            "cannot bind NULL to column type {}",
            ty
        )))
    }
}

/// Converts one bind value to the parameter type the server described.
fn typed_param(ty: &Type, value: &Value) -> Result<PgParam, DbError> {
    let mismatch = || {
        DbError::Decode(format!(
            "cannot bind {} to column type {}",
            value, ty
        ))
    };
    match value {
        Value::Null => typed_null(ty),
        Value::Int(v) => {
            if *ty == Type::INT2 {
                let v = i16::try_from(*v).map_err(|_| mismatch())?;
                Ok(PgParam::I16(Some(v)))
            } else if *ty == Type::INT4 {
                let v = i32::try_from(*v).map_err(|_| mismatch())?;
                Ok(PgParam::I32(Some(v)))
            } else if *ty == Type::INT8 {
                Ok(PgParam::I64(Some(*v)))
            } else if *ty == Type::FLOAT4 {
                Ok(PgParam::F32(Some(*v as f32)))
            } else if *ty == Type::FLOAT8 {
                Ok(PgParam::F64(Some(*v as f64)))
            } else if *ty == Type::NUMERIC {
                Ok(PgParam::Numeric(Some(Decimal::from(*v))))
            } else if *ty == Type::BOOL {
                Ok(PgParam::Bool(Some(*v != 0)))
            } else {
                Err(mismatch())
            }
        }
        Value::Float(v) => {
            if *ty == Type::FLOAT4 {
                Ok(PgParam::F32(Some(*v as f32)))
            } else if *ty == Type::FLOAT8 {
                Ok(PgParam::F64(Some(*v)))
            } else if *ty == Type::NUMERIC {
                let v = Decimal::from_f64(*v).ok_or_else(mismatch)?;
                Ok(PgParam::Numeric(Some(v)))
            } else {
                Err(mismatch())
            }
        }
        Value::Text(v) => {
            if is_text(ty) {
                Ok(PgParam::Text(Some(v.clone())))
            } else {
                Err(mismatch())
            }
        }
        Value::Timestamp(v) => {
            if *ty == Type::TIMESTAMP {
                Ok(PgParam::Timestamp(Some(*v)))
            } else {
                Err(mismatch())
            }
        }
    }
}

fn typed_params(described: &[Type], params: &[Value]) -> Result<Vec<PgParam>, DbError> {
    if described.len() != params.len() {
        return Err(DbError::Decode(format!(
            "{} bind values for {} placeholders",
            params.len(),
            described.len()
        )));
    }
    described
        .iter()
        .zip(params)
        .map(|(ty, value)| typed_param(ty, value))
        .collect()
}

fn decode(row: &postgres::Row, idx: usize) -> Result<Value, DbError> {
    let ty = row.columns()[idx].type_();
    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map_or(Value::Null, |v| Value::Int(v as i64))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map_or(Value::Null, |v| Value::Int(v as i64))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?
            .map_or(Value::Null, Value::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?
            .map_or(Value::Null, |v| Value::Float(v as f64))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?
            .map_or(Value::Null, Value::Float)
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<Decimal>>(idx)?
            .map_or(Value::Null, |v| Value::Float(v.to_f64().unwrap_or(0.0)))
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?
            .map_or(Value::Null, |v| Value::Int(v as i64))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map_or(Value::Null, Value::Timestamp)
    } else if is_text(ty) {
        row.try_get::<_, Option<String>>(idx)?
            .map_or(Value::Null, Value::Text)
    } else {
        return Err(DbError::Decode(format!(
            "unsupported column type {} at index {}",
            ty, idx
        )));
    };
    Ok(value)
}

impl PostgresConnection {
    fn statement(&mut self, sql: &str) -> Result<Statement, DbError> {
        let sql = numbered_placeholders(sql);
        if let Some(stmt) = self.statements.get(&sql) {
            return Ok(stmt.clone());
        }
        let stmt = self.client.prepare(&sql)?;
        self.statements.insert(sql, stmt.clone());
        Ok(stmt)
    }
}

impl Connection for PostgresConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let stmt = self.statement(sql)?;
        let typed = typed_params(stmt.params(), params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = typed.iter().map(PgParam::as_sql).collect();
        Ok(self.client.execute(&stmt, &refs)?)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let stmt = self.statement(sql)?;
        let typed = typed_params(stmt.params(), params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = typed.iter().map(PgParam::as_sql).collect();
        let rows = self.client.query(&stmt, &refs)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                values.push(decode(row, i)?);
            }
            out.push(Row::new(values));
        }
        Ok(out)
    }

    fn prepare(&mut self, sql: &str) -> Result<(), DbError> {
        self.statement(sql)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_rewrite() {
        assert_eq!(
            numbered_placeholders("SELECT c FROM t WHERE id = ? AND k > ?"),
            "SELECT c FROM t WHERE id = $1 AND k > $2"
        );
    }

    #[test]
    fn test_placeholder_rewrite_skips_quoted_literals() {
        assert_eq!(
            numbered_placeholders("INSERT INTO t VALUES (?, 'what?')"),
            "INSERT INTO t VALUES ($1, 'what?')"
        );
    }

    #[test]
    fn test_placeholder_rewrite_no_params() {
        assert_eq!(numbered_placeholders("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_int_binds_at_described_width() {
        // INT columns describe as INT4; the i64 carried by Value::Int
        // must narrow instead of binding as INT8.
        match typed_param(&Type::INT4, &Value::Int(3001)).unwrap() {
            PgParam::I32(Some(v)) => assert_eq!(v, 3001),
            other => panic!("expected I32, got {:?}", other),
        }
        match typed_param(&Type::INT8, &Value::Int(7)).unwrap() {
            PgParam::I64(Some(v)) => assert_eq!(v, 7),
            other => panic!("expected I64, got {:?}", other),
        }
        match typed_param(&Type::INT2, &Value::Int(12)).unwrap() {
            PgParam::I16(Some(v)) => assert_eq!(v, 12),
            other => panic!("expected I16, got {:?}", other),
        }
        // Out-of-range narrowing is an error, not a silent wrap.
        assert!(typed_param(&Type::INT4, &Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn test_numeric_binds_decimal() {
        match typed_param(&Type::NUMERIC, &Value::Float(12.34)).unwrap() {
            PgParam::Numeric(Some(v)) => {
                assert!((v.to_f64().unwrap() - 12.34).abs() < 1e-9)
            }
            other => panic!("expected Numeric, got {:?}", other),
        }
        // DECIMAL columns also take integer amounts.
        match typed_param(&Type::NUMERIC, &Value::Int(300000)).unwrap() {
            PgParam::Numeric(Some(v)) => assert_eq!(v, Decimal::from(300000i64)),
            other => panic!("expected Numeric, got {:?}", other),
        }
    }

    #[test]
    fn test_nulls_are_typed_per_column() {
        // o_carrier_id is INT4; ol_delivery_d is TIMESTAMP. The same
        // Value::Null must bind differently against each.
        match typed_null(&Type::INT4).unwrap() {
            PgParam::I32(None) => {}
            other => panic!("expected I32 NULL, got {:?}", other),
        }
        match typed_null(&Type::TIMESTAMP).unwrap() {
            PgParam::Timestamp(None) => {}
            other => panic!("expected TIMESTAMP NULL, got {:?}", other),
        }
        match typed_null(&Type::VARCHAR).unwrap() {
            PgParam::Text(None) => {}
            other => panic!("expected TEXT NULL, got {:?}", other),
        }
        assert!(typed_null(&Type::BYTEA).is_err());
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        assert!(typed_param(&Type::INT4, &Value::Text("x".into())).is_err());
        assert!(typed_param(&Type::TIMESTAMP, &Value::Int(1)).is_err());
        assert!(typed_param(&Type::VARCHAR, &Value::Float(1.0)).is_err());
    }

    #[test]
    fn test_param_count_mismatch_is_rejected() {
        let described = [Type::INT4, Type::VARCHAR];
        assert!(typed_params(&described, &[Value::Int(1)]).is_err());
        let ok = typed_params(&described, &[Value::Int(1), Value::Text("a".into())]).unwrap();
        assert_eq!(ok.len(), 2);
    }
}
