//! The boundary between this crate and the SQL driver.
//!
//! Everything above this module speaks in terms of SQL text plus a slice of
//! [`Value`] parameters; this module turns that into bound `sqlx` statements
//! and turns driver rows back into dynamic [`Row`] maps. The functions are
//! generic over any SQLite executor, so the connection pool and a
//! transaction-scoped connection share one code path.

use crate::error::Error;
use crate::value::{Row, Value, DATETIME_FORMAT};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

/// The driver's report for a completed write statement.
#[derive(Debug, Clone, Copy)]
pub struct WriteResult {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

/// Quotes an identifier for inclusion in SQL text.
///
/// Identifiers passed here originate exclusively from registered model
/// metadata (the repository rejects caller-supplied names it cannot match to a
/// declared field), so interpolation is safe by construction.
pub(crate) fn quote_ident(name: &str) -> String {
    // An embedded quote is escaped by doubling it, per SQL identifier rules.
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A comma-separated run of `n` bind placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Json(j) => query.bind(j.to_string()),
        Value::DateTime(ts) => query.bind(ts.format(DATETIME_FORMAT).to_string()),
    }
}

/// Runs a parameterized write statement and reports the affected-row count and
/// last insert rowid.
pub async fn execute<'e, E>(executor: E, sql: &str, params: &[Value]) -> Result<WriteResult, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut query = sqlx::query(sql);
    for value in params {
        query = bind_value(query, value);
    }
    let result = query.execute(executor).await?;
    Ok(WriteResult {
        rows_affected: result.rows_affected(),
        last_insert_id: result.last_insert_rowid(),
    })
}

/// Runs a parameterized query and decodes every returned row into a dynamic
/// [`Row`] map.
pub async fn query<'e, E>(executor: E, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut query = sqlx::query(sql);
    for value in params {
        query = bind_value(query, value);
    }
    let rows = query.fetch_all(executor).await?;
    rows.iter().map(decode_row).collect()
}

/// Decodes one driver row by the storage class of each column value.
fn decode_row(row: &SqliteRow) -> Result<Row, Error> {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "INT" | "BIGINT" => Value::Int(row.try_get::<i64, _>(index)?),
                "REAL" | "FLOAT" | "DOUBLE" => Value::Float(row.try_get::<f64, _>(index)?),
                "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(index)?),
                "BLOB" => Value::Text(
                    String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(index)?).into_owned(),
                ),
                _ => Value::Text(row.try_get::<String, _>(index)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}
