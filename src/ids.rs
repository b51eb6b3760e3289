use crate::error::Error;
use crate::executor;
use crate::value::Value;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

/// The table backing the per-prefix id counters.
pub const COUNTER_TABLE: &str = "_id_counters";

/// Returns the next human-readable id for a prefix, e.g. `"INV-007"`.
///
/// Counters persist in a small ledger table, ensured idempotently on first
/// use. The read-increment-write runs inside one transaction so two callers
/// in the same process cannot mint the same id.
pub async fn next_prefixed_id(pool: &SqlitePool, prefix: &str) -> Result<String, Error> {
    let create = format!(
        "CREATE TABLE IF NOT EXISTS {COUNTER_TABLE} (\
         prefix TEXT PRIMARY KEY, \
         count INTEGER NOT NULL)"
    );
    executor::execute(pool, &create, &[]).await?;

    let mut tx = pool.begin().await?;
    let rows = executor::query(
        &mut *tx,
        &format!("SELECT count FROM {COUNTER_TABLE} WHERE prefix = ?"),
        &[Value::Text(prefix.to_string())],
    )
    .await?;

    let count = match rows.first().and_then(|row| row.get("count")) {
        Some(Value::Int(current)) => {
            let next = current + 1;
            executor::execute(
                &mut *tx,
                &format!("UPDATE {COUNTER_TABLE} SET count = ? WHERE prefix = ?"),
                &[Value::Int(next), Value::Text(prefix.to_string())],
            )
            .await?;
            next
        }
        _ => {
            executor::execute(
                &mut *tx,
                &format!("INSERT INTO {COUNTER_TABLE} (prefix, count) VALUES (?, ?)"),
                &[Value::Text(prefix.to_string()), Value::Int(1)],
            )
            .await?;
            1
        }
    };
    tx.commit().await?;

    Ok(format!("{prefix}-{count:03}"))
}

/// A fresh random (v4) UUID in canonical string form.
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}
