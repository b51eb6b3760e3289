use crate::error::Error;
use crate::executor::{self, placeholders, quote_ident};
use crate::schema::{Field, Model};
use crate::value::{normalize, refine_row, Row, Value};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

/// The generic per-model data-access engine.
///
/// Every operation builds parameterized SQL from the model's metadata: column
/// and table identifiers come only from declared fields (anything else is
/// rejected with `UnknownColumn`), and all values travel as bound parameters.
/// Values on every write path are normalized by the field's declared type
/// before binding.
///
/// Separate calls are independent round trips over the shared pool; there is
/// no cross-call atomicity, and a concurrent writer can interleave between,
/// say, an `update` and the `find_one` that reports its result.
#[derive(Clone, Debug)]
pub struct Repository {
    model: Arc<Model>,
    pool: SqlitePool,
    key: String,
    key_is_auto_increment: bool,
}

impl Repository {
    /// Builds a repository over one model.
    ///
    /// `Model::define` already guarantees a primary key, but models are plain
    /// data and can be assembled by hand, so the invariant is re-checked here
    /// and a keyless model is rejected with `MissingPrimaryKey`.
    pub fn new(model: Arc<Model>, pool: SqlitePool) -> Result<Self, Error> {
        let key_field = model
            .primary_key()
            .ok_or_else(|| Error::MissingPrimaryKey(model.name.clone()))?;
        let key = key_field.name.clone();
        let key_is_auto_increment = key_field.auto_increment;
        Ok(Self {
            model,
            pool,
            key,
            key_is_auto_increment,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The primary key field name of the underlying model.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn checked_field(&self, name: &str) -> Result<&Field, Error> {
        self.model.field(name).ok_or_else(|| Error::UnknownColumn {
            table: self.model.name.clone(),
            column: name.to_string(),
        })
    }

    /// Normalizes every supplied value by its declared column type.
    fn normalize_row(&self, row: Row) -> Result<Row, Error> {
        row.into_iter()
            .map(|(name, value)| {
                let field = self.checked_field(&name)?;
                Ok((name, normalize(field.field_type, value)))
            })
            .collect()
    }

    /// Builds ` WHERE a = ? AND b = ?` plus its bound parameters. An empty
    /// filter yields an empty clause (matches every row).
    fn where_clause(&self, filter: &Row) -> Result<(String, Vec<Value>), Error> {
        if filter.is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let mut conditions = Vec::with_capacity(filter.len());
        let mut params = Vec::with_capacity(filter.len());
        for (name, value) in filter {
            let field = self.checked_field(name)?;
            conditions.push(format!("{} = ?", quote_ident(name)));
            params.push(normalize(field.field_type, value.clone()));
        }
        Ok((format!(" WHERE {}", conditions.join(" AND ")), params))
    }

    /// Builds one (possibly multi-row) INSERT statement. The first row's key
    /// set, minus a database-assigned primary key, is the canonical column
    /// list; callers must supply homogeneous rows.
    fn insert_statement(&self, rows: &[Row]) -> Result<(String, Vec<Value>), Error> {
        let first = &rows[0];
        let mut columns = Vec::new();
        for name in first.keys() {
            if self.key_is_auto_increment && name == &self.key {
                continue;
            }
            self.checked_field(name)?;
            columns.push(name.clone());
        }
        if columns.is_empty() {
            return Err(Error::EmptyWrite(self.model.name.clone()));
        }

        let mut params = Vec::with_capacity(columns.len() * rows.len());
        for row in rows {
            for name in &columns {
                let field = self.checked_field(name)?;
                let value = row.get(name).cloned().unwrap_or(Value::Null);
                params.push(normalize(field.field_type, value));
            }
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let row_placeholders = format!("({})", placeholders(columns.len()));
        let values_list = vec![row_placeholders; rows.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(&self.model.name),
            column_list,
            values_list
        );
        Ok((sql, params))
    }

    /// Inserts one row and returns the persisted form.
    ///
    /// A database-assigned primary key is always omitted from the insert list;
    /// when the model has one, the full row is re-fetched by the generated
    /// key. Otherwise the submitted row is returned normalized and refined, in
    /// the same shape a fetch of it would produce. Fails with `EmptyWrite`
    /// when no insertable columns remain.
    pub async fn create(&self, row: Row) -> Result<Row, Error> {
        let result = {
            let rows = std::slice::from_ref(&row);
            let (sql, params) = self.insert_statement(rows)?;
            executor::execute(&self.pool, &sql, &params).await?
        };

        if self.key_is_auto_increment {
            if let Some(found) = self.find_by_id(result.last_insert_id).await? {
                return Ok(found);
            }
        }
        Ok(refine_row(&self.model, self.normalize_row(row)?))
    }

    /// Inserts a batch in one statement and re-fetches the persisted rows.
    ///
    /// The re-fetch assumes the generated keys form a contiguous range ending
    /// at the reported last insert id. That holds for single-writer,
    /// non-concurrent batches only; interleaved writers can break the
    /// assumption, so prefer re-querying by a natural key when one exists.
    pub async fn create_many(&self, rows: Vec<Row>) -> Result<Vec<Row>, Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let (sql, params) = self.insert_statement(&rows)?;
        let result = executor::execute(&self.pool, &sql, &params).await?;

        if self.key_is_auto_increment {
            let count = rows.len() as i64;
            let first_id = result.last_insert_id - count + 1;
            let ids: Vec<Value> = (first_id..=result.last_insert_id).map(Value::Int).collect();
            return self.find_many_by_ids(&ids).await;
        }

        rows.into_iter()
            .map(|row| Ok(refine_row(&self.model, self.normalize_row(row)?)))
            .collect()
    }

    /// Inserts a batch in one statement and returns only the affected-row
    /// count, with no re-fetch.
    pub async fn bulk_insert(&self, rows: Vec<Row>) -> Result<u64, Error> {
        if rows.is_empty() {
            return Ok(0);
        }
        let (sql, params) = self.insert_statement(&rows)?;
        let result = executor::execute(&self.pool, &sql, &params).await?;
        Ok(result.rows_affected)
    }

    /// Returns every row matching the exact-match filter, in the database's
    /// natural order. An empty filter returns all rows.
    pub async fn find(&self, filter: &Row) -> Result<Vec<Row>, Error> {
        let (where_sql, params) = self.where_clause(filter)?;
        let sql = format!(
            "SELECT * FROM {}{}",
            quote_ident(&self.model.name),
            where_sql
        );
        let rows = executor::query(&self.pool, &sql, &params).await?;
        Ok(rows
            .into_iter()
            .map(|row| refine_row(&self.model, row))
            .collect())
    }

    /// Returns the first row matching the filter, if any.
    pub async fn find_one(&self, filter: &Row) -> Result<Option<Row>, Error> {
        let (where_sql, params) = self.where_clause(filter)?;
        let sql = format!(
            "SELECT * FROM {}{} LIMIT 1",
            quote_ident(&self.model.name),
            where_sql
        );
        let rows = executor::query(&self.pool, &sql, &params).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| refine_row(&self.model, row)))
    }

    /// Looks up one row by primary key.
    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<Row>, Error> {
        let mut filter = Row::new();
        filter.insert(self.key.clone(), id.into());
        self.find_one(&filter).await
    }

    /// Looks up rows by a set of primary keys. An empty id list returns empty
    /// without touching the database.
    pub async fn find_many_by_ids(&self, ids: &[Value]) -> Result<Vec<Row>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let key_field = self.checked_field(&self.key)?;
        let params: Vec<Value> = ids
            .iter()
            .map(|id| normalize(key_field.field_type, id.clone()))
            .collect();
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            quote_ident(&self.model.name),
            quote_ident(&self.key),
            placeholders(params.len())
        );
        let rows = executor::query(&self.pool, &sql, &params).await?;
        Ok(rows
            .into_iter()
            .map(|row| refine_row(&self.model, row))
            .collect())
    }

    /// Counts rows matching the filter.
    pub async fn count(&self, filter: &Row) -> Result<u64, Error> {
        let (where_sql, params) = self.where_clause(filter)?;
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {}{}",
            quote_ident(&self.model.name),
            where_sql
        );
        let rows = executor::query(&self.pool, &sql, &params).await?;
        match rows.first().and_then(|row| row.get("count")) {
            Some(Value::Int(n)) => Ok(*n as u64),
            _ => Ok(0),
        }
    }

    pub async fn exists(&self, filter: &Row) -> Result<bool, Error> {
        Ok(self.count(filter).await? > 0)
    }

    /// Updates all rows matching the filter and returns the post-update
    /// `find_one(filter)` result.
    ///
    /// An empty filter fails with `MissingFilter` — a full-table update must
    /// never happen by accident. An empty patch performs no write and returns
    /// the current matching row. The re-fetch is a separate round trip, so
    /// callers wanting a meaningful return value should filter precisely
    /// enough to identify one row.
    pub async fn update(&self, filter: &Row, patch: &Row) -> Result<Option<Row>, Error> {
        if filter.is_empty() {
            return Err(Error::MissingFilter {
                operation: "update",
                table: self.model.name.clone(),
            });
        }
        if patch.is_empty() {
            return self.find_one(filter).await;
        }
        self.apply_update(filter, patch).await?;
        self.find_one(filter).await
    }

    /// Updates all rows matching the filter and returns the affected-row
    /// count. Same empty-filter rule as [`Repository::update`]; an empty patch
    /// writes nothing and reports zero.
    pub async fn update_many(&self, filter: &Row, patch: &Row) -> Result<u64, Error> {
        if filter.is_empty() {
            return Err(Error::MissingFilter {
                operation: "update_many",
                table: self.model.name.clone(),
            });
        }
        if patch.is_empty() {
            return Ok(0);
        }
        self.apply_update(filter, patch).await
    }

    async fn apply_update(&self, filter: &Row, patch: &Row) -> Result<u64, Error> {
        let mut assignments = Vec::with_capacity(patch.len());
        let mut params = Vec::with_capacity(patch.len() + filter.len());
        for (name, value) in patch {
            let field = self.checked_field(name)?;
            assignments.push(format!("{} = ?", quote_ident(name)));
            params.push(normalize(field.field_type, value.clone()));
        }
        let (where_sql, where_params) = self.where_clause(filter)?;
        params.extend(where_params);
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_ident(&self.model.name),
            assignments.join(", "),
            where_sql
        );
        let result = executor::execute(&self.pool, &sql, &params).await?;
        Ok(result.rows_affected)
    }

    /// Deletes all rows matching the filter. An empty filter is permitted and
    /// deletes every row.
    pub async fn delete(&self, filter: &Row) -> Result<(), Error> {
        self.delete_many(filter).await?;
        Ok(())
    }

    /// Deletes all rows matching the filter and returns the affected-row count.
    pub async fn delete_many(&self, filter: &Row) -> Result<u64, Error> {
        let (where_sql, params) = self.where_clause(filter)?;
        let sql = format!(
            "DELETE FROM {}{}",
            quote_ident(&self.model.name),
            where_sql
        );
        let result = executor::execute(&self.pool, &sql, &params).await?;
        Ok(result.rows_affected)
    }

    /// Inserts the row, overwriting every non-key column on a primary-key
    /// conflict, and returns the row fetched by key afterwards.
    ///
    /// The caller must supply the key: a database-assigned (auto-increment)
    /// key, or a row that omits the key value, fails with `UnsupportedUpsert`.
    pub async fn upsert(&self, row: Row) -> Result<Row, Error> {
        if self.key_is_auto_increment {
            return Err(Error::UnsupportedUpsert {
                table: self.model.name.clone(),
                reason: format!("primary key `{}` is auto-increment", self.key),
            });
        }
        let key_value = match row.get(&self.key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(Error::UnsupportedUpsert {
                    table: self.model.name.clone(),
                    reason: format!("the row does not supply primary key `{}`", self.key),
                });
            }
        };

        let mut columns = Vec::with_capacity(row.len());
        let mut params = Vec::with_capacity(row.len());
        for (name, value) in &row {
            let field = self.checked_field(name)?;
            columns.push(name.clone());
            params.push(normalize(field.field_type, value.clone()));
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let overwrites: Vec<String> = columns
            .iter()
            .filter(|name| *name != &self.key)
            .map(|name| {
                let quoted = quote_ident(name);
                format!("{quoted} = excluded.{quoted}")
            })
            .collect();
        let conflict_clause = if overwrites.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", overwrites.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
            quote_ident(&self.model.name),
            column_list,
            placeholders(params.len()),
            quote_ident(&self.key),
            conflict_clause
        );
        executor::execute(&self.pool, &sql, &params).await?;

        self.find_by_id(key_value).await?.ok_or(Error::NotFound)
    }
}
