use crate::db::Database;
use crate::error::Error;
use crate::executor::{self, quote_ident};
use crate::schema::{Field, FieldType, Model};
use crate::value::{Value, DATETIME_FORMAT};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Generates and dispatches table-creation DDL for registered models.
///
/// The comparison is table-existence only: a model whose table already exists
/// is skipped whole, with no column-level diffing, so drift on existing
/// tables is never detected or corrected here.
pub struct SchemaSync<'a> {
    db: &'a Database,
}

impl<'a> SchemaSync<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Introspects the live table set once and returns the DDL batch for
    /// every registered model whose table is missing: one `CREATE TABLE`
    /// followed by one `CREATE INDEX` per declared index. An empty batch
    /// means the schema is already in sync.
    pub async fn plan(&self) -> Result<Vec<String>, Error> {
        let existing = self.existing_tables().await?;
        let mut statements = Vec::new();

        for model in self.db.models() {
            if existing.contains(&model.name) {
                continue;
            }
            statements.push(create_table_sql(&model));
            for index in &model.indexes {
                statements.push(create_index_sql(&model, index));
            }
        }

        if statements.is_empty() {
            tracing::info!("schema already in sync");
        } else {
            tracing::info!(statements = statements.len(), "schema plan computed");
        }
        Ok(statements)
    }

    /// Executes a generated batch directly, in order, stopping at the first
    /// failure (later statements stay un-applied). Refuses to run when the
    /// context is flagged as production — funnel changes through `emit` and
    /// the migration runner instead. An empty batch is a no-op success.
    pub async fn apply(&self, statements: &[String]) -> Result<(), Error> {
        if self.db.is_production() {
            return Err(Error::ForbiddenInProduction);
        }
        for statement in statements {
            executor::execute(self.db.pool(), statement, &[]).await?;
        }
        if !statements.is_empty() {
            tracing::info!(statements = statements.len(), "schema applied (dev mode)");
        }
        Ok(())
    }

    /// Writes the batch as one new migration unit — a `<id>_auto_sync.sql`
    /// file readable by `DirectorySource`, with the id derived from the
    /// current time. Returns `None` when there is nothing to write.
    ///
    /// This is the preferred path for anything beyond local development: the
    /// generated DDL then flows through the migration runner's ledger and
    /// per-unit transactions.
    pub fn emit(&self, statements: &[String], dir: &Path) -> Result<Option<PathBuf>, Error> {
        if statements.is_empty() {
            return Ok(None);
        }
        std::fs::create_dir_all(dir)?;
        let id = Utc::now().format("%Y%m%d%H%M%S");
        let path = dir.join(format!("{id}_auto_sync.sql"));

        let mut contents = String::new();
        for statement in statements {
            contents.push_str(statement);
            contents.push_str(";\n\n");
        }
        std::fs::write(&path, contents)?;

        tracing::info!(path = %path.display(), "migration generated");
        Ok(Some(path))
    }

    async fn existing_tables(&self) -> Result<BTreeSet<String>, Error> {
        let rows = executor::query(
            self.db.pool(),
            "SELECT name FROM sqlite_master WHERE type = 'table'",
            &[],
        )
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.get("name") {
                Some(Value::Text(name)) => Some(name.clone()),
                _ => None,
            })
            .collect())
    }
}

/// Maps a declared field type onto its SQLite column type.
fn map_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "TEXT",
        FieldType::Int => "INTEGER",
        FieldType::Float => "REAL",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Json => "TEXT",
        FieldType::DateTime => "DATETIME",
    }
}

/// Renders a default value as a SQL literal for a `DEFAULT` clause.
fn format_default(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Json(j) => format!("'{}'", j.to_string().replace('\'', "''")),
        Value::DateTime(ts) => format!("'{}'", ts.format(DATETIME_FORMAT)),
    }
}

fn column_sql(field: &Field) -> String {
    let mut column = format!("{} {}", quote_ident(&field.name), map_type(field.field_type));

    if field.primary_key {
        column.push_str(" PRIMARY KEY");
    }
    if field.auto_increment {
        // Valid by construction: Model::define only allows this on int keys.
        column.push_str(" AUTOINCREMENT");
    }
    if field.required || field.primary_key {
        column.push_str(" NOT NULL");
    }
    if field.unique {
        column.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default_value {
        column.push_str(&format!(" DEFAULT {}", format_default(default)));
    }

    column
}

/// Renders the `CREATE TABLE` statement for one model, columns in field
/// insertion order, foreign key clauses last.
fn create_table_sql(model: &Model) -> String {
    let mut lines: Vec<String> = model.fields.iter().map(column_sql).collect();

    for fk in &model.foreign_keys {
        let mut clause = format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            quote_ident(&fk.column),
            quote_ident(&fk.referenced_table),
            quote_ident(&fk.referenced_column)
        );
        if let Some(action) = fk.on_delete {
            clause.push_str(&format!(" ON DELETE {}", action.as_sql()));
        }
        if let Some(action) = fk.on_update {
            clause.push_str(&format!(" ON UPDATE {}", action.as_sql()));
        }
        lines.push(clause);
    }

    format!(
        "CREATE TABLE {} (\n  {}\n)",
        quote_ident(&model.name),
        lines.join(",\n  ")
    )
}

fn create_index_sql(model: &Model, index: &crate::schema::Index) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let columns = index
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote_ident(&index.resolved_name(&model.name)),
        quote_ident(&model.name),
        columns
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldOptions, FieldSpec, ForeignKey, Index, ReferentialAction};

    fn order_model() -> Model {
        Model::define(
            "orders",
            vec![
                (
                    "id",
                    FieldSpec::from(
                        FieldOptions::new(FieldType::Int)
                            .primary_key()
                            .auto_increment(),
                    ),
                ),
                (
                    "user_id",
                    FieldSpec::from(FieldOptions::new(FieldType::Int).required()),
                ),
                (
                    "status",
                    FieldSpec::from(
                        FieldOptions::new(FieldType::String).default_value("pending"),
                    ),
                ),
                ("payload", FieldSpec::from(FieldType::Json)),
            ],
            vec![ForeignKey::new("user_id", "users", "id").on_delete(ReferentialAction::Cascade)],
            vec![Index::on(vec!["user_id"]), Index::on(vec!["status"]).unique()],
        )
        .unwrap()
    }

    #[test]
    fn create_table_sql_follows_field_insertion_order() {
        let sql = create_table_sql(&order_model());
        assert_eq!(
            sql,
            "CREATE TABLE \"orders\" (\n  \
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,\n  \
             \"user_id\" INTEGER NOT NULL,\n  \
             \"status\" TEXT DEFAULT 'pending',\n  \
             \"payload\" TEXT,\n  \
             FOREIGN KEY (\"user_id\") REFERENCES \"users\"(\"id\") ON DELETE CASCADE\n)"
        );
    }

    #[test]
    fn index_sql_uses_derived_names_and_unique_keyword() {
        let model = order_model();
        assert_eq!(
            create_index_sql(&model, &model.indexes[0]),
            "CREATE INDEX \"idx_orders_user_id\" ON \"orders\" (\"user_id\")"
        );
        assert_eq!(
            create_index_sql(&model, &model.indexes[1]),
            "CREATE UNIQUE INDEX \"idx_orders_status\" ON \"orders\" (\"status\")"
        );
    }

    #[test]
    fn default_literals_are_escaped() {
        assert_eq!(format_default(&Value::Text("it's".into())), "'it''s'");
        assert_eq!(format_default(&Value::Bool(true)), "TRUE");
        assert_eq!(format_default(&Value::Int(3)), "3");
        assert_eq!(format_default(&Value::Null), "NULL");
    }
}
