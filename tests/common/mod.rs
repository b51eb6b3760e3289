// Not every test binary uses every helper.
#![allow(dead_code)]

use lightorm::{Database, FieldOptions, FieldSpec, FieldType, Model, Row, SchemaSync, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Builds a row literal from name/value pairs.
pub fn row<V: Into<Value>>(pairs: Vec<(&str, V)>) -> Row {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.into()))
        .collect()
}

/// A single-connection in-memory pool. One connection keeps every test
/// statement on the same in-memory database.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool")
}

pub fn user_model() -> Model {
    Model::define(
        "users",
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
                "email",
                FieldSpec::from(FieldOptions::new(FieldType::String).required().unique()),
            ),
            ("created_at", FieldSpec::from(FieldType::DateTime)),
            ("profile", FieldSpec::from(FieldType::Json)),
            ("active", FieldSpec::from(FieldType::Boolean)),
        ],
        vec![],
        vec![],
    )
    .expect("valid user model")
}

/// A model with a caller-supplied (natural) key, for upsert coverage.
pub fn setting_model() -> Model {
    Model::define(
        "settings",
        vec![
            (
                "key",
                FieldSpec::from(FieldOptions::new(FieldType::String).primary_key()),
            ),
            ("value", FieldSpec::from(FieldType::String)),
            ("revision", FieldSpec::from(FieldType::Int)),
        ],
        vec![],
        vec![],
    )
    .expect("valid setting model")
}

/// Registers the given models and creates their tables through the
/// synchronizer, returning the ready-to-use context.
pub async fn database_with(models: Vec<Model>) -> Database {
    let db = Database::new(memory_pool().await).with_production(false);
    for model in models {
        db.register(model).expect("register model");
    }
    let sync = SchemaSync::new(&db);
    let plan = sync.plan().await.expect("schema plan");
    sync.apply(&plan).await.expect("schema apply");
    db
}
