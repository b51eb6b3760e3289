use thiserror::Error;

/// All failure modes surfaced by this crate.
///
/// Storage failures (`Storage`) carry the underlying driver error unmodified;
/// nothing in this crate retries or downgrades them. Everything else is a
/// structural problem detected before any SQL is sent.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load environment variables for database connection: {0}")]
    ConnectionConfig(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("model `{0}` has no primary key field")]
    MissingPrimaryKey(String),

    #[error("no insertable columns in write against `{0}`")]
    EmptyWrite(String),

    #[error("{operation} on `{table}` requires a non-empty filter")]
    MissingFilter {
        operation: &'static str,
        table: String,
    },

    #[error("upsert on `{table}` is not supported: {reason}")]
    UnsupportedUpsert { table: String, reason: String },

    #[error("`{table}` has no column named `{column}`")]
    UnknownColumn { table: String, column: String },

    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    #[error("schema changes cannot be applied directly in a production environment")]
    ForbiddenInProduction,

    #[error("the requested row was not found")]
    NotFound,

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("an error occurred during JSON serialization/deserialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("migration file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
