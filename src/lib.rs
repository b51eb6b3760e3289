//! # lightorm
//!
//! A lightweight, schema-first object-relational mapping layer. Callers
//! declare table schemas in code, and the crate provides a generic CRUD
//! repository per declared model, a transactional migration runner, and a
//! schema synchronizer that turns missing tables into `CREATE TABLE` /
//! `CREATE INDEX` DDL.
//!
//! ## Architectural Principles
//!
//! - **Explicit context:** There is no ambient global state. A [`Database`]
//!   value (pool + model registry + production flag) is threaded into every
//!   component, so test-isolated and multi-tenant instances come for free.
//! - **Identifiers from metadata only:** Generated SQL interpolates table and
//!   column names exclusively from registered model metadata; caller-supplied
//!   values always travel as bound parameters.
//! - **Asynchronous & Pooled:** All operations are asynchronous over a shared
//!   `sqlx` connection pool; migrations and multi-statement writes run inside
//!   driver transactions with all-or-nothing semantics.
//!
//! ## Public API
//!
//! - `connect` / `connect_with`: establish the connection pool.
//! - `Database`: the explicit context object; registers models and hands out
//!   repositories.
//! - `Model`, `FieldType`, `FieldOptions`, `ForeignKey`, `Index`: schema
//!   declaration.
//! - `Repository`: the generic per-model CRUD engine.
//! - `Migrator`, `Migration`, `MigrationSet`, `DirectorySource`: the ordered,
//!   ledger-tracked migration runner and its pluggable unit sources.
//! - `SchemaSync`: DDL generation for missing tables, applied directly (dev
//!   only) or emitted as a migration unit.
//! - `Error`: the specific error types returned from this crate.

// Declare the modules that constitute this crate.
pub mod db;
pub mod error;
pub mod executor;
pub mod ids;
pub mod migration;
pub mod repository;
pub mod schema;
pub mod sync;
pub mod value;

// Re-export the key components to create a clean, public-facing API.
pub use db::{connect, connect_with, Database};
pub use error::Error;
pub use executor::WriteResult;
pub use ids::{new_uuid, next_prefixed_id};
pub use migration::{
    DirectorySource, Migration, MigrationContext, MigrationSet, MigrationSource, Migrator,
    SqlMigration, LEDGER_TABLE,
};
pub use repository::Repository;
pub use schema::{
    Field, FieldOptions, FieldSpec, FieldType, ForeignKey, Index, Model, ReferentialAction,
};
pub use sync::SchemaSync;
pub use value::{normalize, Row, Value, DATETIME_FORMAT};
