use crate::error::Error;
use crate::repository::Repository;
use crate::schema::Model;
use dotenvy::dotenv;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Establishes a connection pool using the `DATABASE_URL` environment
/// variable (loaded from a `.env` file when one is present).
///
/// The pool is the process-wide shared resource every component borrows
/// connections from; create it once and share it.
pub async fn connect() -> Result<SqlitePool, Error> {
    // A missing .env file is fine; the variable may come from the real environment.
    dotenv().ok();

    let database_url = env::var("DATABASE_URL")
        .map_err(|_e| Error::ConnectionConfig("DATABASE_URL must be set.".to_string()))?;

    connect_with(&database_url).await
}

/// Establishes a connection pool against an explicit database URL.
pub async fn connect_with(database_url: &str) -> Result<SqlitePool, Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::debug!(url = %database_url, "database pool established");
    Ok(pool)
}

/// The explicit database context: connection pool, model registry and the
/// production flag. Threaded into repositories, the migrator and the schema
/// synchronizer instead of ambient module-level state, so test-isolated or
/// multi-tenant instances stay possible.
///
/// The registry is append-only; registered models are immutable, so concurrent
/// reads never race on schema metadata.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    registry: Arc<RwLock<BTreeMap<String, Arc<Model>>>>,
    production: bool,
}

impl Database {
    /// Wraps an existing pool. The production flag defaults from the
    /// `APP_ENV` environment variable.
    pub fn new(pool: SqlitePool) -> Self {
        let production = env::var("APP_ENV")
            .map(|v| v == "production")
            .unwrap_or(false);
        Self {
            pool,
            registry: Arc::new(RwLock::new(BTreeMap::new())),
            production,
        }
    }

    /// Overrides the environment-derived production flag.
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Registers a model under its table name. Registration is append-only;
    /// a second model with the same name is rejected with `InvalidSchema`.
    pub fn register(&self, model: Model) -> Result<Arc<Model>, Error> {
        let mut registry = self.registry.write().expect("model registry lock poisoned");
        if registry.contains_key(&model.name) {
            return Err(Error::InvalidSchema(format!(
                "a model named `{}` is already registered",
                model.name
            )));
        }
        let model = Arc::new(model);
        registry.insert(model.name.clone(), Arc::clone(&model));
        Ok(model)
    }

    /// Looks up a registered model by table name.
    pub fn model(&self, name: &str) -> Option<Arc<Model>> {
        let registry = self.registry.read().expect("model registry lock poisoned");
        registry.get(name).cloned()
    }

    /// All registered models, ordered by table name.
    pub fn models(&self) -> Vec<Arc<Model>> {
        let registry = self.registry.read().expect("model registry lock poisoned");
        registry.values().cloned().collect()
    }

    /// Builds a repository over a registered model.
    pub fn repository(&self, name: &str) -> Result<Repository, Error> {
        let model = self.model(name).ok_or_else(|| {
            Error::InvalidSchema(format!("no registered model named `{name}`"))
        })?;
        Repository::new(model, self.pool.clone())
    }
}
