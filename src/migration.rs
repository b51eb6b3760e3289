use crate::error::Error;
use crate::executor::{self, WriteResult};
use crate::value::{Row, Value};
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{SqliteConnection, Transaction};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The ledger table tracking which migrations have been applied.
pub const LEDGER_TABLE: &str = "_migrations";

/// The execution context handed to a migration's `up`/`down` step. Both
/// methods run against the connection of the enclosing transaction, so every
/// statement a migration issues commits or rolls back together with its
/// ledger row.
pub struct MigrationContext<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> MigrationContext<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Runs a parameterized write statement inside the migration transaction.
    pub async fn exec(&mut self, sql: &str, params: &[Value]) -> Result<WriteResult, Error> {
        executor::execute(&mut *self.conn, sql, params).await
    }

    /// Runs a parameterized query inside the migration transaction.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        executor::query(&mut *self.conn, sql, params).await
    }
}

/// One migration unit.
///
/// `id` must be lexically sortable — the runner orders units by plain string
/// comparison, so use a scheme like zero-padded timestamps. `down` exists for
/// manual/administrative invocation only; the runner never calls it.
#[async_trait]
pub trait Migration: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), Error>;

    async fn down(&self, _ctx: &mut MigrationContext<'_>) -> Result<(), Error> {
        Err(Error::InvalidMigration(format!(
            "migration `{}` has no down step",
            self.id()
        )))
    }
}

/// A migration unit defined as ordered lists of SQL statements. This is the
/// form the schema synchronizer emits and [`DirectorySource`] loads.
pub struct SqlMigration {
    id: String,
    name: String,
    up_statements: Vec<String>,
    down_statements: Vec<String>,
}

impl SqlMigration {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        up_statements: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            up_statements,
            down_statements: Vec::new(),
        }
    }

    pub fn with_down(mut self, down_statements: Vec<String>) -> Self {
        self.down_statements = down_statements;
        self
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), Error> {
        for statement in &self.up_statements {
            ctx.exec(statement, &[]).await?;
        }
        Ok(())
    }

    async fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<(), Error> {
        if self.down_statements.is_empty() {
            return Err(Error::InvalidMigration(format!(
                "migration `{}` has no down step",
                self.id
            )));
        }
        for statement in &self.down_statements {
            ctx.exec(statement, &[]).await?;
        }
        Ok(())
    }
}

/// Where migration units come from.
///
/// The runner only needs an ordered list of unit descriptors, so the discovery
/// mechanism — a directory scan, in-code registration, an embedded table — is
/// swappable without touching the ordering/ledger logic.
pub trait MigrationSource: Send + Sync {
    fn migrations(&self) -> Result<Vec<Arc<dyn Migration>>, Error>;
}

/// In-code registration of migration units.
#[derive(Default)]
pub struct MigrationSet {
    units: Vec<Arc<dyn Migration>>,
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, migration: impl Migration + 'static) -> &mut Self {
        self.units.push(Arc::new(migration));
        self
    }
}

impl MigrationSource for MigrationSet {
    fn migrations(&self) -> Result<Vec<Arc<dyn Migration>>, Error> {
        Ok(self.units.clone())
    }
}

/// Discovers `<id>_<name>.sql` migration files in a directory.
///
/// Statements inside a file are separated by `;` outside quoted literals and
/// identifiers. A file whose name does not carry an id, or that contains no
/// statements, fails with `InvalidMigration`.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn parse_file(path: &Path) -> Result<SqlMigration, Error> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let (id, name) = stem.split_once('_').ok_or_else(|| {
            Error::InvalidMigration(format!(
                "migration file `{}` is not named `<id>_<name>.sql`",
                path.display()
            ))
        })?;
        if id.is_empty() {
            return Err(Error::InvalidMigration(format!(
                "migration file `{}` has an empty id",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let statements = split_statements(&contents);
        if statements.is_empty() {
            return Err(Error::InvalidMigration(format!(
                "migration file `{}` contains no statements",
                path.display()
            )));
        }

        Ok(SqlMigration::new(id, name, statements))
    }
}

/// Splits file contents into statements at semicolons, ignoring semicolons
/// inside `'...'` literals and `"..."` identifiers. SQL escapes a quote inside
/// a literal by doubling it, which this scan handles naturally: each quote
/// character toggles the quoted state, so `'a''b'` ends outside the literal.
fn split_statements(contents: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in contents.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                ';' => {
                    let statement = current.trim();
                    if !statement.is_empty() {
                        statements.push(statement.to_string());
                    }
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}

impl MigrationSource for DirectorySource {
    fn migrations(&self) -> Result<Vec<Arc<dyn Migration>>, Error> {
        // A migrations directory that does not exist yet simply has no units.
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("sql"))
            .collect();
        paths.sort();

        let mut units: Vec<Arc<dyn Migration>> = Vec::with_capacity(paths.len());
        for path in &paths {
            units.push(Arc::new(Self::parse_file(path)?));
        }
        Ok(units)
    }
}

/// Applies pending migrations in order, each inside its own transaction.
///
/// A migration id has exactly two states: pending (absent from the ledger) or
/// applied (present). A failed `up` rolls its transaction back entirely,
/// leaving the id pending and safe to retry on the next run.
///
/// There is no cross-process lock: two processes racing through `run` will
/// both see the same pending set, and the loser's ledger insert violates the
/// primary key, rolling its transaction back. That is safe but surfaces as a
/// raw `Storage` error rather than a clean "already applied" outcome.
pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotently creates the migration ledger table.
    pub async fn ensure_ledger(&self) -> Result<(), Error> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (\
             id TEXT PRIMARY KEY, \
             name TEXT NOT NULL, \
             executed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)"
        );
        executor::execute(&self.pool, &sql, &[]).await?;
        Ok(())
    }

    /// Collects units from the source, validates them, and returns them
    /// sorted by id using lexical string ordering.
    pub fn load(&self, source: &dyn MigrationSource) -> Result<Vec<Arc<dyn Migration>>, Error> {
        let mut units = source.migrations()?;
        let mut seen = BTreeSet::new();
        for unit in &units {
            if unit.id().is_empty() {
                return Err(Error::InvalidMigration(format!(
                    "migration `{}` has an empty id",
                    unit.name()
                )));
            }
            if !seen.insert(unit.id().to_string()) {
                return Err(Error::InvalidMigration(format!(
                    "duplicate migration id `{}`",
                    unit.id()
                )));
            }
        }
        units.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(units)
    }

    /// The set of migration ids recorded in the ledger.
    pub async fn applied_ids(&self) -> Result<BTreeSet<String>, Error> {
        let sql = format!("SELECT id FROM {LEDGER_TABLE}");
        let rows = executor::query(&self.pool, &sql, &[]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.get("id") {
                Some(Value::Text(id)) => Some(id.clone()),
                _ => None,
            })
            .collect())
    }

    /// Ensures the ledger, then applies every pending unit in sorted order.
    ///
    /// Each unit's `up` and its ledger row `(id, name)` commit in one
    /// transaction. On the first failure the transaction rolls back and the
    /// loop stops — later migrations are not attempted until the failure is
    /// fixed and `run` is invoked again. Returns how many units were applied.
    pub async fn run(&self, source: &dyn MigrationSource) -> Result<usize, Error> {
        self.ensure_ledger().await?;
        let units = self.load(source)?;
        let applied = self.applied_ids().await?;

        let mut count = 0;
        for unit in &units {
            if applied.contains(unit.id()) {
                continue;
            }
            let mut tx = self.pool.begin().await?;
            match Self::apply_one(&mut tx, unit.as_ref()).await {
                Ok(()) => {
                    tx.commit().await?;
                    tracing::info!(id = unit.id(), name = unit.name(), "migration applied");
                    count += 1;
                }
                Err(err) => {
                    tracing::error!(
                        id = unit.id(),
                        error = %err,
                        "migration failed; transaction rolled back"
                    );
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::error!(error = %rollback_err, "rollback itself failed");
                    }
                    return Err(err);
                }
            }
        }
        Ok(count)
    }

    /// Administrative rollback of one unit: runs its `down` step and removes
    /// the ledger row in a single transaction.
    ///
    /// This is a manual tool, not a rollback driver — nothing orders or
    /// chains `down` steps automatically.
    pub async fn revert(&self, unit: &dyn Migration) -> Result<(), Error> {
        self.ensure_ledger().await?;
        let mut tx = self.pool.begin().await?;
        match Self::revert_one(&mut tx, unit).await {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(id = unit.id(), name = unit.name(), "migration reverted");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback itself failed");
                }
                Err(err)
            }
        }
    }

    async fn revert_one(
        tx: &mut Transaction<'_, Sqlite>,
        unit: &dyn Migration,
    ) -> Result<(), Error> {
        {
            let mut ctx = MigrationContext::new(&mut **tx);
            unit.down(&mut ctx).await?;
        }
        let sql = format!("DELETE FROM {LEDGER_TABLE} WHERE id = ?");
        executor::execute(&mut **tx, &sql, &[Value::Text(unit.id().to_string())]).await?;
        Ok(())
    }

    async fn apply_one(
        tx: &mut Transaction<'_, Sqlite>,
        unit: &dyn Migration,
    ) -> Result<(), Error> {
        {
            let mut ctx = MigrationContext::new(&mut **tx);
            unit.up(&mut ctx).await?;
        }
        let sql = format!("INSERT INTO {LEDGER_TABLE} (id, name) VALUES (?, ?)");
        executor::execute(
            &mut **tx,
            &sql,
            &[
                Value::Text(unit.id().to_string()),
                Value::Text(unit.name().to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::split_statements;

    #[test]
    fn splits_on_semicolons_between_statements() {
        let statements = split_statements("CREATE TABLE a (x INT);\n\nCREATE TABLE b (y INT);\n");
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (x INT)", "CREATE TABLE b (y INT)"]
        );
    }

    #[test]
    fn keeps_semicolons_inside_quoted_literals() {
        let statements = split_statements(
            "CREATE TABLE t (tag TEXT DEFAULT 'a;b');\nINSERT INTO t (tag) VALUES ('x;y');",
        );
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE t (tag TEXT DEFAULT 'a;b')");
        assert_eq!(statements[1], "INSERT INTO t (tag) VALUES ('x;y')");
    }

    #[test]
    fn handles_doubled_quotes_and_quoted_identifiers() {
        let statements =
            split_statements("INSERT INTO \"odd;name\" (v) VALUES ('it''s; fine'); SELECT 1");
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "INSERT INTO \"odd;name\" (v) VALUES ('it''s; fine')"
        );
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn drops_blank_segments() {
        assert!(split_statements("  \n;\n ;").is_empty());
    }
}
