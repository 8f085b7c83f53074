//! SQLite database manager and row helpers.

use crate::config::DbConfig;
use crate::error::DbError;
use crate::schema::{ModelRegistry, TableDef};
use crate::sql::{self, QueryBuf, SqliteBindValue};
use crate::sync::{compare_to_latest, plan_sync, DatabaseStatus, SyncAction, SyncResult};
use serde_json::Value;
use sqlx::migrate::{MigrationType, Migrator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;

const MIGRATIONS_TABLE: &str = "_sqlx_migrations";

// Bookkeeping table as the migration runner itself creates it.
const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _sqlx_migrations (
    version BIGINT PRIMARY KEY,
    description TEXT NOT NULL,
    installed_on TIMESTAMP NOT NULL DEFAULT current_timestamp,
    success BOOLEAN NOT NULL,
    checksum BLOB NOT NULL,
    execution_time BIGINT NOT NULL
)
"#;

/// Owns the connection pool, the migration scripts, and the registered
/// tables; decides between creating, stamping, and upgrading the schema.
pub struct DatabaseManager {
    pool: SqlitePool,
    migrator: Migrator,
    registry: ModelRegistry,
}

impl DatabaseManager {
    /// Open (or create) the database addressed by the config URL and load
    /// the migration scripts. Foreign keys are always enforced.
    pub async fn connect(config: &DbConfig, registry: ModelRegistry) -> Result<Self, DbError> {
        let migrations = config.migrations_dir()?.to_path_buf();
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Config(format!("invalid database URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if let Some(timeout) = config.acquire_timeout() {
            pool_options = pool_options.acquire_timeout(timeout);
        }
        let pool = pool_options.connect_with(options).await?;
        let migrator = Migrator::new(migrations).await?;
        Ok(DatabaseManager {
            pool,
            migrator,
            registry,
        })
    }

    /// Wrap an existing pool and migrator.
    pub fn new(pool: SqlitePool, migrator: Migrator, registry: ModelRegistry) -> Self {
        DatabaseManager {
            pool,
            migrator,
            registry,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The revision recorded in the bookkeeping table, or `None` when the
    /// table does not exist or is empty. A missing table is a normal state,
    /// not an error; connection failures still propagate.
    pub async fn current_revision(&self) -> Result<Option<i64>, DbError> {
        if !self.table_exists(MIGRATIONS_TABLE).await? {
            return Ok(None);
        }
        let version = sqlx::query_scalar::<_, i64>(
            "SELECT version FROM _sqlx_migrations WHERE success ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    /// The newest revision in the script directory, or `None` when it holds
    /// no migrations.
    pub fn latest_revision(&self) -> Option<i64> {
        self.migrator
            .iter()
            .filter(|m| !matches!(m.migration_type, MigrationType::ReversibleDown))
            .map(|m| m.version)
            .max()
    }

    pub async fn get_status(&self) -> Result<DatabaseStatus, DbError> {
        Ok(compare_to_latest(
            self.current_revision().await?,
            self.latest_revision(),
        ))
    }

    /// Create the registered tables and stamp every revision as applied,
    /// in one transaction.
    pub async fn create(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for table in self.registry.tables() {
            tracing::debug!(table = table.name(), "create table");
            sqlx::query(&table.create_sql()).execute(&mut *tx).await?;
            for index in table.index_sql() {
                sqlx::query(&index).execute(&mut *tx).await?;
            }
        }
        record_revisions(&mut tx, &self.migrator).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record every revision in the bookkeeping table without running any
    /// migration.
    pub async fn stamp(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        record_revisions(&mut tx, &self.migrator).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Apply pending migrations. Failures surface unchanged; retries are the
    /// caller's business.
    pub async fn upgrade(&self) -> Result<(), DbError> {
        self.migrator.run(&self.pool).await?;
        Ok(())
    }

    /// Bring the schema up to date, creating it if needed.
    pub async fn sync(&self) -> Result<SyncResult, DbError> {
        let current = self.current_revision().await?;
        let head = self.latest_revision();
        let tables_exist = self.has_app_tables().await?;
        match plan_sync(current, head, tables_exist) {
            SyncAction::CreateAndStamp => {
                self.create().await?;
                tracing::info!("database created");
                Ok(SyncResult::Created)
            }
            SyncAction::StampOnly => {
                tracing::warn!(
                    "tables exist without migration bookkeeping; stamping head without \
                     emitting DDL. The existing schema is assumed, not verified, to match \
                     the registered tables"
                );
                self.stamp().await?;
                Ok(SyncResult::Created)
            }
            SyncAction::Upgrade => {
                self.upgrade().await?;
                tracing::info!("database upgraded");
                Ok(SyncResult::Upgraded)
            }
            SyncAction::Nothing => Ok(SyncResult::AlreadyUpToDate),
        }
    }

    /// Drop the registered tables (reverse registration order) and the
    /// bookkeeping table.
    pub async fn drop_all(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for table in self.registry.tables().iter().rev() {
            sqlx::query(&table.drop_sql()).execute(&mut *tx).await?;
        }
        sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pragma_table_info($1) WHERE name = $2",
        )
        .bind(table)
        .bind(column)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Whether any table beyond the bookkeeping table exists.
    pub async fn has_app_tables(&self) -> Result<bool, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name <> $1 AND name NOT LIKE 'sqlite_%'",
        )
        .bind(MIGRATIONS_TABLE)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

async fn record_revisions(conn: &mut SqliteConnection, migrator: &Migrator) -> Result<(), DbError> {
    sqlx::query(CREATE_MIGRATIONS_TABLE).execute(&mut *conn).await?;
    for m in migrator
        .iter()
        .filter(|m| !matches!(m.migration_type, MigrationType::ReversibleDown))
    {
        tracing::debug!(version = m.version, "stamp revision");
        sqlx::query(
            "INSERT OR IGNORE INTO _sqlx_migrations \
             (version, description, success, checksum, execution_time) \
             VALUES ($1, $2, TRUE, $3, 0)",
        )
        .bind(m.version)
        .bind(&*m.description)
        .bind(&*m.checksum)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// Row helpers

/// Get exactly one row matching the lookup fields.
pub async fn get_one(
    pool: &SqlitePool,
    table: &TableDef,
    lookup: &[(&str, Value)],
) -> Result<Value, DbError> {
    find_one(pool, table, lookup)
        .await?
        .ok_or_else(|| DbError::NotFound(lookup_desc(table, lookup)))
}

/// Get a row by its primary key.
pub async fn get_by_pk(
    pool: &SqlitePool,
    table: &TableDef,
    pk: &Value,
) -> Result<Option<Value>, DbError> {
    let q = sql::select_by_pk(table, pk)?;
    fetch_optional(pool, &q).await
}

/// Get the row matching the lookup fields, or insert it. Returns the row and
/// whether it was created. A concurrent creator winning the race is resolved
/// by re-reading once; uniqueness is enforced by the database, not by locks.
pub async fn get_or_create(
    pool: &SqlitePool,
    table: &TableDef,
    lookup: &[(&str, Value)],
    defaults: &[(&str, Value)],
) -> Result<(Value, bool), DbError> {
    if let Some(row) = find_one(pool, table, lookup).await? {
        return Ok((row, false));
    }
    insert_or_recover(pool, table, lookup, defaults).await
}

/// Like [`get_or_create`], but when the row already exists the `defaults`
/// are applied to it before returning.
pub async fn update_or_create(
    pool: &SqlitePool,
    table: &TableDef,
    lookup: &[(&str, Value)],
    defaults: &[(&str, Value)],
) -> Result<(Value, bool), DbError> {
    if let Some(row) = find_one(pool, table, lookup).await? {
        let updated = apply_updates(pool, table, row, defaults).await?;
        return Ok((updated, false));
    }
    let (row, created) = insert_or_recover(pool, table, lookup, defaults).await?;
    if created {
        Ok((row, true))
    } else {
        // Lost the race: the winner's row gets the updates.
        let updated = apply_updates(pool, table, row, defaults).await?;
        Ok((updated, false))
    }
}

/// Get a row by primary key, or fail with a not-found error (HTTP 404 at the
/// web boundary).
pub async fn get_or_404(
    pool: &SqlitePool,
    table: &TableDef,
    pk: &Value,
    description: Option<&str>,
) -> Result<Value, DbError> {
    get_by_pk(pool, table, pk).await?.ok_or_else(|| {
        DbError::NotFound(
            description
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} {}", table.name(), pk)),
        )
    })
}

/// Get the first row matching the lookup fields, or fail with a not-found
/// error. Unlike [`get_one`], extra matches are not an error.
pub async fn first_or_404(
    pool: &SqlitePool,
    table: &TableDef,
    lookup: &[(&str, Value)],
    description: Option<&str>,
) -> Result<Value, DbError> {
    let q = sql::select_one(table, lookup)?;
    let rows = fetch_all(pool, &q).await?;
    rows.into_iter().next().ok_or_else(|| {
        DbError::NotFound(
            description
                .map(str::to_string)
                .unwrap_or_else(|| lookup_desc(table, lookup)),
        )
    })
}

async fn find_one(
    pool: &SqlitePool,
    table: &TableDef,
    lookup: &[(&str, Value)],
) -> Result<Option<Value>, DbError> {
    let q = sql::select_one(table, lookup)?;
    let mut rows = fetch_all(pool, &q).await?;
    if rows.len() > 1 {
        return Err(DbError::MultipleRows(lookup_desc(table, lookup)));
    }
    Ok(rows.pop())
}

async fn insert_or_recover(
    pool: &SqlitePool,
    table: &TableDef,
    lookup: &[(&str, Value)],
    defaults: &[(&str, Value)],
) -> Result<(Value, bool), DbError> {
    let mut values: Vec<(&str, Value)> = lookup.to_vec();
    for (col, v) in defaults {
        if !lookup.iter().any(|(c, _)| c == col) {
            values.push((col, v.clone()));
        }
    }
    let q = sql::insert(table, &values)?;
    match fetch_optional(pool, &q).await {
        Ok(Some(row)) => Ok((row, true)),
        Ok(None) => Err(DbError::Db(sqlx::Error::RowNotFound)),
        Err(DbError::Db(e)) if is_unique_violation(&e) => {
            tracing::debug!(table = table.name(), "insert lost a concurrent race, re-reading");
            match find_one(pool, table, lookup).await? {
                Some(row) => Ok((row, false)),
                None => Err(DbError::Integrity(format!(
                    "unique constraint violated inserting into {} and no row matches the lookup",
                    table.name()
                ))),
            }
        }
        Err(e) => Err(e),
    }
}

async fn apply_updates(
    pool: &SqlitePool,
    table: &TableDef,
    row: Value,
    updates: &[(&str, Value)],
) -> Result<Value, DbError> {
    if updates.is_empty() {
        return Ok(row);
    }
    let pk_col = table.single_pk()?;
    let pk = row
        .get(pk_col)
        .cloned()
        .ok_or_else(|| DbError::Validation(format!("row in {} has no {} value", table.name(), pk_col)))?;
    let q = sql::update_by_pk(table, &pk, updates)?;
    fetch_optional(pool, &q)
        .await?
        .ok_or(DbError::Db(sqlx::Error::RowNotFound))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn lookup_desc(table: &TableDef, lookup: &[(&str, Value)]) -> String {
    let fields: Vec<String> = lookup
        .iter()
        .map(|(col, value)| format!("{}={}", col, value))
        .collect();
    format!("{} [{}]", table.name(), fields.join(", "))
}

async fn fetch_all(pool: &SqlitePool, q: &QueryBuf) -> Result<Vec<Value>, DbError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(SqliteBindValue::from_json(p));
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn fetch_optional(pool: &SqlitePool, q: &QueryBuf) -> Result<Option<Value>, DbError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(SqliteBindValue::from_json(p));
    }
    let row = query.fetch_optional(pool).await?;
    Ok(row.map(|r| row_to_json(&r)))
}

fn row_to_json(row: &SqliteRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &SqliteRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
        if let Some(n) = v {
            return Value::Number(n.into());
        }
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = v {
            if let Some(n) = serde_json::Number::from_f64(n) {
                return Value::Number(n);
            }
        }
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(name) {
        if let Some(s) = v {
            return Value::String(s);
        }
    }
    Value::Null
}
