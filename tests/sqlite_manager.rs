//! End-to-end schema synchronization against file-backed SQLite databases.

use sqlx_helpers::sqlite::DatabaseManager;
use sqlx_helpers::{ColumnDef, DatabaseStatus, DbConfig, ModelRegistry, SyncResult, TableDef};
use std::str::FromStr;
use tempfile::TempDir;

const CREATE_USERS: &str = "CREATE TABLE users (\n\
    id INTEGER NOT NULL,\n\
    name TEXT NOT NULL,\n\
    CONSTRAINT pk_users PRIMARY KEY (id),\n\
    CONSTRAINT uq_users_name UNIQUE (name)\n\
);\n";

const ADD_FULL_NAME: &str = "ALTER TABLE users ADD COLUMN full_name TEXT;\n";

fn db_url(dir: &TempDir) -> String {
    format!("sqlite:{}", dir.path().join("app.db").display())
}

fn users_v1() -> TableDef {
    TableDef::new("users")
        .column(ColumnDef::new("id", "INTEGER"))
        .column(ColumnDef::new("name", "TEXT"))
        .primary_key(&["id"])
        .unique(&["name"])
}

fn users_v2() -> TableDef {
    TableDef::new("users")
        .column(ColumnDef::new("id", "INTEGER"))
        .column(ColumnDef::new("name", "TEXT"))
        .column(ColumnDef::new("full_name", "TEXT").nullable())
        .primary_key(&["id"])
        .unique(&["name"])
}

async fn manager_with(
    dir: &TempDir,
    scripts: &str,
    migrations: &[(&str, &str)],
    registry: ModelRegistry,
) -> DatabaseManager {
    let scripts_dir = dir.path().join(scripts);
    std::fs::create_dir_all(&scripts_dir).unwrap();
    for (name, sql) in migrations {
        std::fs::write(scripts_dir.join(name), sql).unwrap();
    }
    let config = DbConfig::new(&db_url(dir), scripts_dir);
    DatabaseManager::connect(&config, registry).await.unwrap()
}

#[tokio::test]
async fn sync_creates_then_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let manager = manager_with(
        &dir,
        "migrations",
        &[
            ("0001_create_users.sql", CREATE_USERS),
            ("0002_add_full_name.sql", ADD_FULL_NAME),
        ],
        ModelRegistry::new().with(users_v2()),
    )
    .await;

    assert_eq!(manager.get_status().await.unwrap(), DatabaseStatus::NoInfo);
    assert_eq!(manager.current_revision().await.unwrap(), None);
    assert_eq!(manager.latest_revision(), Some(2));

    assert_eq!(manager.sync().await.unwrap(), SyncResult::Created);
    assert_eq!(manager.current_revision().await.unwrap(), Some(2));
    assert!(manager.table_exists("users").await.unwrap());
    assert_eq!(manager.get_status().await.unwrap(), DatabaseStatus::UpToDate);

    assert_eq!(manager.sync().await.unwrap(), SyncResult::AlreadyUpToDate);
}

#[tokio::test]
async fn sync_upgrades_a_database_behind_head() {
    let dir = TempDir::new().unwrap();
    let v1 = manager_with(
        &dir,
        "scripts_v1",
        &[("0001_create_users.sql", CREATE_USERS)],
        ModelRegistry::new().with(users_v1()),
    )
    .await;
    assert_eq!(v1.sync().await.unwrap(), SyncResult::Created);
    assert_eq!(v1.current_revision().await.unwrap(), Some(1));
    assert!(!v1.column_exists("users", "full_name").await.unwrap());
    v1.pool().close().await;

    let v2 = manager_with(
        &dir,
        "scripts_v2",
        &[
            ("0001_create_users.sql", CREATE_USERS),
            ("0002_add_full_name.sql", ADD_FULL_NAME),
        ],
        ModelRegistry::new().with(users_v2()),
    )
    .await;
    assert_eq!(
        v2.get_status().await.unwrap(),
        DatabaseStatus::UpgradeAvailable
    );
    assert_eq!(v2.sync().await.unwrap(), SyncResult::Upgraded);
    assert_eq!(v2.current_revision().await.unwrap(), Some(2));
    assert!(v2.column_exists("users", "full_name").await.unwrap());
    assert_eq!(v2.get_status().await.unwrap(), DatabaseStatus::UpToDate);
}

#[tokio::test]
async fn sync_stamps_a_legacy_schema_without_touching_data() {
    let dir = TempDir::new().unwrap();

    // A database created out-of-band, with data and no bookkeeping.
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&db_url(&dir))
        .unwrap()
        .create_if_missing(true);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::query(CREATE_USERS).execute(&pool).await.unwrap();
    sqlx::query("INSERT INTO users (name) VALUES ('legacy')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let manager = manager_with(
        &dir,
        "migrations",
        &[
            ("0001_create_users.sql", CREATE_USERS),
            ("0002_add_full_name.sql", ADD_FULL_NAME),
        ],
        ModelRegistry::new().with(users_v2()),
    )
    .await;

    assert_eq!(manager.sync().await.unwrap(), SyncResult::Created);
    assert_eq!(manager.current_revision().await.unwrap(), Some(2));

    // Stamping emitted no DDL: the legacy table kept its old shape and rows.
    assert!(!manager.column_exists("users", "full_name").await.unwrap());
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(manager.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn drop_all_removes_tables_and_bookkeeping() {
    let dir = TempDir::new().unwrap();
    let manager = manager_with(
        &dir,
        "migrations",
        &[("0001_create_users.sql", CREATE_USERS)],
        ModelRegistry::new().with(users_v1()),
    )
    .await;
    assert_eq!(manager.sync().await.unwrap(), SyncResult::Created);

    manager.drop_all().await.unwrap();
    assert!(!manager.table_exists("users").await.unwrap());
    assert_eq!(manager.current_revision().await.unwrap(), None);
    assert_eq!(manager.get_status().await.unwrap(), DatabaseStatus::NoInfo);
}

#[tokio::test]
async fn exists_checks() {
    let dir = TempDir::new().unwrap();
    let manager = manager_with(
        &dir,
        "migrations",
        &[("0001_create_users.sql", CREATE_USERS)],
        ModelRegistry::new().with(users_v1()),
    )
    .await;
    manager.sync().await.unwrap();

    assert!(manager.table_exists("users").await.unwrap());
    assert!(!manager.table_exists("foobar").await.unwrap());
    assert!(manager.column_exists("users", "id").await.unwrap());
    assert!(!manager.column_exists("users", "foobar").await.unwrap());
    assert!(manager.has_app_tables().await.unwrap());
}

#[tokio::test]
async fn sync_without_migration_scripts_creates_from_registry() {
    let dir = TempDir::new().unwrap();
    let manager = manager_with(&dir, "migrations", &[], ModelRegistry::new().with(users_v2())).await;

    assert_eq!(manager.latest_revision(), None);
    assert_eq!(manager.sync().await.unwrap(), SyncResult::Created);
    assert!(manager.table_exists("users").await.unwrap());
    assert_eq!(manager.current_revision().await.unwrap(), None);

    // With no revisions to record, every sync reports creation.
    assert_eq!(manager.sync().await.unwrap(), SyncResult::Created);
}
