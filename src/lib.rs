//! Boilerplate helpers for sqlx-backed applications: migration-aware schema
//! synchronization, get-or-create row helpers, and axum request glue.
//!
//! Applications declare their tables in a [`ModelRegistry`], point a
//! [`DbConfig`] at a database URL and a migration-script directory, and call
//! `sync()` on the backend's `DatabaseManager`. An empty database gets the
//! registry's schema and a head stamp; a managed database gets pending
//! migrations; an up-to-date one is left alone.

pub mod cli;
pub mod config;
pub mod error;
pub mod naming;
pub mod postgres;
pub mod schema;
mod sql;
pub mod sqlite;
pub mod sync;
pub mod web;

pub use cli::DbCommand;
pub use config::{backend_for_url, Backend, DbConfig};
pub use error::DbError;
pub use postgres::ensure_database_exists;
pub use schema::{ColumnDef, ModelRegistry, TableDef};
pub use sync::{DatabaseStatus, SyncResult};
pub use web::{Db, DbContext, PgDbContext, SqliteDbContext};
