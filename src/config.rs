//! Caller-supplied database configuration: connection URL, pool sizing, and
//! the migration-script directory. Nothing is discovered; everything comes
//! from the application or its environment.

use crate::error::DbError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_max_connections() -> u32 {
    5
}

/// Database settings. Deserializable so applications can embed it in their
/// own config files, with [`DbConfig::from_env`] as the conventional
/// fallback.
#[derive(Clone, Debug, Deserialize)]
pub struct DbConfig {
    /// Connection URL, e.g. `postgres://localhost/app` or `sqlite:app.db`.
    pub url: String,
    /// Directory holding the migration scripts.
    pub migrations_path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Pool acquire timeout in seconds; the driver default when absent.
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
}

impl DbConfig {
    pub fn new(url: &str, migrations_path: impl Into<PathBuf>) -> Self {
        DbConfig {
            url: url.to_string(),
            migrations_path: migrations_path.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: None,
        }
    }

    /// Read `DATABASE_URL` and `MIGRATIONS_PATH` from the environment.
    pub fn from_env() -> Result<Self, DbError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DbError::Config("DATABASE_URL is not set".into()))?;
        let migrations_path = std::env::var("MIGRATIONS_PATH")
            .map_err(|_| DbError::Config("MIGRATIONS_PATH is not set".into()))?;
        Ok(Self::new(&url, migrations_path))
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_secs.map(Duration::from_secs)
    }

    /// Which engine the URL addresses.
    pub fn backend(&self) -> Result<Backend, DbError> {
        backend_for_url(&self.url)
    }

    /// The migrations directory, validated to exist.
    pub(crate) fn migrations_dir(&self) -> Result<&Path, DbError> {
        if !self.migrations_path.is_dir() {
            return Err(DbError::Config(format!(
                "migrations path {} is not a directory",
                self.migrations_path.display()
            )));
        }
        Ok(&self.migrations_path)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

pub fn backend_for_url(url: &str) -> Result<Backend, DbError> {
    if url.starts_with("sqlite:") {
        return Ok(Backend::Sqlite);
    }
    let scheme = url.split("://").next().unwrap_or("");
    match scheme {
        "postgres" | "postgresql" => Ok(Backend::Postgres),
        other => Err(DbError::Config(format!(
            "unsupported database URL scheme '{}'",
            other
        ))),
    }
}

/// Split a PostgreSQL URL into (admin URL pointing at the `postgres`
/// database, database name). Used to create the database before the main
/// pool connects.
pub(crate) fn admin_url(url: &str) -> Result<(String, String), DbError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| DbError::Config("database URL has no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}
