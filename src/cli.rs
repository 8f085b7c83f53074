//! Database subcommands, mountable under an application's clap CLI.

use crate::config::{Backend, DbConfig};
use crate::error::DbError;
use crate::schema::ModelRegistry;
use crate::sync::{DatabaseStatus, SyncResult};
use crate::{postgres, sqlite};
use clap::Subcommand;

#[derive(Subcommand, Clone, Debug)]
pub enum DbCommand {
    /// Create or migrate the database.
    Sync,
    /// Report where the database stands relative to the migration scripts.
    Status,
}

/// Execute a database subcommand against the configured backend and print
/// the outcome.
pub async fn run(
    command: &DbCommand,
    config: &DbConfig,
    registry: ModelRegistry,
) -> Result<(), DbError> {
    match config.backend()? {
        Backend::Postgres => {
            let manager = postgres::DatabaseManager::connect(config, registry).await?;
            match command {
                DbCommand::Sync => report_sync(manager.sync().await?),
                DbCommand::Status => report_status(manager.get_status().await?),
            }
        }
        Backend::Sqlite => {
            let manager = sqlite::DatabaseManager::connect(config, registry).await?;
            match command {
                DbCommand::Sync => report_sync(manager.sync().await?),
                DbCommand::Status => report_status(manager.get_status().await?),
            }
        }
    }
    Ok(())
}

fn report_sync(result: SyncResult) {
    match result {
        SyncResult::Created => println!("Database created."),
        SyncResult::Upgraded => println!("Database upgraded."),
        SyncResult::AlreadyUpToDate => println!("Database already up-to-date."),
    }
}

fn report_status(status: DatabaseStatus) {
    match status {
        DatabaseStatus::NoInfo => println!("No migration information found."),
        DatabaseStatus::UpgradeAvailable => println!("A database upgrade is available."),
        DatabaseStatus::UpToDate => println!("Database already up-to-date."),
    }
}
