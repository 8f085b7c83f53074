//! Demo server: reads config from env (SQLite fallback), synchronizes the
//! schema, and serves a tiny user API. Pass `sync` or `status` to run the
//! database subcommands instead.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use sqlx_helpers::web::SqliteDbContext;
use sqlx_helpers::{
    cli, sqlite, ColumnDef, DbCommand, DbConfig, DbError, ModelRegistry, TableDef,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "server", about = "sqlx-helpers demo server")]
struct Cli {
    /// Optional database subcommand. When omitted, the server runs.
    #[command(subcommand)]
    command: Option<DbCommand>,
}

fn registry() -> ModelRegistry {
    ModelRegistry::new().with(
        TableDef::new("users")
            .column(ColumnDef::new("id", "INTEGER"))
            .column(ColumnDef::new("name", "TEXT"))
            .column(ColumnDef::new("full_name", "TEXT").nullable())
            .primary_key(&["id"])
            .unique(&["name"]),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sqlx_helpers=info".parse()?))
        .init();

    let args = Cli::parse();
    let config =
        DbConfig::from_env().unwrap_or_else(|_| DbConfig::new("sqlite:demo.db", "migrations"));
    std::fs::create_dir_all(&config.migrations_path)?;

    if let Some(command) = args.command {
        cli::run(&command, &config, registry()).await?;
        return Ok(());
    }

    let manager = sqlite::DatabaseManager::connect(&config, registry()).await?;
    let result = manager.sync().await?;
    tracing::info!(?result, "database synchronized");

    let ctx = SqliteDbContext::new(manager.pool().clone(), registry());
    let app = Router::new()
        .route("/users/:id", get(get_user))
        .route("/users/by-name/:name", get(get_user_by_name))
        .with_state(ctx);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn users_table(ctx: &SqliteDbContext) -> Result<TableDef, DbError> {
    ctx.registry
        .get("users")
        .cloned()
        .ok_or_else(|| DbError::Config("users table not registered".into()))
}

async fn get_user(
    State(ctx): State<SqliteDbContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, DbError> {
    let users = users_table(&ctx)?;
    let row = sqlite::get_or_404(&ctx.pool, &users, &json!(id), Some("no such user")).await?;
    Ok(Json(row))
}

async fn get_user_by_name(
    State(ctx): State<SqliteDbContext>,
    Path(name): Path<String>,
) -> Result<Json<Value>, DbError> {
    let users = users_table(&ctx)?;
    let row = sqlite::first_or_404(&ctx.pool, &users, &[("name", json!(name))], None).await?;
    Ok(Json(row))
}
