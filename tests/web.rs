//! The axum glue: request-scoped connections and 404 mapping, exercised
//! through an in-process router.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx_helpers::sqlite::{self, DatabaseManager};
use sqlx_helpers::web::{Db, SqliteDbContext};
use sqlx_helpers::{ColumnDef, DbConfig, DbError, ModelRegistry, TableDef};
use tempfile::TempDir;
use tower::ServiceExt;

fn users() -> TableDef {
    TableDef::new("users")
        .column(ColumnDef::new("id", "INTEGER"))
        .column(ColumnDef::new("name", "TEXT"))
        .primary_key(&["id"])
        .unique(&["name"])
}

async fn setup() -> (TempDir, SqliteDbContext) {
    let dir = TempDir::new().unwrap();
    let scripts = dir.path().join("migrations");
    std::fs::create_dir_all(&scripts).unwrap();
    let url = format!("sqlite:{}", dir.path().join("app.db").display());
    let registry = ModelRegistry::new().with(users());
    let manager = DatabaseManager::connect(&DbConfig::new(&url, scripts), registry.clone())
        .await
        .unwrap();
    manager.sync().await.unwrap();
    let ctx = SqliteDbContext::new(manager.pool().clone(), registry);
    (dir, ctx)
}

async fn get_user(
    State(ctx): State<SqliteDbContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, DbError> {
    let table = ctx
        .registry
        .get("users")
        .cloned()
        .ok_or_else(|| DbError::Config("users table not registered".into()))?;
    let row = sqlite::get_or_404(&ctx.pool, &table, &json!(id), Some("no such user")).await?;
    Ok(Json(row))
}

async fn ping(mut db: Db<sqlx::Sqlite>) -> Result<String, DbError> {
    let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&mut *db).await?;
    Ok(one.to_string())
}

fn app(ctx: SqliteDbContext) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/users/:id", get(get_user))
        .with_state(ctx)
}

#[tokio::test]
async fn extractor_hands_out_a_live_connection() {
    let (_dir, ctx) = setup().await;
    let resp = app(ctx)
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn found_row_is_served_as_json() {
    let (_dir, ctx) = setup().await;
    let table = users();
    let (row, _) = sqlite::get_or_create(&ctx.pool, &table, &[("name", json!("alice"))], &[])
        .await
        .unwrap();
    let id = row["id"].as_i64().unwrap();

    let resp = app(ctx)
        .oneshot(
            Request::builder()
                .uri(format!("/users/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["name"], json!("alice"));
}

#[tokio::test]
async fn missing_row_maps_to_404_with_error_envelope() {
    let (_dir, ctx) = setup().await;
    let resp = app(ctx)
        .oneshot(
            Request::builder()
                .uri("/users/999999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], json!("not_found"));
    assert_eq!(body["error"]["message"], json!("not found: no such user"));
}
