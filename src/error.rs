//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("multiple rows returned: {0}")]
    MultipleRows(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("integrity: {0}")]
    Integrity(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("migration: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            DbError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            DbError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DbError::MultipleRows(_) => (StatusCode::INTERNAL_SERVER_ERROR, "multiple_rows"),
            DbError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            DbError::Integrity(_) => (StatusCode::CONFLICT, "conflict"),
            DbError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            DbError::Migrate(_) => (StatusCode::INTERNAL_SERVER_ERROR, "migration_error"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
