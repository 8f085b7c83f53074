//! axum integration: shared state and a request-scoped connection extractor.

use crate::error::DbError;
use crate::schema::ModelRegistry;
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use sqlx::pool::PoolConnection;
use sqlx::{Database, Pool};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// What request handlers need from the database layer: the pool and the
/// registered tables. Passed around explicitly as axum state; there is no
/// global instance.
pub struct DbContext<DB: Database> {
    pub pool: Pool<DB>,
    pub registry: Arc<ModelRegistry>,
}

pub type PgDbContext = DbContext<sqlx::Postgres>;
pub type SqliteDbContext = DbContext<sqlx::Sqlite>;

impl<DB: Database> DbContext<DB> {
    pub fn new(pool: Pool<DB>, registry: ModelRegistry) -> Self {
        DbContext {
            pool,
            registry: Arc::new(registry),
        }
    }
}

impl<DB: Database> Clone for DbContext<DB> {
    fn clone(&self) -> Self {
        DbContext {
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Extractor for a pooled connection scoped to the current request. The
/// connection goes back to the pool when the extractor drops, on every exit
/// path.
pub struct Db<DB: Database>(pub PoolConnection<DB>);

#[async_trait]
impl<S, DB> FromRequestParts<S> for Db<DB>
where
    DB: Database,
    DbContext<DB>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = DbError;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = DbContext::from_ref(state);
        let conn = ctx.pool.acquire().await?;
        Ok(Db(conn))
    }
}

impl<DB: Database> Deref for Db<DB> {
    type Target = DB::Connection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<DB: Database> DerefMut for Db<DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
