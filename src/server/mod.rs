//! HTTP API: authentication, permissions, handlers and routing.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod permissions;
pub mod routes;
pub mod sync;
pub mod tokens;

use sqlx::SqlitePool;

pub use auth::RequestContext;
pub use error::ApiError;
pub use routes::router;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
