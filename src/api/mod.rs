mod health;
mod migrate;

pub use health::health_check;
pub use migrate::{apply_migrations, migration_status, rollback_migrations, RollbackRequest};

use crate::migration::MigrationRunner;
use axum::{
    routing::{get, post},
    Router,
};
use deadpool_postgres::Pool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub pool: Pool,
    pub runner: MigrationRunner,
    pub admin_token: Option<String>,
    pub start_time: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/migrations", get(migration_status))
        .route("/migrations/up", post(apply_migrations))
        .route("/migrations/down", post(rollback_migrations))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
