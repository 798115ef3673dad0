use crate::api::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    postgres_connected: bool,
    database: String,
    pool_size: usize,
    uptime_seconds: u64,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    // Test PostgreSQL connection
    let postgres_connected = state.pool.get().await.is_ok();

    Json(HealthResponse {
        status: if postgres_connected {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        postgres_connected,
        database: state.runner.database().to_string(),
        pool_size: state.pool.status().size,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
