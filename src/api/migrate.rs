use crate::api::AppState;
use crate::error::{MigrateError, Result};
use crate::migration::MigrationStatus;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Serialize)]
pub struct MigrateResponse {
    status: String,
    database: String,
    migrations: Vec<String>,
    execution_time_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollbackRequest {
    pub steps: Option<usize>,
}

impl RollbackRequest {
    /// An empty body means `{}`; anything else must be a valid request object.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(body).map_err(|e| MigrateError::InvalidRequest {
            message: format!("Invalid rollback request body: {}", e),
        })
    }
}

pub async fn migration_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MigrationStatus>>> {
    Ok(Json(state.runner.status(&state.pool).await?))
}

pub async fn apply_migrations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    authorize(&headers, state.admin_token.as_deref())?;
    let start_time = Instant::now();

    let applied = state.runner.apply_pending(&state.pool).await?;

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    info!(
        "Migrate up complete for {}: {} migrations in {}ms",
        state.runner.database(),
        applied.len(),
        execution_time_ms
    );

    Ok((
        StatusCode::OK,
        Json(MigrateResponse {
            status: "completed".to_string(),
            database: state.runner.database().to_string(),
            migrations: applied,
            execution_time_ms,
        }),
    ))
}

pub async fn rollback_migrations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    authorize(&headers, state.admin_token.as_deref())?;
    let start_time = Instant::now();

    let steps = RollbackRequest::from_body(&body)?.steps.unwrap_or(1);
    let reverted = state.runner.rollback(&state.pool, steps).await?;

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    info!(
        "Migrate down complete for {}: {} migrations in {}ms",
        state.runner.database(),
        reverted.len(),
        execution_time_ms
    );

    Ok((
        StatusCode::OK,
        Json(MigrateResponse {
            status: "reverted".to_string(),
            database: state.runner.database().to_string(),
            migrations: reverted,
            execution_time_ms,
        }),
    ))
}

/// Mutating endpoints need `Authorization: Bearer <ADMIN_TOKEN>`; without a
/// configured token they are switched off.
fn authorize(headers: &HeaderMap, admin_token: Option<&str>) -> Result<()> {
    let expected = match admin_token {
        Some(token) => token,
        None => {
            warn!("Admin endpoint accessed but ADMIN_TOKEN not configured");
            return Err(MigrateError::AdminDisabled);
        }
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        Some(_) => Err(MigrateError::Unauthorized {
            message: "invalid admin token".to_string(),
        }),
        None => Err(MigrateError::Unauthorized {
            message: "missing bearer token".to_string(),
        }),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
