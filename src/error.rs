use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Connection failed to {database}: {cause}")]
    ConnectionFailed { database: String, cause: String },

    #[error("Migration failed in {database}: {migration} - {source}")]
    MigrationFailed {
        database: String,
        migration: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Failed to record {migration} in {database}: {source}")]
    TrackingFailed {
        database: String,
        migration: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Failed to inspect {table}: {source}")]
    InspectionFailed {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Invalid identifier: {name:?}")]
    InvalidIdentifier { name: String },

    #[error("Alteration of {table} has no operations")]
    EmptyAlteration { table: String },

    #[error("Migration {name} is registered more than once")]
    DuplicateMigration { name: String },

    #[error("Migration {name} is recorded as applied but is not registered")]
    UnknownMigration { name: String },

    #[error("No applied migrations to roll back in {database}")]
    NothingToRollback { database: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Admin endpoints disabled: ADMIN_TOKEN not configured")]
    AdminDisabled,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MigrateError {
    /// SQLSTATE reported by PostgreSQL, if the failure came from the server.
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            MigrateError::MigrationFailed { source, .. }
            | MigrateError::TrackingFailed { source, .. }
            | MigrateError::InspectionFailed { source, .. } => source.code(),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
}

impl IntoResponse for MigrateError {
    fn into_response(self) -> Response {
        let (status, error, migration) = match &self {
            MigrateError::ConnectionFailed { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "connection_failed", None)
            }
            MigrateError::MigrationFailed { migration, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "migration_failed",
                Some(migration.clone()),
            ),
            MigrateError::TrackingFailed { migration, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "tracking_failed",
                Some(migration.clone()),
            ),
            MigrateError::InspectionFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "inspection_failed", None)
            }
            MigrateError::InvalidIdentifier { .. } | MigrateError::EmptyAlteration { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "invalid_migration", None)
            }
            MigrateError::DuplicateMigration { name } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "duplicate_migration",
                Some(name.clone()),
            ),
            MigrateError::UnknownMigration { name } => {
                (StatusCode::CONFLICT, "unknown_migration", Some(name.clone()))
            }
            MigrateError::NothingToRollback { .. } => {
                (StatusCode::CONFLICT, "nothing_to_rollback", None)
            }
            MigrateError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            MigrateError::AdminDisabled => {
                (StatusCode::SERVICE_UNAVAILABLE, "admin_disabled", None)
            }
            MigrateError::InvalidRequest { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_request", None)
            }
            MigrateError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
            migration,
            sql_state: self.sql_state().map(|s| s.code().to_string()),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
