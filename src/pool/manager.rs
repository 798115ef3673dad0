use crate::config::Config;
use crate::error::{MigrateError, Result};
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::info;

/// Create the pool and prove it works with a ping.
pub async fn connect(config: &Config) -> Result<Pool> {
    let database = config.database_name();
    let pool = create_pool(&config.database_url, config.max_connections)?;

    let client = pool.get().await.map_err(|e| MigrateError::ConnectionFailed {
        database: database.clone(),
        cause: e.to_string(),
    })?;

    client
        .execute("SELECT 1", &[])
        .await
        .map_err(|e| MigrateError::ConnectionFailed {
            database: database.clone(),
            cause: format!("Ping failed: {}", e),
        })?;

    info!("Connected to PostgreSQL database {}", database);
    Ok(pool)
}

pub fn create_pool(database_url: &str, max_size: u32) -> Result<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: max_size.max(1) as usize,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| MigrateError::Internal(format!("Failed to create pool: {}", e)))
}
