pub mod audit_log_repository;
pub mod error;
pub mod memory;
pub mod provider_settings_repository;
pub mod repository;
pub mod transaction_repository;
pub mod user_repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error as log_error, info, warn};

use self::error::DatabaseError;
use crate::config::DatabaseConfig;

/// Connections older than this are recycled
const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(30 * 60);
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Open the pool and prove it with one acquired connection
pub async fn init_pool_from_config(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let idle_timeout =
        Duration::from_secs(config.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS));
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.connection_timeout,
        "Connecting to wallet database"
    );

    let pool = pool_options(config, idle_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| {
            log_error!(error = %e, "Could not open wallet database pool");
            DatabaseError::from_sqlx(e)
        })?;

    health_check(&pool).await?;
    Ok(pool)
}

fn pool_options(config: &DatabaseConfig, idle_timeout: Duration) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .idle_timeout(idle_timeout)
        .max_lifetime(MAX_CONNECTION_LIFETIME)
}

/// `SELECT 1` round trip used at startup and by `/health`
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
        warn!(error = %e, "Database ping failed");
        DatabaseError::from_sqlx(e)
    })?;
    Ok(())
}
