use crate::database::error::DatabaseError;
use crate::database::repository::ProviderSettingsRepository;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

/// Setting keys maintained by the admin console
pub mod keys {
    pub const ACTIVE_API_PROVIDER: &str = "active_api_provider";
    pub const NAIJADATASUB_WEBHOOK_SECRET: &str = "naijadatasub_webhook_secret";

    pub fn token(provider: &str) -> String {
        format!("{}_token", provider)
    }

    pub fn base_url(provider: &str) -> String {
        format!("{}_base_url", provider)
    }
}

/// Postgres-backed api_settings key/value table
pub struct PgProviderSettingsRepository {
    pool: PgPool,
}

impl PgProviderSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderSettingsRepository for PgProviderSettingsRepository {
    async fn get_settings(&self, keys: &[String]) -> Result<HashMap<String, String>, DatabaseError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT key_name, key_value FROM api_settings WHERE key_name = ANY($1)",
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO api_settings (key_name, key_value)
             VALUES ($1, $2)
             ON CONFLICT (key_name) DO UPDATE SET key_value = EXCLUDED.key_value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
