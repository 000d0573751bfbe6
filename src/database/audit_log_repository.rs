use crate::database::error::DatabaseError;
use crate::database::repository::AuditLogRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Admin-visible audit entry
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// None when the system itself acted (webhooks, reconciliation flags)
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_user_id: Option<Uuid>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_user_id: Option<Uuid>,
    pub details: JsonValue,
}

/// Postgres-backed admin_logs table
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError> {
        sqlx::query_as::<_, AuditEntry>(
            "INSERT INTO admin_logs (actor_id, action, target_user_id, details)
             VALUES ($1, $2, $3, $4)
             RETURNING id, actor_id, action, target_user_id, details, created_at",
        )
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(entry.target_user_id)
        .bind(&entry.details)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>, DatabaseError> {
        sqlx::query_as::<_, AuditEntry>(
            "SELECT id, actor_id, action, target_user_id, details, created_at
             FROM admin_logs
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
