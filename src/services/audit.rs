//! Admin audit trail service
//! Records PIN resets, reconciliation flags, refund failures and webhook deliveries.

use crate::database::audit_log_repository::{AuditEntry, NewAuditEntry};
use crate::database::error::DatabaseError;
use crate::database::repository::AuditLogRepository;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Action names shown in the admin console
pub mod actions {
    pub const RESET_USER_PIN: &str = "reset_user_pin";
    pub const RECONCILIATION_FLAGGED: &str = "settlement_reconciliation_flagged";
    pub const REFUND_FAILED: &str = "settlement_refund_failed";
    pub const NAIJADATASUB_WEBHOOK: &str = "naijadatasub_webhook";
}

#[derive(Clone)]
pub struct AuditTrail {
    repo: Arc<dyn AuditLogRepository>,
}

impl AuditTrail {
    pub fn new(repo: Arc<dyn AuditLogRepository>) -> Self {
        Self { repo }
    }

    /// Append an entry; the caller decides whether a failure is fatal
    pub async fn record(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        target_user_id: Option<Uuid>,
        details: JsonValue,
    ) -> Result<AuditEntry, DatabaseError> {
        self.repo
            .append(NewAuditEntry {
                actor_id,
                action: action.to_string(),
                target_user_id,
                details,
            })
            .await
    }

    /// Append an entry where losing it must not undo the surrounding operation
    pub async fn record_best_effort(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        target_user_id: Option<Uuid>,
        details: JsonValue,
    ) {
        if let Err(e) = self.record(actor_id, action, target_user_id, details).await {
            error!(action = action, error = %e, "Failed to write audit entry");
        }
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.repo.recent(limit).await
    }
}
