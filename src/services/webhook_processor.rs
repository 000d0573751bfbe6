use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::provider_settings_repository::keys;
use crate::database::repository::ProviderSettingsRepository;
use crate::error::AppError;
use crate::payments::utils::verify_hmac_sha512_hex;
use crate::services::audit::{actions, AuditTrail};
use crate::services::settlement::{AsyncSettlement, SettlementEngine, SettlementOutcome};

const EVENT_COMPLETED: &str = "transaction.completed";
const EVENT_FAILED: &str = "transaction.failed";

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Missing signature")]
    MissingSignature,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Webhook secret is not configured")]
    SecretNotConfigured,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Settlement error: {0}")]
    Settlement(AppError),
}

/// What a verified delivery did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed { reference: String },
    AlreadySettled { reference: String },
    Ignored { event: String },
}

/// Verifies and applies naijadatasub transaction callbacks
pub struct WebhookProcessor {
    engine: Arc<SettlementEngine>,
    settings: Arc<dyn ProviderSettingsRepository>,
    fallback_secret: Option<String>,
    audit: AuditTrail,
}

impl WebhookProcessor {
    pub fn new(
        engine: Arc<SettlementEngine>,
        settings: Arc<dyn ProviderSettingsRepository>,
        fallback_secret: Option<String>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            engine,
            settings,
            fallback_secret,
            audit,
        }
    }

    /// `raw_body` must be the exact bytes received; the signature covers them.
    pub async fn process_naijadatasub(
        &self,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let secret = self.webhook_secret().await?;
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookProcessorError::MissingSignature)?;

        if !verify_hmac_sha512_hex(raw_body, &secret, signature) {
            warn!("Invalid naijadatasub webhook signature");
            return Err(WebhookProcessorError::InvalidSignature);
        }

        let payload: JsonValue = serde_json::from_slice(raw_body)
            .map_err(|e| WebhookProcessorError::MalformedPayload(e.to_string()))?;
        let event = payload
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let outcome = match event.as_str() {
            EVENT_COMPLETED => SettlementOutcome::Success,
            EVENT_FAILED => SettlementOutcome::Failed,
            _ => {
                info!(event = %event, "Unhandled webhook event type");
                self.audit
                    .record_best_effort(
                        None,
                        actions::NAIJADATASUB_WEBHOOK,
                        None,
                        json!({ "event": event, "status": "unhandled", "payload": payload }),
                    )
                    .await;
                return Ok(WebhookOutcome::Ignored { event });
            }
        };

        let reference = payload
            .get("data")
            .and_then(|d| d.get("reference"))
            .and_then(|v| v.as_str())
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                WebhookProcessorError::MalformedPayload("missing data.reference".to_string())
            })?
            .to_string();

        info!(event = %event, reference = %reference, "Processing naijadatasub webhook");
        let result = self
            .engine
            .handle_async_settlement(&reference, outcome, payload)
            .await
            .map_err(|e| {
                error!(reference = %reference, error = %e.diagnostic(), "Webhook settlement failed");
                WebhookProcessorError::Settlement(e)
            })?;

        match result {
            AsyncSettlement::Applied { record, refund } => {
                let mut details = json!({
                    "event": event,
                    "transaction_id": record.id,
                    "reference": record.reference,
                    "status": record.status,
                });
                if let Some(reason) = record.failure_reason() {
                    details["reason"] = json!(reason);
                }
                if let Some(refund) = &refund {
                    details["refund_reference"] = json!(refund.reference);
                }
                self.audit
                    .record_best_effort(
                        None,
                        actions::NAIJADATASUB_WEBHOOK,
                        Some(record.user_id),
                        details,
                    )
                    .await;
                Ok(WebhookOutcome::Processed { reference })
            }
            AsyncSettlement::AlreadySettled(_) => {
                info!(reference = %reference, "Duplicate webhook delivery acknowledged");
                Ok(WebhookOutcome::AlreadySettled { reference })
            }
        }
    }

    /// The settings table wins over the environment
    async fn webhook_secret(&self) -> Result<String, WebhookProcessorError> {
        let key = keys::NAIJADATASUB_WEBHOOK_SECRET.to_string();
        let stored = match self.settings.get_settings(std::slice::from_ref(&key)).await {
            Ok(mut settings) => settings.remove(&key),
            Err(e) => {
                error!(error = %e, "Error fetching webhook secret");
                None
            }
        };

        stored
            .or_else(|| self.fallback_secret.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                error!("naijadatasub webhook secret is not configured, rejecting delivery");
                WebhookProcessorError::SecretNotConfigured
            })
    }
}
