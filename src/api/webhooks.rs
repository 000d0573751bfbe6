use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::middleware::error::{get_request_id_from_headers, json_error_response};
use crate::services::webhook_processor::{
    WebhookOutcome, WebhookProcessor, WebhookProcessorError,
};

pub const SIGNATURE_HEADER: &str = "x-naijadatasub-signature";

pub struct WebhookState {
    pub processor: Arc<WebhookProcessor>,
}

/// POST /webhooks/naijadatasub
pub async fn handle_naijadatasub_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    info!(request_id = ?request_id, bytes = body.len(), "Received naijadatasub webhook");

    match state.processor.process_naijadatasub(signature, &body).await {
        Ok(outcome) => {
            let body = match outcome {
                WebhookOutcome::Processed { reference } => serde_json::json!({
                    "success": true,
                    "message": "Webhook processed successfully",
                    "reference": reference,
                }),
                WebhookOutcome::AlreadySettled { reference } => serde_json::json!({
                    "success": true,
                    "message": "Transaction already settled",
                    "reference": reference,
                }),
                WebhookOutcome::Ignored { event } => serde_json::json!({
                    "success": true,
                    "message": "Event ignored",
                    "event": event,
                }),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(WebhookProcessorError::MissingSignature) => {
            warn!(request_id = ?request_id, "Missing webhook signature");
            json_error_response(
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthenticated,
                "Missing signature",
                request_id,
            )
            .into_response()
        }
        Err(WebhookProcessorError::InvalidSignature) => json_error_response(
            StatusCode::UNAUTHORIZED,
            ErrorCode::Unauthenticated,
            "Invalid signature",
            request_id,
        )
        .into_response(),
        Err(WebhookProcessorError::MalformedPayload(reason)) => {
            warn!(request_id = ?request_id, reason = %reason, "Malformed webhook payload");
            json_error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError,
                format!("Malformed payload: {}", reason),
                request_id,
            )
            .into_response()
        }
        Err(WebhookProcessorError::SecretNotConfigured) => json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ConfigurationError,
            "Webhook secret is not configured",
            request_id,
        )
        .into_response(),
        Err(WebhookProcessorError::Settlement(e)) => match request_id {
            Some(id) => e.with_request_id(id).into_response(),
            None => e.into_response(),
        },
    }
}
