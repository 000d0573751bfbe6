//! HTTP surface: vendor callbacks and the health check

pub mod webhooks;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::health::HealthChecker;
use webhooks::{handle_naijadatasub_webhook, WebhookState};

/// GET /health
pub async fn health(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
    let status = checker.check_health().await;
    let code = if status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

pub fn router(webhooks: Arc<WebhookState>, health_checker: Arc<HealthChecker>) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/naijadatasub", post(handle_naijadatasub_webhook))
        .with_state(webhooks);

    let health_routes = Router::new()
        .route("/health", get(health))
        .with_state(health_checker);

    Router::new().merge(webhook_routes).merge(health_routes)
}
