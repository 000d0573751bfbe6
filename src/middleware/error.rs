//! Error response formatting
//!
//! Provides standardized error responses with consistent JSON structure,
//! HTTP status codes, error codes, and user-friendly messages.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }

    pub fn new(error: ErrorCode, message: impl Into<String>, request_id: Option<String>) -> Self {
        Self {
            error,
            message: message.into(),
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(false),
        }
    }

    pub fn internal_error(request_id: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalError,
            "An internal server error occurred. Please try again later.",
            request_id,
        )
    }
}

/// Converts errors into HTTP responses with proper status codes and JSON
/// formatting. Server errors log the operator diagnostic; the body only ever
/// carries the user message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                diagnostic = %self.diagnostic(),
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error_code = ?self.error_code(),
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// JSON error body for failures that are not an [`AppError`]
pub fn json_error_response(
    status: StatusCode,
    error: ErrorCode,
    message: impl Into<String>,
    request_id: Option<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    let error_response = if status.is_server_error() {
        ErrorResponse::internal_error(request_id)
    } else {
        ErrorResponse::new(error, message, request_id)
    };

    (status, Json(error_response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, DomainError, ExternalError, ValidationError};

    #[test]
    fn test_error_response_from_app_error() {
        let app_error = AppError::domain(DomainError::InsufficientFunds {
            available: "50".to_string(),
            required: "100".to_string(),
        })
        .with_request_id("req_123");

        let error_response = ErrorResponse::from_app_error(&app_error);

        assert_eq!(error_response.error, ErrorCode::InsufficientFunds);
        assert_eq!(error_response.request_id, Some("req_123".to_string()));
        assert!(error_response.message.contains("Insufficient wallet balance"));
    }

    #[test]
    fn test_app_error_into_response() {
        let app_error = AppError::validation(ValidationError::MissingField {
            field: "reference".to_string(),
        });

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_code_mapping() {
        let locked = AppError::domain(DomainError::AccountLocked {
            locked_until: Utc::now(),
        });
        assert_eq!(locked.into_response().status(), StatusCode::LOCKED);

        let not_found = AppError::domain(DomainError::TransactionNotFound {
            reference: "AIR-1".to_string(),
        });
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let unreachable = AppError::new(AppErrorKind::External(ExternalError::NetworkUnreachable {
            provider: "maskawa".to_string(),
            message: "timeout".to_string(),
        }));
        assert_eq!(
            unreachable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_server_error_body_hides_detail() {
        let (status, Json(body)) = json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ConfigurationError,
            "secret missing",
            Some("req_9".to_string()),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, ErrorCode::InternalError);
        assert!(!body.message.contains("secret"));
    }

    #[test]
    fn test_request_id_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc".parse().unwrap());
        assert_eq!(get_request_id_from_headers(&headers), Some("abc".to_string()));
    }
}
