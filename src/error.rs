//! Unified error handling for the settlement backend
//!
//! Every component raises a precise error kind; this module maps those kinds to
//! HTTP status codes, machine-readable error codes and user-facing messages.
//! Vendor text never reaches the user message: it stays in transaction details.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by the UI collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "INSUFFICIENT_FUNDS")]
    InsufficientFunds,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,
    #[serde(rename = "INVALID_PIN")]
    InvalidPin,
    #[serde(rename = "PIN_NOT_SET")]
    PinNotSet,
    #[serde(rename = "ACCOUNT_LOCKED")]
    AccountLocked,
    #[serde(rename = "UNAUTHENTICATED")]
    Unauthenticated,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,
    #[serde(rename = "USER_NOT_FOUND")]
    UserNotFound,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "RECONCILIATION_REQUIRED")]
    ReconciliationRequired,

    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,

    #[serde(rename = "NETWORK_UNREACHABLE")]
    NetworkUnreachable,
    #[serde(rename = "PROVIDER_REJECTED")]
    ProviderRejected,

    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations raised by the ledger, PIN guard and engine
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Wallet balance does not cover the requested amount
    InsufficientFunds { available: String, required: String },
    /// Amount is zero, negative or finer than the currency minor unit
    InvalidAmount { amount: String, reason: String },
    /// PIN did not verify
    InvalidPin { remaining_attempts: Option<i32> },
    /// A money-moving operation needs a PIN but the user never set one
    PinNotSet,
    /// Too many consecutive PIN failures
    AccountLocked { locked_until: DateTime<Utc> },
    Unauthenticated,
    Forbidden { action: String },
    UserNotFound { user_id: String },
    TransactionNotFound { reference: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    /// Missing or invalid operator configuration, e.g. vendor credentials
    Configuration { message: String },
    Internal { message: String },
}

/// External provider errors, normalized from vendor-specific responses
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Transport-level failure or timeout; safe to retry with a new attempt
    NetworkUnreachable { provider: String, message: String },
    /// Vendor business error; retry needs different input
    ProviderRejected { provider: String, message: String },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, reason: String },
    MissingField { field: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Internal {
            message: message.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientFunds { .. } => 422,
                DomainError::InvalidAmount { .. } => 400,
                DomainError::InvalidPin { .. } => 401,
                DomainError::PinNotSet => 428, // Precondition Required
                DomainError::AccountLocked { .. } => 423, // Locked
                DomainError::Unauthenticated => 401,
                DomainError::Forbidden { .. } => 403,
                DomainError::UserNotFound { .. } => 404,
                DomainError::TransactionNotFound { .. } => 404,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::NetworkUnreachable { .. } => 503,
                ExternalError::ProviderRejected { .. } => 502,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
                DomainError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                DomainError::InvalidPin { .. } => ErrorCode::InvalidPin,
                DomainError::PinNotSet => ErrorCode::PinNotSet,
                DomainError::AccountLocked { .. } => ErrorCode::AccountLocked,
                DomainError::Unauthenticated => ErrorCode::Unauthenticated,
                DomainError::Forbidden { .. } => ErrorCode::Forbidden,
                DomainError::UserNotFound { .. } => ErrorCode::UserNotFound,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Internal { .. } => ErrorCode::InternalError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::NetworkUnreachable { .. } => ErrorCode::NetworkUnreachable,
                ExternalError::ProviderRejected { .. } => ErrorCode::ProviderRejected,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientFunds { .. } => {
                    "Insufficient wallet balance. Please fund your wallet and try again."
                        .to_string()
                }
                DomainError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                DomainError::InvalidPin { remaining_attempts } => match remaining_attempts {
                    Some(n) => format!(
                        "Incorrect transaction PIN. {} attempt(s) remaining before your account is locked",
                        n
                    ),
                    None => "Incorrect transaction PIN".to_string(),
                },
                DomainError::PinNotSet => {
                    "Please set a transaction PIN before making payments".to_string()
                }
                DomainError::AccountLocked { locked_until } => format!(
                    "Too many incorrect PIN attempts. Please try again after {}",
                    locked_until.format("%H:%M UTC")
                ),
                DomainError::Unauthenticated => "Please sign in to continue".to_string(),
                DomainError::Forbidden { .. } => {
                    "You are not allowed to perform this action".to_string()
                }
                DomainError::UserNotFound { .. } => "Account not found".to_string(),
                DomainError::TransactionNotFound { reference } => {
                    format!("Transaction '{}' not found", reference)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Payment service temporarily unavailable. Please try again later or contact support."
                    .to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::NetworkUnreachable { .. } => {
                    "Unable to connect to payment service. Please try again.".to_string()
                }
                ExternalError::ProviderRejected { .. } => {
                    "The transaction could not be completed. Please check your details and try again."
                        .to_string()
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Internal { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::NetworkUnreachable { .. } => true,
                ExternalError::ProviderRejected { .. } => false,
            },
            AppErrorKind::Validation(_) => false,
        }
    }

    /// Operator-facing description; may contain internal detail, never shown to users
    pub fn diagnostic(&self) -> String {
        let detail = match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. })
            | AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            | AppErrorKind::Infrastructure(InfrastructureError::Internal { message })
            | AppErrorKind::External(ExternalError::NetworkUnreachable { message, .. })
            | AppErrorKind::External(ExternalError::ProviderRejected { message, .. }) => {
                message.clone()
            }
            _ => self.user_message(),
        };
        match &self.context {
            Some(context) => format!("{}: {}", context, detail),
            None => detail,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, From<ProviderError> in payments/error.rs

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
