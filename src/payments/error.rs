use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Normalized failure of a vendor call
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transport failure, timeout or vendor outage. The call may be retried
    /// as a new attempt.
    #[error("Network unreachable: provider={provider}, message={message}")]
    NetworkUnreachable { provider: String, message: String },

    /// The vendor refused the request; retrying needs different input.
    /// `detail` keeps the raw vendor text for diagnostics.
    #[error("Provider rejected: provider={provider}, message={message}")]
    ProviderRejected {
        provider: String,
        message: String,
        provider_code: Option<String>,
        detail: Option<String>,
    },

    /// Missing or invalid credentials, or the active backend cannot perform
    /// the operation. No call was attempted.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}

impl ProviderError {
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::NetworkUnreachable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::ProviderRejected {
            provider: provider.into(),
            message: message.into(),
            provider_code: None,
            detail: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ProviderError::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::NetworkUnreachable { .. })
    }

    /// Value stored under `details.failure_kind`
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NetworkUnreachable { .. } => "network_unreachable",
            ProviderError::ProviderRejected { .. } => "provider_rejected",
            ProviderError::ConfigurationError { .. } => "configuration_error",
        }
    }

    /// Diagnostic text kept in transaction details, never shown to users
    pub fn failure_reason(&self) -> String {
        match self {
            ProviderError::NetworkUnreachable { message, .. } => message.clone(),
            ProviderError::ProviderRejected {
                message, detail, ..
            } => match detail {
                Some(detail) => format!("{}: {}", message, detail),
                None => message.clone(),
            },
            ProviderError::ConfigurationError { message } => message.clone(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ProviderError::NetworkUnreachable { .. } => {
                "Unable to reach the service provider. Please try again.".to_string()
            }
            ProviderError::ProviderRejected { .. } => {
                "The provider could not complete this request. Please check your details and try again."
                    .to_string()
            }
            ProviderError::ConfigurationError { .. } => {
                "This service is temporarily unavailable. Please contact support.".to_string()
            }
        }
    }
}

impl From<ProviderError> for crate::error::AppError {
    fn from(err: ProviderError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        match err {
            ProviderError::NetworkUnreachable { provider, message } => {
                AppError::new(AppErrorKind::External(ExternalError::NetworkUnreachable {
                    provider,
                    message,
                }))
            }
            ProviderError::ProviderRejected {
                provider, message, ..
            } => AppError::new(AppErrorKind::External(ExternalError::ProviderRejected {
                provider,
                message,
            })),
            ProviderError::ConfigurationError { message } => AppError::configuration(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ErrorCode};

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(ProviderError::network("naijadatasub", "timeout").is_retryable());
        assert!(!ProviderError::rejected("naijadatasub", "invalid number").is_retryable());
        assert!(!ProviderError::configuration("token missing").is_retryable());
    }

    #[test]
    fn failure_reason_keeps_vendor_detail() {
        let err = ProviderError::ProviderRejected {
            provider: "maskawa".to_string(),
            message: "request rejected".to_string(),
            provider_code: Some("400".to_string()),
            detail: Some("{\"error\":[\"Invalid plan\"]}".to_string()),
        };
        assert!(err.failure_reason().contains("Invalid plan"));
        assert!(!err.user_message().contains("Invalid plan"));
    }

    #[test]
    fn configuration_error_maps_to_operator_facing_code() {
        let app: AppError = ProviderError::configuration("naijadatasub_token is not set").into();
        assert_eq!(app.error_code(), ErrorCode::ConfigurationError);
        assert!(!app.user_message().contains("naijadatasub_token"));
    }
}
