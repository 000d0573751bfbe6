use uuid::Uuid;

use crate::error::{AppError, AppResult, DomainError};

/// Caller identity supplied by the auth collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<Uuid>,
}

impl Session {
    pub fn authenticated(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    /// Every PIN and settlement operation starts here
    pub fn require_user(&self) -> AppResult<Uuid> {
        self.user_id
            .ok_or_else(|| AppError::domain(DomainError::Unauthenticated))
    }
}
