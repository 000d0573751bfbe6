//! Transaction PIN guard
//!
//! PINs are bcrypt hashed off the async runtime. Attempts for one user are
//! serialized in process, and storage refuses to count or clear failures
//! while a lock is in force, so at most `max_attempts` guesses are evaluated
//! per window. Reaching the threshold locks the account for the cooldown
//! window and resets the counter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PinPolicyConfig;
use crate::database::repository::{PinFailureOutcome, UserRepository};
use crate::database::user_repository::User;
use crate::error::{AppError, AppResult, DomainError};
use crate::services::audit::{actions, AuditTrail};
use crate::services::clock::Clock;
use crate::services::session::Session;
use crate::services::user_locks::UserLocks;

/// What the PIN settings screen shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinStatus {
    pub has_pin: bool,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub remaining_attempts: i32,
}

/// Result of one verification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verification {
    Matched,
    Mismatched { remaining_attempts: i32 },
    /// This mismatch reached the threshold
    LockedOut { locked_until: DateTime<Utc> },
}

impl Verification {
    fn into_result(self) -> AppResult<()> {
        match self {
            Verification::Matched => Ok(()),
            Verification::Mismatched { remaining_attempts } => {
                Err(AppError::domain(DomainError::InvalidPin {
                    remaining_attempts: Some(remaining_attempts),
                }))
            }
            Verification::LockedOut { locked_until } => {
                Err(AppError::domain(DomainError::AccountLocked { locked_until }))
            }
        }
    }
}

pub struct PinGuard {
    users: Arc<dyn UserRepository>,
    audit: AuditTrail,
    clock: Arc<dyn Clock>,
    policy: PinPolicyConfig,
    locks: UserLocks,
}

impl PinGuard {
    pub fn new(
        users: Arc<dyn UserRepository>,
        audit: AuditTrail,
        clock: Arc<dyn Clock>,
        policy: PinPolicyConfig,
    ) -> Self {
        Self {
            users,
            audit,
            clock,
            policy,
            locks: UserLocks::new(),
        }
    }

    /// Set or change the PIN. Changing requires the current PIN, which goes
    /// through the same lockout accounting as any other attempt.
    pub async fn set_pin(
        &self,
        session: &Session,
        new_pin: &str,
        current_pin: Option<&str>,
    ) -> AppResult<()> {
        let user_id = session.require_user()?;
        validate_pin_format(new_pin)?;

        let _serial = self.locks.lock(user_id).await;
        let user = self.load_user(user_id).await?;
        if user.has_pin() {
            let current = current_pin.ok_or_else(|| {
                AppError::domain(DomainError::InvalidPin {
                    remaining_attempts: None,
                })
            })?;
            self.check(&user, current).await?.into_result()?;
        }

        let hash = hash_pin(new_pin, self.policy.bcrypt_cost).await?;
        self.store_hash(user_id, Some(&hash)).await?;
        info!(user_id = %user_id, changed = user.has_pin(), "Transaction PIN set");
        Ok(())
    }

    /// `Ok(false)` on a mismatch, including the one that triggers the lockout
    pub async fn verify_pin(&self, session: &Session, pin: &str) -> AppResult<bool> {
        let user_id = session.require_user()?;
        let _serial = self.locks.lock(user_id).await;
        let user = self.load_user(user_id).await?;
        Ok(self.check(&user, pin).await? == Verification::Matched)
    }

    /// Gate in front of money-moving operations
    pub async fn authorize(&self, session: &Session, pin: &str) -> AppResult<()> {
        let user_id = session.require_user()?;
        let _serial = self.locks.lock(user_id).await;
        let user = self.load_user(user_id).await?;
        self.check(&user, pin).await?.into_result()
    }

    /// Forget the caller's own PIN
    pub async fn reset_pin(&self, session: &Session) -> AppResult<()> {
        let user_id = session.require_user()?;
        let _serial = self.locks.lock(user_id).await;
        self.store_hash(user_id, None).await?;
        info!(user_id = %user_id, "Transaction PIN reset by owner");
        Ok(())
    }

    pub async fn reset_pin_for_admin(&self, admin_session: &Session, user_id: Uuid) -> AppResult<()> {
        let admin_id = admin_session.require_user()?;
        let admin = self.load_user(admin_id).await?;
        if !admin.is_admin {
            warn!(actor = %admin_id, target = %user_id, "Non-admin attempted PIN reset");
            return Err(AppError::domain(DomainError::Forbidden {
                action: actions::RESET_USER_PIN.to_string(),
            }));
        }

        {
            let _serial = self.locks.lock(user_id).await;
            self.store_hash(user_id, None).await?;
        }
        self.audit
            .record(
                Some(admin_id),
                actions::RESET_USER_PIN,
                Some(user_id),
                json!({ "reset_at": self.clock.now() }),
            )
            .await?;
        info!(actor = %admin_id, target = %user_id, "Transaction PIN reset by admin");
        Ok(())
    }

    pub async fn pin_status(&self, session: &Session) -> AppResult<PinStatus> {
        let user_id = session.require_user()?;
        let user = self.load_user(user_id).await?;
        let now = self.clock.now();
        let is_locked = user.is_pin_locked(now);
        Ok(PinStatus {
            has_pin: user.has_pin(),
            is_locked,
            locked_until: user.pin_locked_until.filter(|_| is_locked),
            remaining_attempts: (self.policy.max_attempts - user.pin_failure_count).max(0),
        })
    }

    /// Lock-aware check shared by every entry point. A lock in force is an
    /// error and consumes no attempt. Callers hold the user's serial lock and
    /// pass a row loaded under it.
    async fn check(&self, user: &User, pin: &str) -> AppResult<Verification> {
        let now = self.clock.now();
        if let Some(locked_until) = user.pin_locked_until.filter(|until| *until > now) {
            return Err(AppError::domain(DomainError::AccountLocked { locked_until }));
        }
        let hash = user
            .pin_hash
            .clone()
            .ok_or_else(|| AppError::domain(DomainError::PinNotSet))?;

        self.attempt(user.id, pin, hash, now).await
    }

    async fn attempt(
        &self,
        user_id: Uuid,
        pin: &str,
        hash: String,
        now: DateTime<Utc>,
    ) -> AppResult<Verification> {
        if verify_hash(pin, hash).await? {
            if self.users.clear_pin_failures(user_id, now).await? {
                return Ok(Verification::Matched);
            }
            return Err(self.refused(user_id, now).await?);
        }

        let outcome = self
            .users
            .record_pin_failure(
                user_id,
                self.policy.max_attempts,
                now,
                now + self.policy.lockout(),
            )
            .await?
            .ok_or_else(|| user_not_found(user_id))?;

        match outcome {
            PinFailureOutcome::Counted { failure_count } => {
                let remaining_attempts = self.policy.max_attempts - failure_count;
                warn!(user_id = %user_id, remaining_attempts, "Incorrect transaction PIN");
                Ok(Verification::Mismatched { remaining_attempts })
            }
            PinFailureOutcome::LockedOut { locked_until } => {
                warn!(user_id = %user_id, locked_until = %locked_until, "PIN attempts exhausted, account locked");
                Ok(Verification::LockedOut { locked_until })
            }
            PinFailureOutcome::AlreadyLocked { locked_until } => {
                Err(AppError::domain(DomainError::AccountLocked { locked_until }))
            }
        }
    }

    /// Storage declined to clear the counter: another writer locked the
    /// account after this request loaded it, or the user is gone.
    async fn refused(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<AppError> {
        let user = self.load_user(user_id).await?;
        Ok(match user.pin_locked_until.filter(|until| *until > now) {
            Some(locked_until) => AppError::domain(DomainError::AccountLocked { locked_until }),
            None => AppError::internal("PIN counter update refused without a lock in force")
                .with_context("pin verification"),
        })
    }

    async fn load_user(&self, user_id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| user_not_found(user_id))
    }

    async fn store_hash(&self, user_id: Uuid, hash: Option<&str>) -> AppResult<()> {
        if self.users.set_pin_hash(user_id, hash).await? {
            Ok(())
        } else {
            Err(user_not_found(user_id))
        }
    }
}

/// 4 to 6 ASCII digits; anything else is rejected like a wrong PIN
pub fn validate_pin_format(pin: &str) -> AppResult<()> {
    let valid = (4..=6).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(AppError::domain(DomainError::InvalidPin {
            remaining_attempts: None,
        }))
    }
}

async fn hash_pin(pin: &str, cost: u32) -> AppResult<String> {
    let pin = pin.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(pin, cost))
        .await
        .map_err(|e| AppError::internal(e.to_string()).with_context("pin hashing"))?
        .map_err(|e| AppError::internal(e.to_string()).with_context("pin hashing"))
}

async fn verify_hash(pin: &str, hash: String) -> AppResult<bool> {
    let pin = pin.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(pin, &hash))
        .await
        .map_err(|e| AppError::internal(e.to_string()).with_context("pin verification"))?
        .map_err(|e| AppError::internal(e.to_string()).with_context("pin verification"))
}

fn user_not_found(user_id: Uuid) -> AppError {
    AppError::domain(DomainError::UserNotFound {
        user_id: user_id.to_string(),
    })
}
