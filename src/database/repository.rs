//! Storage seams for the settlement core
//!
//! Ledger, PIN guard and settlement engine depend on these traits only. Each
//! trait has a Postgres implementation next to its entity and an in-memory
//! implementation in [`crate::database::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::audit_log_repository::{AuditEntry, NewAuditEntry};
use crate::database::error::DatabaseError;
use crate::database::transaction_repository::{
    NewTransaction, TransactionRecord, TransactionStatus,
};
use crate::database::user_repository::User;

/// PIN counter state after a failure was offered to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinFailureOutcome {
    /// Counted without reaching the threshold
    Counted { failure_count: i32 },
    /// This failure reached the threshold and started a lockout
    LockedOut { locked_until: DateTime<Utc> },
    /// A lockout was already in force; nothing was counted
    AlreadyLocked { locked_until: DateTime<Utc> },
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User, DatabaseError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, DatabaseError>;

    /// Conditional decrement. `None` when the user is missing or the balance
    /// does not cover `amount`; the balance is untouched in that case.
    async fn debit_wallet(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<BigDecimal>, DatabaseError>;

    /// `None` when the user is missing
    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<BigDecimal>, DatabaseError>;

    /// Store or clear the PIN hash; always resets the failure counter and lockout.
    /// Returns false when the user is missing.
    async fn set_pin_hash(&self, user_id: Uuid, pin_hash: Option<&str>)
        -> Result<bool, DatabaseError>;

    /// Atomically count one failure unless a lockout is in force at `now`.
    /// Reaching `max_attempts` resets the counter and sets the lockout to
    /// `lock_until`. `None` when the user is missing.
    async fn record_pin_failure(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<PinFailureOutcome>, DatabaseError>;

    /// Reset the counter unless a lockout is in force at `now`.
    /// Returns false when nothing was cleared.
    async fn clear_pin_failures(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Fails with a unique violation when the reference already exists
    async fn insert(&self, new: NewTransaction) -> Result<TransactionRecord, DatabaseError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, DatabaseError>;

    /// Newest first
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TransactionRecord>, DatabaseError>;

    /// Synchronous outcome of a purchase. Merges `details_patch` into details.
    /// `None` when an asynchronous settlement already landed on the record.
    async fn update_outcome(
        &self,
        id: Uuid,
        status: TransactionStatus,
        details_patch: JsonValue,
    ) -> Result<Option<TransactionRecord>, DatabaseError>;

    /// Compare-and-set on an unsettled, non-failed record. `None` means another
    /// delivery got there first.
    async fn settle(
        &self,
        reference: &str,
        status: TransactionStatus,
        details_patch: JsonValue,
        settled_at: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, DatabaseError>;

    /// Merge details without touching status
    async fn merge_details(
        &self,
        id: Uuid,
        details_patch: JsonValue,
    ) -> Result<TransactionRecord, DatabaseError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError>;

    /// Newest first
    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>, DatabaseError>;
}

#[async_trait]
pub trait ProviderSettingsRepository: Send + Sync {
    /// Values for the requested keys; absent or null keys are omitted
    async fn get_settings(&self, keys: &[String]) -> Result<HashMap<String, String>, DatabaseError>;

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}
