//! In-memory repositories for tests and `SKIP_EXTERNALS=true` runs
//!
//! Each conditional update runs under a single write lock, which gives the
//! same atomicity as the corresponding SQL statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::audit_log_repository::{AuditEntry, NewAuditEntry};
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    AuditLogRepository, PinFailureOutcome, ProviderSettingsRepository, TransactionRepository,
    UserRepository,
};
use crate::database::transaction_repository::{
    NewTransaction, TransactionRecord, TransactionStatus,
};
use crate::database::user_repository::User;

/// Top-level object merge, same as jsonb `||`
pub(crate) fn merge_json(target: &mut JsonValue, patch: JsonValue) {
    match (target.as_object_mut(), patch) {
        (Some(existing), JsonValue::Object(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key, value);
            }
        }
        (_, patch) => *target = patch,
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<User, DatabaseError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "profiles_pkey".to_string(),
            }));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn debit_wallet(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<BigDecimal>, DatabaseError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user_id) {
            Some(user) if user.wallet_balance >= *amount => {
                user.wallet_balance = &user.wallet_balance - amount;
                Ok(Some(user.wallet_balance.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<BigDecimal>, DatabaseError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&user_id).map(|user| {
            user.wallet_balance = &user.wallet_balance + amount;
            user.wallet_balance.clone()
        }))
    }

    async fn set_pin_hash(
        &self,
        user_id: Uuid,
        pin_hash: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let mut users = self.users.write().await;
        Ok(match users.get_mut(&user_id) {
            Some(user) => {
                user.pin_hash = pin_hash.map(str::to_string);
                user.pin_failure_count = 0;
                user.pin_locked_until = None;
                true
            }
            None => false,
        })
    }

    async fn record_pin_failure(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<PinFailureOutcome>, DatabaseError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&user_id).map(|user| {
            if let Some(locked_until) = user.pin_locked_until.filter(|until| *until > now) {
                return PinFailureOutcome::AlreadyLocked { locked_until };
            }
            if user.pin_failure_count + 1 >= max_attempts {
                user.pin_failure_count = 0;
                user.pin_locked_until = Some(lock_until);
                PinFailureOutcome::LockedOut {
                    locked_until: lock_until,
                }
            } else {
                user.pin_failure_count += 1;
                PinFailureOutcome::Counted {
                    failure_count: user.pin_failure_count,
                }
            }
        }))
    }

    async fn clear_pin_failures(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut users = self.users.write().await;
        Ok(match users.get_mut(&user_id) {
            Some(user) if !user.is_pin_locked(now) => {
                user.pin_failure_count = 0;
                user.pin_locked_until = None;
                true
            }
            _ => false,
        })
    }
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    records: RwLock<Vec<TransactionRecord>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, in insertion order
    pub async fn all(&self) -> Vec<TransactionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, new: NewTransaction) -> Result<TransactionRecord, DatabaseError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.reference == new.reference) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "transactions_reference_key".to_string(),
            }));
        }
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            transaction_type: new.transaction_type,
            amount: new.amount,
            status: new.status,
            reference: new.reference,
            details: new.details,
            created_at: Utc::now(),
            settled_at: None,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.reference == reference)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TransactionRecord>, DatabaseError> {
        // Insertion order breaks timestamp ties
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_outcome(
        &self,
        id: Uuid,
        status: TransactionStatus,
        details_patch: JsonValue,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .find(|r| r.id == id && r.settled_at.is_none())
            .map(|record| {
                record.status = status;
                merge_json(&mut record.details, details_patch);
                record.clone()
            }))
    }

    async fn settle(
        &self,
        reference: &str,
        status: TransactionStatus,
        details_patch: JsonValue,
        settled_at: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .find(|r| r.reference == reference && !r.is_settled())
            .map(|record| {
                record.status = status;
                record.settled_at = Some(settled_at);
                merge_json(&mut record.details, details_patch);
                record.clone()
            }))
    }

    async fn merge_details(
        &self,
        id: Uuid,
        details_patch: JsonValue,
    ) -> Result<TransactionRecord, DatabaseError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DatabaseError::not_found("transaction", id))?;
        merge_json(&mut record.details, details_patch);
        Ok(record.clone())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError> {
        let stored = AuditEntry {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            action: entry.action,
            target_user_id: entry.target_user_id,
            details: entry.details,
            created_at: Utc::now(),
        };
        self.entries.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>, DatabaseError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProviderSettingsRepository {
    settings: RwLock<HashMap<String, String>>,
}

impl InMemoryProviderSettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings<I, K, V>(settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            settings: RwLock::new(
                settings
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ProviderSettingsRepository for InMemoryProviderSettingsRepository {
    async fn get_settings(&self, keys: &[String]) -> Result<HashMap<String, String>, DatabaseError> {
        let settings = self.settings.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| settings.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::transaction_repository::TransactionType;
    use serde_json::json;

    fn new_tx(user_id: Uuid, reference: &str) -> NewTransaction {
        NewTransaction {
            user_id,
            transaction_type: TransactionType::Data,
            amount: BigDecimal::from(500),
            status: TransactionStatus::Pending,
            reference: reference.to_string(),
            details: json!({"request": {"plan": "1"}}),
        }
    }

    #[test]
    fn merge_json_overwrites_top_level_keys_only() {
        let mut target = json!({"a": 1, "nested": {"x": 1}});
        merge_json(&mut target, json!({"b": 2, "nested": {"y": 2}}));
        assert_eq!(target, json!({"a": 1, "b": 2, "nested": {"y": 2}}));
    }

    #[tokio::test]
    async fn debit_refuses_to_overdraw() {
        let repo = InMemoryUserRepository::new();
        let mut user = User::new(Uuid::new_v4());
        user.wallet_balance = BigDecimal::from(100);
        repo.create(&user).await.unwrap();

        assert_eq!(
            repo.debit_wallet(user.id, &BigDecimal::from(150)).await.unwrap(),
            None
        );
        assert_eq!(
            repo.debit_wallet(user.id, &BigDecimal::from(100)).await.unwrap(),
            Some(BigDecimal::from(0))
        );
    }

    #[tokio::test]
    async fn duplicate_reference_is_a_unique_violation() {
        let repo = InMemoryTransactionRepository::new();
        let user_id = Uuid::new_v4();
        repo.insert(new_tx(user_id, "DAT-1")).await.unwrap();
        let err = repo.insert(new_tx(user_id, "DAT-1")).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn settle_is_compare_and_set() {
        let repo = InMemoryTransactionRepository::new();
        repo.insert(new_tx(Uuid::new_v4(), "DAT-2")).await.unwrap();

        let first = repo
            .settle("DAT-2", TransactionStatus::Failed, json!({"failure_reason": "x"}), Utc::now())
            .await
            .unwrap();
        assert!(first.is_some());

        let second = repo
            .settle("DAT-2", TransactionStatus::Failed, json!({}), Utc::now())
            .await
            .unwrap();
        assert!(second.is_none());

        let stored = repo.find_by_reference("DAT-2").await.unwrap().unwrap();
        assert_eq!(stored.details["request"]["plan"], "1");
        assert_eq!(stored.details["failure_reason"], "x");
    }

    #[tokio::test]
    async fn settled_record_rejects_synchronous_outcome() {
        let repo = InMemoryTransactionRepository::new();
        let record = repo.insert(new_tx(Uuid::new_v4(), "DAT-3")).await.unwrap();
        repo.settle("DAT-3", TransactionStatus::Success, json!({}), Utc::now())
            .await
            .unwrap();

        let outcome = repo
            .update_outcome(record.id, TransactionStatus::Failed, json!({}))
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn pin_failures_lock_at_threshold() {
        let repo = InMemoryUserRepository::new();
        let user = User::new(Uuid::new_v4());
        repo.create(&user).await.unwrap();
        let now = Utc::now();
        let until = now + chrono::Duration::minutes(15);

        for expected in 1..3 {
            let outcome = repo
                .record_pin_failure(user.id, 3, now, until)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(outcome, PinFailureOutcome::Counted { failure_count: expected });
        }
        let outcome = repo
            .record_pin_failure(user.id, 3, now, until)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PinFailureOutcome::LockedOut { locked_until: until });
    }

    #[tokio::test]
    async fn pin_counters_are_frozen_while_locked() {
        let repo = InMemoryUserRepository::new();
        let user = User::new(Uuid::new_v4());
        repo.create(&user).await.unwrap();
        let now = Utc::now();
        let until = now + chrono::Duration::minutes(15);
        repo.record_pin_failure(user.id, 1, now, until).await.unwrap();

        let later = now + chrono::Duration::minutes(1);
        let outcome = repo
            .record_pin_failure(user.id, 1, later, later + chrono::Duration::minutes(15))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PinFailureOutcome::AlreadyLocked { locked_until: until });
        assert!(!repo.clear_pin_failures(user.id, later).await.unwrap());
        let stored = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.pin_locked_until, Some(until));

        // Once the window has passed the counter may be cleared again
        assert!(repo.clear_pin_failures(user.id, until).await.unwrap());
        let stored = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.pin_locked_until, None);
    }

    #[tokio::test]
    async fn pin_updates_for_missing_user() {
        let repo = InMemoryUserRepository::new();
        let now = Utc::now();
        assert!(repo
            .record_pin_failure(Uuid::new_v4(), 3, now, now)
            .await
            .unwrap()
            .is_none());
        assert!(!repo.clear_pin_failures(Uuid::new_v4(), now).await.unwrap());
    }
}
