use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::TransactionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Airtime,
    Data,
    Electricity,
    Cable,
    WalletFunding,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Airtime => "airtime",
            TransactionType::Data => "data",
            TransactionType::Electricity => "electricity",
            TransactionType::Cable => "cable",
            TransactionType::WalletFunding => "wallet_funding",
            TransactionType::Refund => "refund",
        }
    }

    /// Prefix used when generating references for this type
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            TransactionType::Airtime => "AIR",
            TransactionType::Data => "DAT",
            TransactionType::Electricity => "ELC",
            TransactionType::Cable => "CAB",
            TransactionType::WalletFunding => "FND",
            TransactionType::Refund => "REFUND",
        }
    }

    /// Whether a failed settlement of this type returns money to the wallet
    pub fn is_refundable(&self) -> bool {
        !matches!(
            self,
            TransactionType::WalletFunding | TransactionType::Refund
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "airtime" => Ok(TransactionType::Airtime),
            "data" => Ok(TransactionType::Data),
            "electricity" => Ok(TransactionType::Electricity),
            "cable" => Ok(TransactionType::Cable),
            "wallet_funding" => Ok(TransactionType::WalletFunding),
            "refund" => Ok(TransactionType::Refund),
            other => Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown transaction type: {}", other),
            })),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown transaction status: {}", other),
            })),
        }
    }
}

/// One attempted money movement
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub status: TransactionStatus,
    pub reference: String,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Failed, or already settled by an asynchronous callback
    pub fn is_settled(&self) -> bool {
        self.status == TransactionStatus::Failed || self.settled_at.is_some()
    }

    pub fn requires_reconciliation(&self) -> bool {
        self.detail_flag("reconciliation_required")
    }

    pub fn wallet_debited(&self) -> bool {
        self.detail_flag("wallet_debited")
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.details.get("failure_reason").and_then(|v| v.as_str())
    }

    fn detail_flag(&self, key: &str) -> bool {
        self.details
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Fields supplied when appending a record
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub status: TransactionStatus,
    pub reference: String,
    pub details: JsonValue,
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    #[sqlx(rename = "type")]
    transaction_type: String,
    amount: BigDecimal,
    status: String,
    reference: String,
    details: JsonValue,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(TransactionRecord {
            id: row.id,
            user_id: row.user_id,
            transaction_type: row.transaction_type.parse()?,
            amount: row.amount,
            status: row.status.parse()?,
            reference: row.reference,
            details: row.details,
            created_at: row.created_at,
            settled_at: row.settled_at,
        })
    }
}

const TRANSACTION_COLUMNS: &str =
    "id, user_id, type, amount, status, reference, details, created_at, settled_at";

/// Postgres-backed transaction log
pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn insert(&self, new: NewTransaction) -> Result<TransactionRecord, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO transactions (user_id, type, amount, status, reference, details)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(new.user_id)
        .bind(new.transaction_type.as_str())
        .bind(&new.amount)
        .bind(new.status.as_str())
        .bind(&new.reference)
        .bind(&new.details)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .try_into()
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(TryInto::try_into)
        .transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE user_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
    }

    async fn update_outcome(
        &self,
        id: Uuid,
        status: TransactionStatus,
        details_patch: JsonValue,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "UPDATE transactions
             SET status = $2, details = details || $3
             WHERE id = $1 AND settled_at IS NULL
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(details_patch)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(TryInto::try_into)
        .transpose()
    }

    async fn settle(
        &self,
        reference: &str,
        status: TransactionStatus,
        details_patch: JsonValue,
        settled_at: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "UPDATE transactions
             SET status = $2, details = details || $3, settled_at = $4
             WHERE reference = $1 AND settled_at IS NULL AND status <> 'failed'
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(reference)
        .bind(status.as_str())
        .bind(details_patch)
        .bind(settled_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(TryInto::try_into)
        .transpose()
    }

    async fn merge_details(
        &self,
        id: Uuid,
        details_patch: JsonValue,
    ) -> Result<TransactionRecord, DatabaseError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "UPDATE transactions
             SET details = details || $2
             WHERE id = $1
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(details_patch)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| DatabaseError::not_found("transaction", id))?
        .try_into()
    }
}
