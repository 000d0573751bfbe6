use crate::database::error::DatabaseError;
use crate::database::repository::{PinFailureOutcome, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

/// Customer profile with wallet and PIN state
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub wallet_balance: BigDecimal,
    #[serde(skip_serializing)]
    #[sqlx(rename = "transaction_pin")]
    pub pin_hash: Option<String>,
    pub pin_failure_count: i32,
    pub pin_locked_until: Option<DateTime<Utc>>,
    pub is_admin: bool,
}

impl User {
    /// A fresh profile with an empty wallet and no PIN
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            display_name: None,
            email: None,
            phone: None,
            wallet_balance: BigDecimal::from(0),
            pin_hash: None,
            pin_failure_count: 0,
            pin_locked_until: None,
            is_admin: false,
        }
    }

    pub fn has_pin(&self) -> bool {
        self.pin_hash.is_some()
    }

    pub fn is_pin_locked(&self, now: DateTime<Utc>) -> bool {
        self.pin_locked_until.is_some_and(|until| until > now)
    }
}

const USER_COLUMNS: &str = "id, display_name, email, phone, wallet_balance, transaction_pin, \
     pin_failure_count, pin_locked_until, is_admin";

/// Postgres-backed profiles
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock expiry when one is in force at `now`; `None` also for a missing user
    async fn current_lock(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let locked_until: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT pin_locked_until FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        Ok(locked_until.flatten().filter(|until| *until > now))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO profiles
             (id, display_name, email, phone, wallet_balance, transaction_pin,
              pin_failure_count, pin_locked_until, is_admin)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.wallet_balance)
        .bind(&user.pin_hash)
        .bind(user.pin_failure_count)
        .bind(user.pin_locked_until)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, DatabaseError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn debit_wallet(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<BigDecimal>, DatabaseError> {
        let row: Option<(BigDecimal,)> = sqlx::query_as(
            "UPDATE profiles
             SET wallet_balance = wallet_balance - $2
             WHERE id = $1 AND wallet_balance >= $2
             RETURNING wallet_balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|(balance,)| balance))
    }

    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> Result<Option<BigDecimal>, DatabaseError> {
        let row: Option<(BigDecimal,)> = sqlx::query_as(
            "UPDATE profiles
             SET wallet_balance = wallet_balance + $2
             WHERE id = $1
             RETURNING wallet_balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|(balance,)| balance))
    }

    async fn set_pin_hash(
        &self,
        user_id: Uuid,
        pin_hash: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE profiles
             SET transaction_pin = $2, pin_failure_count = 0, pin_locked_until = NULL
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(pin_hash)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_pin_failure(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<PinFailureOutcome>, DatabaseError> {
        // Every SET expression sees the pre-update row, so the threshold check
        // and the counter reset happen in one statement. A lock in force at
        // `now` matches no row and is reported from a follow-up read.
        let row: Option<(i32, Option<DateTime<Utc>>)> = sqlx::query_as(
            "UPDATE profiles
             SET pin_failure_count = CASE
                     WHEN pin_failure_count + 1 >= $2 THEN 0
                     ELSE pin_failure_count + 1
                 END,
                 pin_locked_until = CASE
                     WHEN pin_failure_count + 1 >= $2 THEN $4
                     ELSE NULL
                 END
             WHERE id = $1
               AND (pin_locked_until IS NULL OR pin_locked_until <= $3)
             RETURNING pin_failure_count, pin_locked_until",
        )
        .bind(user_id)
        .bind(max_attempts)
        .bind(now)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some((_, Some(locked_until))) => Ok(Some(PinFailureOutcome::LockedOut { locked_until })),
            Some((failure_count, None)) => Ok(Some(PinFailureOutcome::Counted { failure_count })),
            None => Ok(self.current_lock(user_id, now).await?.map(|locked_until| {
                PinFailureOutcome::AlreadyLocked { locked_until }
            })),
        }
    }

    async fn clear_pin_failures(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE profiles
             SET pin_failure_count = 0, pin_locked_until = NULL
             WHERE id = $1
               AND (pin_locked_until IS NULL OR pin_locked_until <= $2)",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}
