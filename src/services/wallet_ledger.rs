//! Wallet ledger
//!
//! The only writer of `wallet_balance`. Debits are conditional updates at the
//! storage layer, so the balance cannot go negative even across processes.
//! Every applied change is published on a broadcast channel for live UIs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::BigDecimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::repository::UserRepository;
use crate::error::{AppError, AppResult, DomainError};
use crate::services::clock::Clock;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceChange {
    Debit,
    Credit,
}

/// Published after every applied debit or credit
#[derive(Debug, Clone, Serialize)]
pub struct BalanceChanged {
    pub user_id: Uuid,
    pub new_balance: BigDecimal,
    pub delta: BigDecimal,
    pub change: BalanceChange,
    pub at: DateTime<Utc>,
}

/// Reject zero, negative and sub-kobo amounts
pub fn validate_amount(amount: &BigDecimal) -> AppResult<()> {
    let zero = BigDecimal::from(0);
    if *amount <= zero {
        return Err(AppError::domain(DomainError::InvalidAmount {
            amount: amount.to_string(),
            reason: "Amount must be greater than zero".to_string(),
        }));
    }
    if amount.with_scale(2) != *amount {
        return Err(AppError::domain(DomainError::InvalidAmount {
            amount: amount.to_string(),
            reason: "Amount cannot have more than 2 decimal places".to_string(),
        }));
    }
    Ok(())
}

pub struct WalletLedger {
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<BalanceChanged>,
}

impl WalletLedger {
    pub fn new(users: Arc<dyn UserRepository>, clock: Arc<dyn Clock>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            users,
            clock,
            events,
        }
    }

    /// Live balance feed. Slow receivers observe `Lagged` and should re-read
    /// the balance.
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceChanged> {
        self.events.subscribe()
    }

    pub async fn get_balance(&self, user_id: Uuid) -> AppResult<BigDecimal> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| user_not_found(user_id))?;
        Ok(user.wallet_balance)
    }

    pub async fn debit(&self, user_id: Uuid, amount: &BigDecimal) -> AppResult<BigDecimal> {
        validate_amount(amount)?;

        match self.users.debit_wallet(user_id, amount).await? {
            Some(new_balance) => {
                info!(
                    user_id = %user_id,
                    amount = %amount,
                    new_balance = %new_balance,
                    "Wallet debited"
                );
                self.publish(user_id, &new_balance, amount, BalanceChange::Debit);
                Ok(new_balance)
            }
            None => {
                // Distinguish a missing profile from a short balance
                let available = self.get_balance(user_id).await?;
                warn!(
                    user_id = %user_id,
                    amount = %amount,
                    available = %available,
                    "Debit refused: insufficient funds"
                );
                Err(AppError::domain(DomainError::InsufficientFunds {
                    available: available.to_string(),
                    required: amount.to_string(),
                }))
            }
        }
    }

    pub async fn credit(&self, user_id: Uuid, amount: &BigDecimal) -> AppResult<BigDecimal> {
        validate_amount(amount)?;

        let new_balance = self
            .users
            .credit_wallet(user_id, amount)
            .await?
            .ok_or_else(|| user_not_found(user_id))?;

        info!(
            user_id = %user_id,
            amount = %amount,
            new_balance = %new_balance,
            "Wallet credited"
        );
        self.publish(user_id, &new_balance, amount, BalanceChange::Credit);
        Ok(new_balance)
    }

    fn publish(
        &self,
        user_id: Uuid,
        new_balance: &BigDecimal,
        amount: &BigDecimal,
        change: BalanceChange,
    ) {
        let delta = match change {
            BalanceChange::Debit => -amount.clone(),
            BalanceChange::Credit => amount.clone(),
        };
        let event = BalanceChanged {
            user_id,
            new_balance: new_balance.clone(),
            delta,
            change,
            at: self.clock.now(),
        };
        // No subscribers is fine
        if self.events.send(event).is_err() {
            debug!(user_id = %user_id, "No balance subscribers");
        }
    }
}

fn user_not_found(user_id: Uuid) -> AppError {
    AppError::domain(DomainError::UserNotFound {
        user_id: user_id.to_string(),
    })
}
