//! Settlement engine
//!
//! Drives a purchase from PIN-checked intent to a settled record:
//!
//! 1. validate the amount and check the balance (no record on shortfall)
//! 2. append a `pending` record so the reference exists before the vendor call
//! 3. call the active provider under a timeout
//! 4. on success debit the wallet, on failure leave it untouched
//! 5. record the outcome in the transaction details
//!
//! Asynchronous outcomes reported by webhook go through
//! [`SettlementEngine::handle_async_settlement`], which is idempotent per
//! reference and refunds a debited wallet at most once.
//!
//! Every wallet-moving sequence for one user runs under that user's lock.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sqlx::types::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SettlementConfig;
use crate::database::repository::TransactionRepository;
use crate::database::transaction_repository::{
    NewTransaction, TransactionRecord, TransactionStatus, TransactionType,
};
use crate::error::{AppError, AppResult, DomainError};
use crate::logging::mask_account;
use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::provider::VtuProvider;
use crate::payments::types::{
    AirtimeRequest, CableRequest, DataRequest, ElectricityRequest, ProviderResponse,
};
use crate::services::audit::{actions, AuditTrail};
use crate::services::clock::Clock;
use crate::services::session::Session;
use crate::services::user_locks::UserLocks;
use crate::services::wallet_ledger::{validate_amount, WalletLedger};

const REFERENCE_ATTEMPTS: usize = 3;
const REFUND_REASON: &str = "Failed transaction refund";

/// A digital-service purchase the user confirmed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseRequest {
    Airtime(AirtimeRequest),
    Data(DataRequest),
    Electricity(ElectricityRequest),
    Cable(CableRequest),
}

impl PurchaseRequest {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            PurchaseRequest::Airtime(_) => TransactionType::Airtime,
            PurchaseRequest::Data(_) => TransactionType::Data,
            PurchaseRequest::Electricity(_) => TransactionType::Electricity,
            PurchaseRequest::Cable(_) => TransactionType::Cable,
        }
    }

    /// Face value carried by the request itself; plan-priced purchases have none
    pub fn request_amount(&self) -> Option<&BigDecimal> {
        match self {
            PurchaseRequest::Airtime(r) => Some(&r.amount),
            PurchaseRequest::Electricity(r) => Some(&r.amount),
            PurchaseRequest::Data(_) | PurchaseRequest::Cable(_) => None,
        }
    }

    /// Phone, meter or smart-card number the purchase is for
    pub fn target(&self) -> &str {
        match self {
            PurchaseRequest::Airtime(r) => &r.phone_number,
            PurchaseRequest::Data(r) => &r.phone_number,
            PurchaseRequest::Electricity(r) => &r.meter_number,
            PurchaseRequest::Cable(r) => &r.smart_card_number,
        }
    }
}

/// Final outcome reported by the vendor after an asynchronous purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub enum AsyncSettlement {
    /// This delivery settled the record; `refund` is set when the wallet was credited back
    Applied {
        record: TransactionRecord,
        refund: Option<TransactionRecord>,
    },
    /// An earlier delivery or a synchronous failure already settled it
    AlreadySettled(TransactionRecord),
}

/// `{PREFIX}-{uuid v4 as 32 uppercase hex}`
pub fn generate_reference(transaction_type: TransactionType) -> String {
    format!(
        "{}-{}",
        transaction_type.reference_prefix(),
        Uuid::new_v4().simple().to_string().to_uppercase()
    )
}

pub fn refund_reference(original_reference: &str) -> String {
    format!("{}-{}", TransactionType::Refund.reference_prefix(), original_reference)
}

pub struct SettlementEngine {
    ledger: Arc<WalletLedger>,
    provider: Arc<dyn VtuProvider>,
    transactions: Arc<dyn TransactionRepository>,
    audit: AuditTrail,
    locks: UserLocks,
    clock: Arc<dyn Clock>,
    provider_timeout: Duration,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<WalletLedger>,
        provider: Arc<dyn VtuProvider>,
        transactions: Arc<dyn TransactionRepository>,
        audit: AuditTrail,
        clock: Arc<dyn Clock>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            provider,
            transactions,
            audit,
            locks: UserLocks::new(),
            clock,
            provider_timeout: config.provider_timeout(),
        }
    }

    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    /// Buy a digital service and charge the wallet for it.
    ///
    /// Vendor failures come back as `Ok` with a `failed` record; only a
    /// configuration problem is also surfaced as an error.
    pub async fn purchase(
        &self,
        session: &Session,
        request: PurchaseRequest,
        amount: BigDecimal,
    ) -> AppResult<TransactionRecord> {
        let user_id = session.require_user()?;
        validate_amount(&amount)?;
        if let Some(face_value) = request.request_amount() {
            if *face_value != amount {
                return Err(AppError::domain(DomainError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: format!("must equal the requested amount {}", face_value),
                }));
            }
        }

        let _guard = self.locks.lock(user_id).await;

        let available = self.ledger.get_balance(user_id).await?;
        if available < amount {
            info!(
                user_id = %user_id,
                available = %available,
                required = %amount,
                "Purchase refused before provider call: insufficient funds"
            );
            return Err(AppError::domain(DomainError::InsufficientFunds {
                available: available.to_string(),
                required: amount.to_string(),
            }));
        }

        let record = self.insert_pending(user_id, &request, &amount).await?;
        info!(
            reference = %record.reference,
            user_id = %user_id,
            kind = %record.transaction_type,
            target = %mask_account(request.target()),
            amount = %amount,
            "Purchase started"
        );

        match self.call_provider(&request, &record.reference).await {
            Ok(response) => self.charge_after_success(record, response).await,
            Err(err) => self.record_provider_failure(record, err).await,
        }
    }

    /// Apply a vendor callback. Safe to call any number of times per reference.
    pub async fn handle_async_settlement(
        &self,
        reference: &str,
        outcome: SettlementOutcome,
        provider_payload: JsonValue,
    ) -> AppResult<AsyncSettlement> {
        let existing = self.find(reference).await?;
        if existing.is_settled() {
            info!(reference = %reference, status = %existing.status, "Settlement already applied");
            return Ok(AsyncSettlement::AlreadySettled(existing));
        }

        let _guard = self.locks.lock(existing.user_id).await;
        let now = self.clock.now();

        let (status, patch) = match outcome {
            SettlementOutcome::Success => (
                TransactionStatus::Success,
                json!({ "webhook_data": provider_payload, "completed_at": now }),
            ),
            SettlementOutcome::Failed => (
                TransactionStatus::Failed,
                json!({
                    "webhook_data": provider_payload,
                    "failure_reason": failure_reason_from_payload(&provider_payload),
                    "failed_at": now,
                }),
            ),
        };

        let Some(settled) = self.transactions.settle(reference, status, patch, now).await? else {
            info!(reference = %reference, "Concurrent delivery settled the record first");
            let current = self.find(reference).await?;
            return Ok(AsyncSettlement::AlreadySettled(current));
        };
        info!(reference = %reference, status = %settled.status, "Asynchronous settlement applied");

        let needs_refund = outcome == SettlementOutcome::Failed
            && settled.transaction_type.is_refundable()
            && settled.wallet_debited();
        if !needs_refund {
            return Ok(AsyncSettlement::Applied {
                record: settled,
                refund: None,
            });
        }

        let (record, refund) = self.refund(settled).await?;
        Ok(AsyncSettlement::Applied {
            record,
            refund: Some(refund),
        })
    }

    /// Credit a wallet top-up confirmed by the payment gateway
    pub async fn record_funding(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        external_reference: &str,
    ) -> AppResult<TransactionRecord> {
        validate_amount(&amount)?;
        let _guard = self.locks.lock(user_id).await;

        let record = self
            .insert_with_fresh_reference(
                user_id,
                TransactionType::WalletFunding,
                &amount,
                json!({ "external_reference": external_reference }),
            )
            .await?;

        match self.ledger.credit(user_id, &amount).await {
            Ok(new_balance) => {
                info!(
                    reference = %record.reference,
                    user_id = %user_id,
                    new_balance = %new_balance,
                    "Wallet funded"
                );
                let patch = json!({ "completed_at": self.clock.now() });
                self.finish(record, TransactionStatus::Success, patch).await
            }
            Err(e) => {
                error!(reference = %record.reference, error = %e.diagnostic(), "Wallet funding credit failed");
                let patch = json!({
                    "failure_reason": e.diagnostic(),
                    "failed_at": self.clock.now(),
                });
                self.finish(record, TransactionStatus::Failed, patch).await?;
                Err(e)
            }
        }
    }

    /// The caller's records, newest first
    pub async fn transactions_for(&self, session: &Session) -> AppResult<Vec<TransactionRecord>> {
        let user_id = session.require_user()?;
        Ok(self.transactions.list_for_user(user_id).await?)
    }

    async fn call_provider(
        &self,
        request: &PurchaseRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        let call = async {
            match request {
                PurchaseRequest::Airtime(r) => self.provider.buy_airtime(r, reference).await,
                PurchaseRequest::Data(r) => self.provider.buy_data(r, reference).await,
                PurchaseRequest::Electricity(r) => {
                    self.provider.buy_electricity(r, reference).await
                }
                PurchaseRequest::Cable(r) => self.provider.buy_cable(r, reference).await,
            }
        };
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::network(
                "unknown",
                format!(
                    "no response within {} seconds",
                    self.provider_timeout.as_secs()
                ),
            )),
        }
    }

    async fn charge_after_success(
        &self,
        record: TransactionRecord,
        response: ProviderResponse,
    ) -> AppResult<TransactionRecord> {
        let now = self.clock.now();
        match self.ledger.debit(record.user_id, &record.amount).await {
            Ok(_) => {
                let status = if response.pending {
                    TransactionStatus::Pending
                } else {
                    TransactionStatus::Success
                };
                info!(
                    reference = %record.reference,
                    provider = %response.provider,
                    status = %status,
                    "Purchase accepted by provider, wallet debited"
                );
                let mut patch = json!({
                    "provider": response.provider,
                    "provider_response": response.raw,
                    "provider_reference": response.provider_reference,
                    "provider_message": response.message,
                    "wallet_debited": true,
                });
                if status == TransactionStatus::Success {
                    patch["completed_at"] = json!(now);
                }
                let id = record.id;
                match self.transactions.update_outcome(id, status, patch).await? {
                    Some(updated) => Ok(updated),
                    None => self.flag_debit_after_settlement(record).await,
                }
            }
            Err(e) => {
                error!(
                    reference = %record.reference,
                    provider = %response.provider,
                    error = %e.diagnostic(),
                    "Provider delivered but wallet debit failed, reconciliation required"
                );
                let patch = json!({
                    "provider": response.provider,
                    "provider_response": response.raw,
                    "provider_reference": response.provider_reference,
                    "wallet_debited": false,
                    "reconciliation_required": true,
                    "reconciliation_reason": e.diagnostic(),
                    "completed_at": now,
                });
                let updated = self
                    .finish(record, TransactionStatus::Success, patch)
                    .await?;
                self.audit
                    .record_best_effort(
                        None,
                        actions::RECONCILIATION_FLAGGED,
                        Some(updated.user_id),
                        json!({
                            "reference": updated.reference,
                            "amount": updated.amount,
                            "reason": "wallet debit failed after provider success",
                        }),
                    )
                    .await;
                Ok(updated)
            }
        }
    }

    /// A callback from another process settled the record while this one was
    /// still debiting. Leave the money where it is and flag it.
    async fn flag_debit_after_settlement(
        &self,
        record: TransactionRecord,
    ) -> AppResult<TransactionRecord> {
        warn!(reference = %record.reference, "Record settled during debit, reconciliation required");
        let updated = self
            .transactions
            .merge_details(
                record.id,
                json!({ "wallet_debited": true, "reconciliation_required": true }),
            )
            .await?;
        self.audit
            .record_best_effort(
                None,
                actions::RECONCILIATION_FLAGGED,
                Some(updated.user_id),
                json!({
                    "reference": updated.reference,
                    "amount": updated.amount,
                    "reason": "record settled asynchronously while the wallet was debited",
                }),
            )
            .await;
        Ok(updated)
    }

    async fn record_provider_failure(
        &self,
        record: TransactionRecord,
        err: ProviderError,
    ) -> AppResult<TransactionRecord> {
        let provider = match &err {
            ProviderError::NetworkUnreachable { provider, .. }
            | ProviderError::ProviderRejected { provider, .. } => Some(provider.clone()),
            ProviderError::ConfigurationError { .. } => None,
        };
        let patch = json!({
            "provider": provider,
            "failure_kind": err.kind(),
            "failure_reason": err.failure_reason(),
            "wallet_debited": false,
            "failed_at": self.clock.now(),
        });

        let reference = record.reference.clone();
        let updated = self.finish(record, TransactionStatus::Failed, patch).await?;

        match err {
            ProviderError::ConfigurationError { .. } => {
                error!(
                    reference = %reference,
                    error = %err,
                    "Purchase failed: provider configuration"
                );
                Err(AppError::from(err).with_context(format!("purchase {}", reference)))
            }
            _ => {
                warn!(
                    reference = %reference,
                    failure_kind = err.kind(),
                    error = %err,
                    "Purchase failed at provider, wallet untouched"
                );
                Ok(updated)
            }
        }
    }

    async fn refund(
        &self,
        original: TransactionRecord,
    ) -> AppResult<(TransactionRecord, TransactionRecord)> {
        if let Err(e) = self.ledger.credit(original.user_id, &original.amount).await {
            self.flag_refund_failure(&original, &e).await;
            return Err(e);
        }

        let now = self.clock.now();
        let new = NewTransaction {
            user_id: original.user_id,
            transaction_type: TransactionType::Refund,
            amount: original.amount.clone(),
            status: TransactionStatus::Success,
            reference: refund_reference(&original.reference),
            details: json!({
                "original_reference": original.reference,
                "original_transaction_id": original.id,
                "reason": REFUND_REASON,
                "refunded_at": now,
            }),
        };
        let refund = match self.transactions.insert(new).await {
            Ok(refund) => refund,
            Err(e) => {
                let e = AppError::from(e).with_context("refund record");
                self.flag_refund_failure(&original, &e).await;
                return Err(e);
            }
        };

        let original = self
            .transactions
            .merge_details(original.id, json!({ "refund_reference": refund.reference }))
            .await?;
        info!(
            reference = %original.reference,
            refund_reference = %refund.reference,
            amount = %refund.amount,
            "Failed purchase refunded"
        );
        Ok((original, refund))
    }

    async fn flag_refund_failure(&self, original: &TransactionRecord, e: &AppError) {
        error!(
            reference = %original.reference,
            error = %e.diagnostic(),
            "Refund failed, reconciliation required"
        );
        if let Err(flag_err) = self
            .transactions
            .merge_details(
                original.id,
                json!({ "reconciliation_required": true, "refund_error": e.diagnostic() }),
            )
            .await
        {
            error!(reference = %original.reference, error = %flag_err, "Failed to flag refund failure");
        }
        self.audit
            .record_best_effort(
                None,
                actions::REFUND_FAILED,
                Some(original.user_id),
                json!({
                    "reference": original.reference,
                    "amount": original.amount,
                    "error": e.diagnostic(),
                }),
            )
            .await;
    }

    async fn insert_pending(
        &self,
        user_id: Uuid,
        request: &PurchaseRequest,
        amount: &BigDecimal,
    ) -> AppResult<TransactionRecord> {
        self.insert_with_fresh_reference(
            user_id,
            request.transaction_type(),
            amount,
            json!({ "request": request, "wallet_debited": false }),
        )
        .await
    }

    async fn insert_with_fresh_reference(
        &self,
        user_id: Uuid,
        transaction_type: TransactionType,
        amount: &BigDecimal,
        details: JsonValue,
    ) -> AppResult<TransactionRecord> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let new = NewTransaction {
                user_id,
                transaction_type,
                amount: amount.clone(),
                status: TransactionStatus::Pending,
                reference: generate_reference(transaction_type),
                details: details.clone(),
            };
            match self.transactions.insert(new).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_unique_violation() && attempt < REFERENCE_ATTEMPTS => {
                    warn!(attempt, "Transaction reference collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record a synchronous outcome unless a callback already settled the record
    async fn finish(
        &self,
        record: TransactionRecord,
        status: TransactionStatus,
        patch: JsonValue,
    ) -> AppResult<TransactionRecord> {
        match self.transactions.update_outcome(record.id, status, patch).await? {
            Some(updated) => Ok(updated),
            None => self.find(&record.reference).await,
        }
    }

    async fn find(&self, reference: &str) -> AppResult<TransactionRecord> {
        self.transactions
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::TransactionNotFound {
                    reference: reference.to_string(),
                })
            })
    }
}

fn failure_reason_from_payload(payload: &JsonValue) -> String {
    let scopes = [payload.get("data"), Some(payload)];
    scopes
        .into_iter()
        .flatten()
        .find_map(|scope| {
            ["reason", "message", "error"]
                .iter()
                .find_map(|key| scope.get(*key).and_then(|v| v.as_str()))
        })
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown failure reason".to_string())
}
