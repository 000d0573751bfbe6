//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use sqlx::types::BigDecimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use vtu_settlement::config::AppConfig;
use vtu_settlement::database::memory::{
    InMemoryAuditLogRepository, InMemoryProviderSettingsRepository,
    InMemoryTransactionRepository, InMemoryUserRepository,
};
use vtu_settlement::database::provider_settings_repository::keys;
use vtu_settlement::database::repository::UserRepository;
use vtu_settlement::database::user_repository::User;
use vtu_settlement::payments::error::{ProviderError, ProviderResult};
use vtu_settlement::payments::types::{
    AirtimeRequest, CableRequest, CustomerVerification, DataRequest, ElectricityRequest,
    MeterValidationRequest, Network, ProviderResponse, SmartCardValidationRequest,
};
use vtu_settlement::payments::utils::VtuHttpClient;
use vtu_settlement::payments::{ProviderClient, VtuProvider};
use vtu_settlement::services::{Clock, PurchaseRequest, Session};
use vtu_settlement::{AppServices, Repositories};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Clock the tests move by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Provider double that answers every purchase with a configurable result
/// and records the references it was sent
pub struct MockProvider {
    result: Mutex<ProviderResult<ProviderResponse>>,
    calls: AtomicUsize,
    references: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    drain_on_call: Mutex<Option<(Arc<InMemoryUserRepository>, Uuid)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            result: Mutex::new(Ok(accepted(false))),
            calls: AtomicUsize::new(0),
            references: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            drain_on_call: Mutex::new(None),
        }
    }

    /// Empty the user's wallet while the vendor call is in flight
    pub fn drain_wallet_on_call(&self, users: Arc<InMemoryUserRepository>, user_id: Uuid) {
        *self.drain_on_call.lock().unwrap() = Some((users, user_id));
    }

    pub fn respond_with(&self, result: ProviderResult<ProviderResponse>) {
        *self.result.lock().unwrap() = result;
    }

    /// Hold every answer back for `delay`
    pub fn stall_for(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn references(&self) -> Vec<String> {
        self.references.lock().unwrap().clone()
    }

    async fn respond(&self, reference: &str) -> ProviderResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.references.lock().unwrap().push(reference.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let drain = self.drain_on_call.lock().unwrap().clone();
        if let Some((users, user_id)) = drain {
            let user = users.find_by_id(user_id).await.unwrap().unwrap();
            users
                .debit_wallet(user_id, &user.wallet_balance)
                .await
                .unwrap();
        }
        self.result.lock().unwrap().clone()
    }
}

pub fn accepted(pending: bool) -> ProviderResponse {
    ProviderResponse {
        success: true,
        provider: "naijadatasub".to_string(),
        provider_reference: Some(format!("NDS-{}", Uuid::new_v4().simple())),
        pending,
        message: Some("Transaction successful".to_string()),
        raw: json!({ "Status": if pending { "processing" } else { "successful" } }),
    }
}

pub fn rejected() -> ProviderError {
    ProviderError::rejected("naijadatasub", "Invalid phone number")
}

#[async_trait]
impl VtuProvider for MockProvider {
    async fn buy_airtime(
        &self,
        _: &AirtimeRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.respond(reference).await
    }

    async fn buy_data(&self, _: &DataRequest, reference: &str) -> ProviderResult<ProviderResponse> {
        self.respond(reference).await
    }

    async fn buy_electricity(
        &self,
        _: &ElectricityRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.respond(reference).await
    }

    async fn buy_cable(&self, _: &CableRequest, reference: &str) -> ProviderResult<ProviderResponse> {
        self.respond(reference).await
    }

    async fn validate_meter(
        &self,
        _: &MeterValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        Err(ProviderError::configuration("validation not mocked"))
    }

    async fn validate_smart_card(
        &self,
        _: &SmartCardValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        Err(ProviderError::configuration("validation not mocked"))
    }
}

/// Fully wired in-memory application with handles on every store
pub struct TestApp {
    pub services: AppServices,
    pub provider: Arc<MockProvider>,
    pub clock: Arc<ManualClock>,
    pub users: Arc<InMemoryUserRepository>,
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub audit_log: Arc<InMemoryAuditLogRepository>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(vec![(keys::NAIJADATASUB_WEBHOOK_SECRET, WEBHOOK_SECRET)])
    }

    pub fn with_settings(settings: Vec<(&str, &str)>) -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let audit_log = Arc::new(InMemoryAuditLogRepository::new());
        let provider_settings = Arc::new(InMemoryProviderSettingsRepository::with_settings(
            settings,
        ));
        let repos = Repositories {
            users: users.clone(),
            transactions: transactions.clone(),
            audit_log: audit_log.clone(),
            provider_settings: provider_settings.clone(),
        };

        let mut config = AppConfig::default();
        config.pin_policy.bcrypt_cost = 4;

        let provider = Arc::new(MockProvider::new());
        let clock = Arc::new(ManualClock::new());
        let http = VtuHttpClient::new(Duration::from_secs(1), 0).unwrap();
        let provider_client = Arc::new(ProviderClient::new(provider_settings, http));
        let services = AppServices::with_provider(
            &config,
            &repos,
            provider.clone(),
            provider_client,
            clock.clone(),
        );

        Self {
            services,
            provider,
            clock,
            users,
            transactions,
            audit_log,
        }
    }

    /// Create a profile holding `balance` naira and return its session
    pub async fn user_with_balance(&self, balance: i64) -> Session {
        let mut user = User::new(Uuid::new_v4());
        user.wallet_balance = BigDecimal::from(balance);
        self.users.create(&user).await.unwrap();
        Session::authenticated(user.id)
    }

    pub async fn admin(&self) -> Session {
        let mut user = User::new(Uuid::new_v4());
        user.is_admin = true;
        self.users.create(&user).await.unwrap();
        Session::authenticated(user.id)
    }

    pub async fn balance(&self, session: &Session) -> BigDecimal {
        self.services
            .ledger
            .get_balance(session.user_id().unwrap())
            .await
            .unwrap()
    }
}

pub fn airtime(amount: i64) -> PurchaseRequest {
    PurchaseRequest::Airtime(AirtimeRequest {
        network: Network::Mtn,
        amount: BigDecimal::from(amount),
        phone_number: "08031234567".to_string(),
    })
}

pub fn data_plan(plan: &str) -> PurchaseRequest {
    PurchaseRequest::Data(DataRequest {
        network: Network::Airtel,
        phone_number: "08021234567".to_string(),
        plan_external_id: plan.to_string(),
    })
}

pub fn naira(amount: i64) -> BigDecimal {
    BigDecimal::from(amount)
}
