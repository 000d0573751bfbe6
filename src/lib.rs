//! Wallet ledger and settlement core for a VTU storefront (airtime, data,
//! electricity and cable TV).
//!
//! Components are plain structs over repository traits, so the same wiring
//! runs against Postgres in production and in-memory repositories in tests.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;

use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::database::audit_log_repository::PgAuditLogRepository;
use crate::database::memory::{
    InMemoryAuditLogRepository, InMemoryProviderSettingsRepository,
    InMemoryTransactionRepository, InMemoryUserRepository,
};
use crate::database::provider_settings_repository::PgProviderSettingsRepository;
use crate::database::repository::{
    AuditLogRepository, ProviderSettingsRepository, TransactionRepository, UserRepository,
};
use crate::database::transaction_repository::PgTransactionRepository;
use crate::database::user_repository::PgUserRepository;
use crate::health::HealthChecker;
use crate::payments::utils::VtuHttpClient;
use crate::payments::{ProviderClient, ProviderResult, VtuProvider};
use crate::services::{
    AuditTrail, Clock, PinGuard, SettlementEngine, SystemClock, WalletLedger, WebhookProcessor,
};

/// One implementation per storage seam
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub audit_log: Arc<dyn AuditLogRepository>,
    pub provider_settings: Arc<dyn ProviderSettingsRepository>,
}

impl Repositories {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            transactions: Arc::new(PgTransactionRepository::new(pool.clone())),
            audit_log: Arc::new(PgAuditLogRepository::new(pool.clone())),
            provider_settings: Arc::new(PgProviderSettingsRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::new()),
            transactions: Arc::new(InMemoryTransactionRepository::new()),
            audit_log: Arc::new(InMemoryAuditLogRepository::new()),
            provider_settings: Arc::new(InMemoryProviderSettingsRepository::new()),
        }
    }
}

/// Fully wired service graph
#[derive(Clone)]
pub struct AppServices {
    pub ledger: Arc<WalletLedger>,
    pub pin_guard: Arc<PinGuard>,
    pub engine: Arc<SettlementEngine>,
    pub webhooks: Arc<WebhookProcessor>,
    pub provider_client: Arc<ProviderClient>,
    pub audit: AuditTrail,
}

impl AppServices {
    /// Wire the services around the settings-driven [`ProviderClient`]
    pub fn build(config: &AppConfig, repos: &Repositories) -> ProviderResult<Self> {
        let http = VtuHttpClient::new(
            config.settlement.provider_timeout(),
            config.settlement.provider_max_retries,
        )?;
        let provider_client = Arc::new(
            ProviderClient::new(repos.provider_settings.clone(), http)
                .with_fallback(config.provider_fallback.settings.clone()),
        );
        Ok(Self::with_provider(
            config,
            repos,
            provider_client.clone(),
            provider_client,
            Arc::new(SystemClock),
        ))
    }

    /// Same wiring with an explicit purchase backend and clock
    pub fn with_provider(
        config: &AppConfig,
        repos: &Repositories,
        provider: Arc<dyn VtuProvider>,
        provider_client: Arc<ProviderClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let audit = AuditTrail::new(repos.audit_log.clone());
        let ledger = Arc::new(WalletLedger::new(repos.users.clone(), clock.clone()));
        let pin_guard = Arc::new(PinGuard::new(
            repos.users.clone(),
            audit.clone(),
            clock.clone(),
            config.pin_policy.clone(),
        ));
        let engine = Arc::new(SettlementEngine::new(
            ledger.clone(),
            provider,
            repos.transactions.clone(),
            audit.clone(),
            clock,
            &config.settlement,
        ));
        let webhooks = Arc::new(WebhookProcessor::new(
            engine.clone(),
            repos.provider_settings.clone(),
            config.webhook.naijadatasub_secret.clone(),
            audit.clone(),
        ));

        Self {
            ledger,
            pin_guard,
            engine,
            webhooks,
            provider_client,
            audit,
        }
    }
}

/// HTTP router with request ids and request tracing
pub fn build_router(services: &AppServices, db_pool: Option<sqlx::PgPool>) -> Router {
    let webhook_state = Arc::new(api::webhooks::WebhookState {
        processor: services.webhooks.clone(),
    });
    let health_checker = Arc::new(HealthChecker::new(
        db_pool,
        services.provider_client.clone(),
    ));

    api::router(webhook_state, health_checker).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}
