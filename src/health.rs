//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::payments::ProviderClient;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    /// Degraded still serves traffic
    pub fn is_serving(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}


/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    /// `None` when running on in-memory repositories
    db_pool: Option<sqlx::PgPool>,
    provider: Arc<ProviderClient>,
}

impl HealthChecker {
    pub fn new(db_pool: Option<sqlx::PgPool>, provider: Arc<ProviderClient>) -> Self {
        Self { db_pool, provider }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut overall_healthy = true;
        let mut degraded = false;

        match &self.db_pool {
            Some(pool) => match timeout(Duration::from_secs(5), check_database_health(pool)).await {
                Ok(Ok(response_time)) => {
                    health_status.checks.insert(
                        "database".to_string(),
                        ComponentHealth::up(Some(response_time)),
                    );
                    info!("Database health check: OK ({}ms)", response_time);
                }
                Ok(Err(e)) => {
                    overall_healthy = false;
                    health_status.checks.insert(
                        "database".to_string(),
                        ComponentHealth::down(Some(e.to_string())),
                    );
                    error!("Database health check failed: {}", e);
                }
                Err(_) => {
                    overall_healthy = false;
                    health_status.checks.insert(
                        "database".to_string(),
                        ComponentHealth::down(Some("Timeout".to_string())),
                    );
                    error!("Database health check timed out");
                }
            },
            None => {
                degraded = true;
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::warning(None, Some("in-memory repositories".to_string())),
                );
            }
        }

        // Settings are read per call, so this reflects what the next purchase will use
        let start = Instant::now();
        match timeout(Duration::from_secs(5), self.provider.resolve_active()).await {
            Ok(Ok((provider, _))) => {
                let mut component = ComponentHealth::up(Some(start.elapsed().as_millis()));
                component.details = Some(provider.to_string());
                health_status.checks.insert("provider".to_string(), component);
            }
            Ok(Err(e)) => {
                degraded = true;
                health_status.checks.insert(
                    "provider".to_string(),
                    ComponentHealth::warning(None, Some(e.to_string())),
                );
                warn!("Provider configuration check failed: {}", e);
            }
            Err(_) => {
                degraded = true;
                health_status.checks.insert(
                    "provider".to_string(),
                    ComponentHealth::warning(None, Some("Timeout".to_string())),
                );
                warn!("Provider configuration check timed out");
            }
        }

        health_status.status = if !overall_healthy {
            HealthState::Unhealthy
        } else if degraded {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        health_status
    }
}

pub async fn check_database_health(
    pool: &sqlx::PgPool,
) -> Result<u128, Box<dyn std::error::Error + Send + Sync>> {
    let start = Instant::now();
    crate::database::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryProviderSettingsRepository;
    use crate::payments::utils::VtuHttpClient;

    fn provider(settings: InMemoryProviderSettingsRepository) -> Arc<ProviderClient> {
        Arc::new(ProviderClient::new(
            Arc::new(settings),
            VtuHttpClient::new(Duration::from_secs(1), 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));
    }

    #[tokio::test]
    async fn test_in_memory_with_configured_provider_is_degraded_but_serving() {
        let checker = HealthChecker::new(
            None,
            provider(InMemoryProviderSettingsRepository::with_settings([
                ("naijadatasub_token", "live-token"),
                ("naijadatasub_base_url", "https://n.example"),
            ])),
        );

        let status = checker.check_health().await;
        assert!(matches!(status.status, HealthState::Degraded));
        assert!(status.is_serving());
        assert!(matches!(status.checks["provider"].status, ComponentState::Up));
        assert_eq!(
            status.checks["provider"].details.as_deref(),
            Some("naijadatasub")
        );
    }

    #[tokio::test]
    async fn test_missing_provider_credentials_are_reported() {
        let checker = HealthChecker::new(None, provider(InMemoryProviderSettingsRepository::new()));

        let status = checker.check_health().await;
        assert!(matches!(
            status.checks["provider"].status,
            ComponentState::Warning
        ));
    }
}
