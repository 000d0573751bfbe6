//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Absent when running with `SKIP_EXTERNALS=true`
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub settlement: SettlementConfig,
    pub pin_policy: PinPolicyConfig,
    pub webhook: WebhookConfig,
    pub provider_fallback: ProviderFallbackConfig,
    pub skip_externals: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Provider call limits used by the settlement engine
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub provider_timeout_secs: u64,
    /// Retries for read-only validation calls; purchases are never retried
    pub provider_max_retries: u32,
}

/// Longest accepted PIN lockout: one week
pub const MAX_PIN_LOCKOUT_MINUTES: i64 = 7 * 24 * 60;
pub const MAX_PIN_ATTEMPTS: i32 = 20;

/// Transaction PIN lockout policy
#[derive(Debug, Clone)]
pub struct PinPolicyConfig {
    pub max_attempts: i32,
    pub lockout_minutes: i64,
    pub bcrypt_cost: u32,
}

/// Webhook verification settings
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Used when the settings table has no `naijadatasub_webhook_secret`
    pub naijadatasub_secret: Option<String>,
}

/// Provider settings taken from the environment when the settings table lacks them
#[derive(Debug, Clone, Default)]
pub struct ProviderFallbackConfig {
    pub settings: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: if skip_externals {
                None
            } else {
                Some(DatabaseConfig::from_env()?)
            },
            logging: LoggingConfig::from_env()?,
            settlement: SettlementConfig::from_env()?,
            pin_policy: PinPolicyConfig::from_env()?,
            webhook: WebhookConfig::from_env(),
            provider_fallback: ProviderFallbackConfig::from_env(),
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.settlement.validate()?;
        self.pin_policy.validate()?;

        Ok(())
    }
}

impl Default for AppConfig {
    /// Local defaults: in-memory storage, no provider credentials
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            database: None,
            logging: LoggingConfig::default(),
            settlement: SettlementConfig::default(),
            pin_policy: PinPolicyConfig::default(),
            webhook: WebhookConfig::default(),
            provider_fallback: ProviderFallbackConfig::default(),
            skip_externals: true,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: 30,
            provider_max_retries: 2,
        }
    }
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SettlementConfig {
            provider_timeout_secs: parse_var("PROVIDER_TIMEOUT_SECS", "30")?,
            provider_max_retries: parse_var("PROVIDER_MAX_RETRIES", "2")?,
        })
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_timeout_secs == 0 || self.provider_timeout_secs > 120 {
            return Err(ConfigError::ValidationFailed(
                "PROVIDER_TIMEOUT_SECS must be between 1 and 120".to_string(),
            ));
        }

        if self.provider_max_retries > 5 {
            return Err(ConfigError::ValidationFailed(
                "PROVIDER_MAX_RETRIES must be at most 5".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PinPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_minutes: 15,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl PinPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PinPolicyConfig {
            max_attempts: parse_var("PIN_MAX_ATTEMPTS", "5")?,
            lockout_minutes: parse_var("PIN_LOCKOUT_MINUTES", "15")?,
            bcrypt_cost: parse_var("PIN_BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
        })
    }

    /// Clamped to the accepted range so an unvalidated policy cannot overflow
    pub fn lockout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lockout_minutes.clamp(1, MAX_PIN_LOCKOUT_MINUTES))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PIN_ATTEMPTS).contains(&self.max_attempts) {
            return Err(ConfigError::ValidationFailed(format!(
                "PIN_MAX_ATTEMPTS must be between 1 and {}",
                MAX_PIN_ATTEMPTS
            )));
        }

        if !(1..=MAX_PIN_LOCKOUT_MINUTES).contains(&self.lockout_minutes) {
            return Err(ConfigError::ValidationFailed(format!(
                "PIN_LOCKOUT_MINUTES must be between 1 and {}",
                MAX_PIN_LOCKOUT_MINUTES
            )));
        }

        if self.bcrypt_cost < 4 || self.bcrypt_cost > 31 {
            return Err(ConfigError::ValidationFailed(
                "PIN_BCRYPT_COST must be between 4 and 31".to_string(),
            ));
        }

        Ok(())
    }
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        WebhookConfig {
            naijadatasub_secret: non_empty_var("NAIJADATASUB_WEBHOOK_SECRET"),
        }
    }
}

impl ProviderFallbackConfig {
    const VARIABLES: [(&'static str, &'static str); 5] = [
        ("ACTIVE_API_PROVIDER", "active_api_provider"),
        ("NAIJADATASUB_TOKEN", "naijadatasub_token"),
        ("NAIJADATASUB_BASE_URL", "naijadatasub_base_url"),
        ("MASKAWA_TOKEN", "maskawa_token"),
        ("MASKAWA_BASE_URL", "maskawa_base_url"),
    ];

    pub fn from_env() -> Self {
        let settings = Self::VARIABLES
            .iter()
            .filter_map(|(var, key)| non_empty_var(var).map(|value| (key.to_string(), value)))
            .collect();
        ProviderFallbackConfig { settings }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
