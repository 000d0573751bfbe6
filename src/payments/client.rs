use crate::database::provider_settings_repository::keys;
use crate::database::repository::ProviderSettingsRepository;
use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::provider::VtuProvider;
use crate::payments::providers::{MaskawaProvider, NaijadatasubProvider, VendorConfig};
use crate::payments::types::{
    AirtimeRequest, CableRequest, CustomerVerification, DataRequest, ElectricityRequest,
    MeterValidationRequest, ProviderName, ProviderResponse, SmartCardValidationRequest,
};
use crate::payments::utils::VtuHttpClient;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

const DEFAULT_PROVIDER: ProviderName = ProviderName::Naijadatasub;

/// Routes every call to the backend selected in the admin settings.
///
/// Settings are read on each call so a provider switch applies to the next
/// purchase. Values missing from the settings store fall back to the
/// environment-provided map.
pub struct ProviderClient {
    settings: Arc<dyn ProviderSettingsRepository>,
    fallback: HashMap<String, String>,
    http: VtuHttpClient,
}

impl ProviderClient {
    pub fn new(settings: Arc<dyn ProviderSettingsRepository>, http: VtuHttpClient) -> Self {
        Self {
            settings,
            fallback: HashMap::new(),
            http,
        }
    }

    pub fn with_fallback(mut self, fallback: HashMap<String, String>) -> Self {
        self.fallback = fallback;
        self
    }

    fn setting_keys() -> Vec<String> {
        let mut wanted = vec![keys::ACTIVE_API_PROVIDER.to_string()];
        for provider in [ProviderName::Naijadatasub, ProviderName::Maskawa] {
            wanted.push(keys::token(provider.as_str()));
            wanted.push(keys::base_url(provider.as_str()));
        }
        wanted
    }

    async fn load_settings(&self) -> ProviderResult<HashMap<String, String>> {
        let mut resolved = self
            .settings
            .get_settings(&Self::setting_keys())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch provider settings");
                ProviderError::configuration("failed to fetch API configuration")
            })?;

        for (key, value) in &self.fallback {
            let present = resolved.get(key).is_some_and(|v| !v.trim().is_empty());
            if !present {
                resolved.insert(key.clone(), value.clone());
            }
        }
        Ok(resolved)
    }

    /// Name and credentials of the backend that serves the next call
    pub async fn resolve_active(&self) -> ProviderResult<(ProviderName, VendorConfig)> {
        let settings = self.load_settings().await?;

        let provider = match settings
            .get(keys::ACTIVE_API_PROVIDER)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            Some(name) => ProviderName::from_str(name)?,
            None => DEFAULT_PROVIDER,
        };

        let token_key = keys::token(provider.as_str());
        let token = settings
            .get(&token_key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ProviderError::configuration(format!("API configuration not found: {}", token_key))
            })?;
        if token == provider.placeholder_token() {
            return Err(ProviderError::configuration(format!(
                "API token not configured for {}. Please update the token in admin settings.",
                provider
            )));
        }

        let url_key = keys::base_url(provider.as_str());
        let base_url = settings
            .get(&url_key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ProviderError::configuration(format!("API configuration not found: {}", url_key))
            })?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ProviderError::configuration(format!(
                "{} must be an http(s) URL",
                url_key
            )));
        }

        debug!(provider = %provider, "Resolved active VTU provider");
        Ok((provider, VendorConfig::new(token, base_url)))
    }

    async fn active_backend(&self) -> ProviderResult<Box<dyn VtuProvider>> {
        let (provider, config) = self.resolve_active().await?;
        let http = self.http.clone();
        Ok(match provider {
            ProviderName::Naijadatasub => Box::new(NaijadatasubProvider::new(config, http)),
            ProviderName::Maskawa => Box::new(MaskawaProvider::new(config, http)),
        })
    }
}

#[async_trait]
impl VtuProvider for ProviderClient {
    async fn buy_airtime(
        &self,
        request: &AirtimeRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.active_backend().await?.buy_airtime(request, reference).await
    }

    async fn buy_data(
        &self,
        request: &DataRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.active_backend().await?.buy_data(request, reference).await
    }

    async fn buy_electricity(
        &self,
        request: &ElectricityRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.active_backend()
            .await?
            .buy_electricity(request, reference)
            .await
    }

    async fn buy_cable(
        &self,
        request: &CableRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.active_backend().await?.buy_cable(request, reference).await
    }

    async fn validate_meter(
        &self,
        request: &MeterValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        self.active_backend().await?.validate_meter(request).await
    }

    async fn validate_smart_card(
        &self,
        request: &SmartCardValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        self.active_backend().await?.validate_smart_card(request).await
    }
}
