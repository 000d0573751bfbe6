use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::provider::VtuProvider;
use crate::payments::providers::VendorConfig;
use crate::payments::types::{
    AirtimeRequest, CableRequest, CustomerVerification, DataRequest, ElectricityRequest,
    MeterValidationRequest, ProviderName, ProviderResponse, SmartCardValidationRequest,
};
use crate::payments::utils::{
    airtime_payload, electricity_payload, interpret_purchase_body, normalize_phone_number,
    VtuHttpClient,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

const NAME: &str = "maskawa";

/// Maskawa backend. Airtime, data and electricity only.
pub struct MaskawaProvider {
    config: VendorConfig,
    http: VtuHttpClient,
}

impl MaskawaProvider {
    pub fn new(config: VendorConfig, http: VtuHttpClient) -> Self {
        Self { config, http }
    }

    pub fn name(&self) -> ProviderName {
        ProviderName::Maskawa
    }

    fn unsupported(operation: &str) -> ProviderError {
        ProviderError::configuration(format!(
            "{} is not supported by active provider {}",
            operation, NAME
        ))
    }

    async fn purchase(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> ProviderResult<ProviderResponse> {
        let body = self
            .http
            .post_once(NAME, &self.config.endpoint(path), &self.config.token, &payload)
            .await?;
        let response = interpret_purchase_body(NAME, body)?;
        info!(
            provider = NAME,
            endpoint = path,
            provider_reference = ?response.provider_reference,
            "provider accepted purchase"
        );
        Ok(response)
    }
}

#[async_trait]
impl VtuProvider for MaskawaProvider {
    async fn buy_airtime(
        &self,
        request: &AirtimeRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.purchase("/api/topup/", airtime_payload(request, reference)?)
            .await
    }

    async fn buy_data(
        &self,
        request: &DataRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        let phone = normalize_phone_number(&request.phone_number)?;
        let plan: i64 = request.plan_external_id.trim().parse().map_err(|_| {
            ProviderError::rejected(
                NAME,
                format!("Invalid data plan ID: {}", request.plan_external_id),
            )
        })?;
        self.purchase(
            "/api/data/",
            json!({
                "network": request.network.code(),
                "mobile_number": phone,
                "plan": plan,
                "Ported_number": true,
                "payment_medium": "MAIN WALLET",
                "request_id": reference,
            }),
        )
        .await
    }

    async fn buy_electricity(
        &self,
        request: &ElectricityRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        self.purchase("/api/billpayment/", electricity_payload(request, reference)?)
            .await
    }

    async fn buy_cable(
        &self,
        _request: &CableRequest,
        _reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        Err(Self::unsupported("cable subscription"))
    }

    async fn validate_meter(
        &self,
        _request: &MeterValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        Err(Self::unsupported("meter validation"))
    }

    async fn validate_smart_card(
        &self,
        _request: &SmartCardValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        Err(Self::unsupported("smart card validation"))
    }
}
