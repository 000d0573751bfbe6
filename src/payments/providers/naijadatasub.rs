use crate::payments::error::ProviderResult;
use crate::payments::provider::VtuProvider;
use crate::payments::providers::VendorConfig;
use crate::payments::types::{
    AirtimeRequest, CableRequest, CustomerVerification, DataRequest, ElectricityRequest,
    MeterValidationRequest, ProviderName, ProviderResponse, SmartCardValidationRequest,
};
use crate::payments::utils::{
    airtime_payload, electricity_payload, interpret_purchase_body, interpret_verification_body,
    normalize_phone_number, validate_meter_number, validate_smart_card_number, VtuHttpClient,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

const NAME: &str = "naijadatasub";

/// NaijaDataSub backend; supports the full capability set
pub struct NaijadatasubProvider {
    config: VendorConfig,
    http: VtuHttpClient,
}

impl NaijadatasubProvider {
    pub fn new(config: VendorConfig, http: VtuHttpClient) -> Self {
        Self { config, http }
    }

    pub fn name(&self) -> ProviderName {
        ProviderName::Naijadatasub
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
            pending = response.pending,
            "provider accepted purchase"
        );
        Ok(response)
    }
}

#[async_trait]
impl VtuProvider for NaijadatasubProvider {
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
        self.purchase(
            "/api/data/",
            json!({
                "network": request.network.code(),
                "mobile_number": phone,
                "plan": request.plan_external_id,
                "Ported_number": true,
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
        request: &CableRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse> {
        let card = validate_smart_card_number(&request.smart_card_number)?;
        self.purchase(
            "/api/cablesub/",
            json!({
                "cablename": request.cable.code(),
                "cableplan": request.plan_external_id,
                "smart_card_number": card,
                "request_id": reference,
            }),
        )
        .await
    }

    async fn validate_meter(
        &self,
        request: &MeterValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        let meter = validate_meter_number(&request.meter_number)?;
        let url = self.config.endpoint(&format!(
            "/api/validatemeter?meternumber={}&disconame={}&mtype={}",
            meter,
            request.disco.vendor_name(),
            request.meter_type.code()
        ));
        let body = self.http.get_with_retry(NAME, &url, &self.config.token).await?;
        interpret_verification_body(NAME, body)
    }

    async fn validate_smart_card(
        &self,
        request: &SmartCardValidationRequest,
    ) -> ProviderResult<CustomerVerification> {
        let card = validate_smart_card_number(&request.smart_card_number)?;
        let url = self.config.endpoint(&format!(
            "/api/validateiuc?smart_card_number={}&cablename={}",
            card,
            request.cable.code()
        ));
        let body = self.http.get_with_retry(NAME, &url, &self.config.token).await?;
        interpret_verification_body(NAME, body)
    }
}
