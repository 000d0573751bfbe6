use crate::payments::error::ProviderResult;
use crate::payments::types::{
    AirtimeRequest, CableRequest, CustomerVerification, DataRequest, ElectricityRequest,
    MeterValidationRequest, ProviderResponse, SmartCardValidationRequest,
};
use async_trait::async_trait;

/// Uniform VTU capability set. Implemented by each vendor backend and by
/// [`crate::payments::client::ProviderClient`], which forwards to whichever
/// backend is active at call time.
///
/// Purchases carry the transaction reference; vendors echo it back in
/// callbacks, which is how a webhook finds its record.
#[async_trait]
pub trait VtuProvider: Send + Sync {
    async fn buy_airtime(
        &self,
        request: &AirtimeRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse>;

    async fn buy_data(
        &self,
        request: &DataRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse>;

    async fn buy_electricity(
        &self,
        request: &ElectricityRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse>;

    async fn buy_cable(
        &self,
        request: &CableRequest,
        reference: &str,
    ) -> ProviderResult<ProviderResponse>;

    async fn validate_meter(
        &self,
        request: &MeterValidationRequest,
    ) -> ProviderResult<CustomerVerification>;

    async fn validate_smart_card(
        &self,
        request: &SmartCardValidationRequest,
    ) -> ProviderResult<CustomerVerification>;
}
