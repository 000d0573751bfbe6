use crate::payments::error::ProviderError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use std::fmt;
use std::str::FromStr;

/// Vendor backends that can be selected as the active provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Naijadatasub,
    Maskawa,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Naijadatasub => "naijadatasub",
            ProviderName::Maskawa => "maskawa",
        }
    }

    /// Value an unconfigured install ships in the token setting
    pub fn placeholder_token(&self) -> String {
        format!("YOUR_{}_TOKEN_HERE", self.as_str().to_uppercase())
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "naijadatasub" => Ok(ProviderName::Naijadatasub),
            "maskawa" => Ok(ProviderName::Maskawa),
            _ => Err(ProviderError::configuration(format!(
                "unsupported provider: {}",
                value
            ))),
        }
    }
}

/// Mobile network operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Network {
    #[serde(rename = "mtn")]
    Mtn,
    #[serde(rename = "airtel")]
    Airtel,
    #[serde(rename = "glo")]
    Glo,
    #[serde(rename = "9mobile")]
    NineMobile,
}

impl Network {
    /// Numeric network id used by the vendor APIs
    pub fn code(&self) -> u8 {
        match self {
            Network::Mtn => 1,
            Network::Airtel => 2,
            Network::Glo => 3,
            Network::NineMobile => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Network::Mtn),
            2 => Some(Network::Airtel),
            3 => Some(Network::Glo),
            4 => Some(Network::NineMobile),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mtn => "mtn",
            Network::Airtel => "airtel",
            Network::Glo => "glo",
            Network::NineMobile => "9mobile",
        }
    }
}

impl FromStr for Network {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        if let Ok(code) = normalized.parse::<u8>() {
            return Network::from_code(code).ok_or_else(|| {
                ProviderError::rejected("validation", format!("unknown network code: {}", code))
            });
        }
        match normalized.as_str() {
            "mtn" => Ok(Network::Mtn),
            "airtel" => Ok(Network::Airtel),
            "glo" => Ok(Network::Glo),
            "9mobile" | "etisalat" => Ok(Network::NineMobile),
            _ => Err(ProviderError::rejected(
                "validation",
                format!("unknown network: {}", value),
            )),
        }
    }
}

/// Electricity distribution company
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Disco {
    Ikeja,
    Eko,
    Ibadan,
    Abuja,
}

impl Disco {
    /// Disco identifier expected by the vendor APIs
    pub fn vendor_name(&self) -> &'static str {
        match self {
            Disco::Ikeja => "ikeja-electric",
            Disco::Eko => "eko-electric",
            Disco::Ibadan => "ibadan-electric",
            Disco::Abuja => "abuja-electric",
        }
    }
}

impl FromStr for Disco {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        match normalized.trim_end_matches("-electric") {
            "ikeja" => Ok(Disco::Ikeja),
            "eko" => Ok(Disco::Eko),
            "ibadan" => Ok(Disco::Ibadan),
            "abuja" => Ok(Disco::Abuja),
            _ => Err(ProviderError::rejected(
                "validation",
                format!("unknown disco: {}", value),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeterType {
    Prepaid,
    Postpaid,
}

impl MeterType {
    pub fn code(&self) -> u8 {
        match self {
            MeterType::Prepaid => 1,
            MeterType::Postpaid => 2,
        }
    }
}

/// Cable TV operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CableProvider {
    Gotv,
    Dstv,
    Startime,
}

impl CableProvider {
    pub fn code(&self) -> u8 {
        match self {
            CableProvider::Gotv => 1,
            CableProvider::Dstv => 2,
            CableProvider::Startime => 3,
        }
    }
}

impl FromStr for CableProvider {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "gotv" | "1" => Ok(CableProvider::Gotv),
            "dstv" | "2" => Ok(CableProvider::Dstv),
            "startime" | "startimes" | "3" => Ok(CableProvider::Startime),
            _ => Err(ProviderError::rejected(
                "validation",
                format!("unknown cable provider: {}", value),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AirtimeRequest {
    pub network: Network,
    pub amount: BigDecimal,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataRequest {
    pub network: Network,
    pub phone_number: String,
    /// Vendor plan id
    pub plan_external_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElectricityRequest {
    pub disco: Disco,
    pub amount: BigDecimal,
    pub meter_number: String,
    pub meter_type: MeterType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CableRequest {
    pub cable: CableProvider,
    pub plan_external_id: String,
    pub smart_card_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeterValidationRequest {
    pub disco: Disco,
    pub meter_number: String,
    pub meter_type: MeterType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmartCardValidationRequest {
    pub cable: CableProvider,
    pub smart_card_number: String,
}

/// Normalized result of a purchase call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub success: bool,
    pub provider: String,
    pub provider_reference: Option<String>,
    /// Vendor accepted the order but will settle it later by webhook
    pub pending: bool,
    pub message: Option<String>,
    pub raw: JsonValue,
}

/// Customer details returned by a validation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerVerification {
    pub customer_name: Option<String>,
    pub due_date: Option<String>,
    pub address: Option<String>,
    pub raw: JsonValue,
}
