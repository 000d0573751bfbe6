use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::types::{
    AirtimeRequest, CustomerVerification, ElectricityRequest, ProviderResponse,
};
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value as JsonValue};
use sqlx::types::BigDecimal;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Token-authenticated JSON client shared by the vendor backends
#[derive(Clone)]
pub struct VtuHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl VtuHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::configuration(format!("failed to initialize HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    /// Single attempt. Purchases are not idempotent on the vendor side.
    pub async fn post_once(
        &self,
        provider: &str,
        url: &str,
        token: &str,
        body: &JsonValue,
    ) -> ProviderResult<JsonValue> {
        self.send(provider, Method::POST, url, token, Some(body)).await
    }

    /// Read-only call; transport failures and 5xx are retried with backoff
    pub async fn get_with_retry(
        &self,
        provider: &str,
        url: &str,
        token: &str,
    ) -> ProviderResult<JsonValue> {
        let mut attempt = 0;
        loop {
            match self.send(provider, Method::GET, url, token, None).await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    warn!(
                        provider = provider,
                        attempt = attempt + 1,
                        error = %err,
                        "provider validation call failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send(
        &self,
        provider: &str,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&JsonValue>,
    ) -> ProviderResult<JsonValue> {
        let mut request = self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .header("Authorization", format!("Token {}", token))
            .header("Content-Type", "application/json");
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| {
            ProviderError::network(provider, format!("provider request failed: {}", e))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ProviderError::network(provider, format!("failed to read provider response: {}", e))
        })?;

        classify_http_response(provider, status, &text)
    }
}

/// Map an HTTP status and body to the provider error taxonomy
pub fn classify_http_response(
    provider: &str,
    status: StatusCode,
    text: &str,
) -> ProviderResult<JsonValue> {
    if status.is_success() {
        // Some endpoints answer with an empty or non-JSON body on success
        return Ok(serde_json::from_str::<JsonValue>(text).unwrap_or_else(|_| {
            serde_json::json!({ "success": true, "status": status.as_u16() })
        }));
    }

    if status.is_server_error() {
        return Err(ProviderError::network(
            provider,
            format!("provider returned HTTP {}", status.as_u16()),
        ));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::configuration(format!(
            "{} rejected the configured credentials (HTTP {})",
            provider,
            status.as_u16()
        )));
    }

    Err(ProviderError::ProviderRejected {
        provider: provider.to_string(),
        message: format!("request rejected with HTTP {}", status.as_u16()),
        provider_code: Some(status.as_u16().to_string()),
        detail: Some(text.to_string()),
    })
}

fn body_status(body: &JsonValue) -> Option<String> {
    match body.get("Status").or_else(|| body.get("status"))? {
        JsonValue::String(s) => Some(s.trim().to_lowercase()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_string(body: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match body.get(*key)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn body_message(body: &JsonValue) -> Option<String> {
    first_string(body, &["api_response", "message", "msg", "detail"]).or_else(|| {
        body.get("error").and_then(|e| match e {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Null => None,
            other => Some(other.to_string()),
        })
    })
}

fn has_error_field(body: &JsonValue) -> bool {
    body.get("error").is_some_and(|e| !e.is_null())
}

/// Interpret a 2xx purchase response body
pub fn interpret_purchase_body(provider: &str, body: JsonValue) -> ProviderResult<ProviderResponse> {
    let status = body_status(&body);
    let message = body_message(&body);

    let rejected = has_error_field(&body)
        || matches!(
            status.as_deref(),
            Some("failed") | Some("fail") | Some("error") | Some("false")
        );
    if rejected {
        return Err(ProviderError::ProviderRejected {
            provider: provider.to_string(),
            message: "provider reported the transaction as failed".to_string(),
            provider_code: status,
            detail: message.or_else(|| Some(body.to_string())),
        });
    }

    let pending = matches!(status.as_deref(), Some("processing") | Some("pending"));

    Ok(ProviderResponse {
        success: true,
        provider: provider.to_string(),
        provider_reference: first_string(&body, &["ident", "reference", "request_id", "id"]),
        pending,
        message,
        raw: body,
    })
}

/// Interpret a 2xx meter / smart-card validation body
pub fn interpret_verification_body(
    provider: &str,
    body: JsonValue,
) -> ProviderResult<CustomerVerification> {
    let invalid = body
        .get("invalid")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let status = body_status(&body);
    if invalid
        || has_error_field(&body)
        || matches!(status.as_deref(), Some("failed") | Some("error") | Some("false"))
    {
        return Err(ProviderError::ProviderRejected {
            provider: provider.to_string(),
            message: "customer number could not be verified".to_string(),
            provider_code: status,
            detail: body_message(&body).or_else(|| Some(body.to_string())),
        });
    }

    Ok(CustomerVerification {
        customer_name: first_string(&body, &["name", "Customer_Name", "customer_name"]),
        due_date: first_string(&body, &["Due_Date", "due_date"]),
        address: first_string(&body, &["address", "Address"]),
        raw: body,
    })
}

/// Amount as a JSON number where it parses as one
pub fn json_amount(amount: &BigDecimal) -> JsonValue {
    let text = amount.to_string();
    text.parse::<serde_json::Number>()
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::String(text))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:0|\+?234)([789][01]\d{8})$").expect("phone pattern is valid")
    })
}

/// Normalize a Nigerian mobile number to the local 11-digit form
pub fn normalize_phone_number(phone: &str) -> ProviderResult<String> {
    let compact: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    phone_pattern()
        .captures(&compact)
        .and_then(|caps| caps.get(1))
        .map(|subscriber| format!("0{}", subscriber.as_str()))
        .ok_or_else(|| {
            ProviderError::rejected(
                "validation",
                "Invalid Nigerian phone number. Expected 080XXXXXXXX or 234XXXXXXXXXX",
            )
        })
}

fn digits_only(value: &str, min: usize, max: usize, label: &str) -> ProviderResult<String> {
    let trimmed = value.trim();
    if trimmed.len() < min || trimmed.len() > max || !trimmed.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ProviderError::rejected(
            "validation",
            format!("{} must be {} to {} digits", label, min, max),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_meter_number(meter: &str) -> ProviderResult<String> {
    digits_only(meter, 10, 13, "Meter number")
}

pub fn validate_smart_card_number(card: &str) -> ProviderResult<String> {
    digits_only(card, 10, 12, "Smart card number")
}

/// `/api/topup/` body. Both vendors accept the same schema.
pub fn airtime_payload(request: &AirtimeRequest, reference: &str) -> ProviderResult<JsonValue> {
    let phone = normalize_phone_number(&request.phone_number)?;
    Ok(json!({
        "network": request.network.code(),
        "amount": json_amount(&request.amount),
        "mobile_number": phone,
        "Ported_number": true,
        "airtime_type": "VTU",
        "request_id": reference,
    }))
}

/// `/api/billpayment/` body. Both vendors accept the same schema.
pub fn electricity_payload(
    request: &ElectricityRequest,
    reference: &str,
) -> ProviderResult<JsonValue> {
    let meter = validate_meter_number(&request.meter_number)?;
    Ok(json!({
        "disco_name": request.disco.vendor_name(),
        "amount": json_amount(&request.amount),
        "meter_number": meter,
        "MeterType": request.meter_type.code(),
        "request_id": reference,
    }))
}

pub fn verify_hmac_sha512_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(
        computed.as_bytes(),
        signature.trim().to_ascii_lowercase().as_bytes(),
    )
}

/// Lowercase hex HMAC-SHA512, the format vendors send in signature headers
pub fn sign_hmac_sha512_hex(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
