use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    domain::PaymentStatus,
    error::{AppError, Result},
};

type HmacSha256 = Hmac<Sha256>;

/// Provider callback body. Unknown fields are ignored; `data` is kept as a
/// raw map because the signature covers every field in it, including ones
/// this service does not read.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub success: bool,
    pub data: Map<String, Value>,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub order_code: i64,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl WebhookPayload {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {}", e)))
    }

    /// Checks `signature` against HMAC-SHA256 of the canonical data string.
    pub fn verify(&self, checksum_key: &str) -> Result<()> {
        let expected = sign(checksum_key, &canonical_data(&self.data))?;
        let provided = self.signature.to_ascii_lowercase();

        if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            Ok(())
        } else {
            Err(AppError::InvalidSignature)
        }
    }

    pub fn data(&self) -> Result<WebhookData> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| AppError::Validation(format!("Malformed webhook data: {}", e)))
    }

    /// The payment status this callback asks for. An explicit `data.status`
    /// wins; otherwise provider code `00` with `success` means paid and
    /// anything else is a failure.
    pub fn inbound_status(&self) -> Result<PaymentStatus> {
        let data_status = self.data.get("status").and_then(Value::as_str);

        match data_status {
            Some(status) => match status.to_ascii_uppercase().as_str() {
                "PAID" | "SUCCESS" => Ok(PaymentStatus::Paid),
                "CANCELLED" | "CANCELED" => Ok(PaymentStatus::Cancelled),
                "FAILED" => Ok(PaymentStatus::Failed),
                "EXPIRED" => Ok(PaymentStatus::Expired),
                other => Err(AppError::Validation(format!(
                    "Unknown webhook status: {}",
                    other
                ))),
            },
            None if self.success && self.code == "00" => Ok(PaymentStatus::Paid),
            None => Ok(PaymentStatus::Failed),
        }
    }
}

/// `key=value` pairs of the data object, keys sorted, joined with `&`.
/// Nulls become empty strings; nested arrays and objects are JSON-encoded.
pub fn canonical_data(data: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();

    keys.into_iter()
        .map(|key| format!("{}={}", key, canonical_value(&data[key])))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn sign(checksum_key: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(checksum_key.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid checksum key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &str = "test-checksum-key";

    fn payload(data: Value, success: bool, code: &str) -> WebhookPayload {
        let data = data.as_object().cloned().unwrap();
        let signature = sign(KEY, &canonical_data(&data)).unwrap();
        WebhookPayload {
            code: code.to_string(),
            desc: "success".to_string(),
            success,
            data,
            signature,
        }
    }

    #[test]
    fn test_canonical_data_sorts_keys_and_blanks_nulls() {
        let data = json!({
            "orderCode": 123,
            "amount": 50000,
            "description": "TH123",
            "counterAccountName": null,
            "paid": true
        });
        assert_eq!(
            canonical_data(data.as_object().unwrap()),
            "amount=50000&counterAccountName=&description=TH123&orderCode=123&paid=true"
        );
    }

    #[test]
    fn test_valid_signature_verifies() {
        let p = payload(json!({"orderCode": 1, "amount": 10}), true, "00");
        assert!(p.verify(KEY).is_ok());
    }

    #[test]
    fn test_uppercase_signature_verifies() {
        let mut p = payload(json!({"orderCode": 1, "amount": 10}), true, "00");
        p.signature = p.signature.to_uppercase();
        assert!(p.verify(KEY).is_ok());
    }

    #[test]
    fn test_tampered_data_fails_verification() {
        let mut p = payload(json!({"orderCode": 1, "amount": 10}), true, "00");
        p.data.insert("amount".to_string(), json!(1));
        assert!(matches!(p.verify(KEY), Err(AppError::InvalidSignature)));
        assert!(matches!(p.verify("other-key"), Err(AppError::InvalidSignature)));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = br#"{"code":"00","desc":"ok","success":true,"extra":1,
            "data":{"orderCode":7,"amount":100,"foo":"bar"},"signature":"ab"}"#;
        let p = WebhookPayload::parse(raw).unwrap();
        let data = p.data().unwrap();
        assert_eq!(data.order_code, 7);
        assert_eq!(data.amount, 100);
    }

    #[test]
    fn test_missing_order_code_is_malformed() {
        let raw = br#"{"code":"00","desc":"ok","success":true,"data":{"amount":1},"signature":"ab"}"#;
        let p = WebhookPayload::parse(raw).unwrap();
        assert!(matches!(p.data(), Err(AppError::Validation(_))));
        assert!(matches!(WebhookPayload::parse(b"not json"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_inbound_status_mapping() {
        let paid = payload(json!({"orderCode": 1, "amount": 1}), true, "00");
        assert_eq!(paid.inbound_status().unwrap(), PaymentStatus::Paid);

        let failed = payload(json!({"orderCode": 1, "amount": 1}), false, "01");
        assert_eq!(failed.inbound_status().unwrap(), PaymentStatus::Failed);

        let cancelled = payload(json!({"orderCode": 1, "amount": 1, "status": "CANCELLED"}), true, "00");
        assert_eq!(cancelled.inbound_status().unwrap(), PaymentStatus::Cancelled);

        let weird = payload(json!({"orderCode": 1, "amount": 1, "status": "HELD"}), true, "00");
        assert!(matches!(weird.inbound_status(), Err(AppError::Validation(_))));
    }
}
