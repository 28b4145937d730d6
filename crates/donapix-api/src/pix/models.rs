// Wire models for the PIX charge backend.
//
// Field names follow the backend's camelCase JSON. Response structs are
// lenient (everything optional) so a half-broken payload surfaces as a
// domain-level "invalid response" rather than a deserialization failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /generate-pix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChargeRequest {
    /// Amount in reais (e.g. `100.5`).
    pub amount: f64,
    #[serde(default)]
    pub utm_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub popup_variant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
}

/// Successful answer of `POST /generate-pix`.
///
/// `pix_code` and `transaction_id` are optional on the wire; callers must
/// treat their absence as an invalid response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChargeResponse {
    #[serde(default, alias = "pix_code", alias = "code")]
    pub pix_code: Option<String>,
    #[serde(default, alias = "qr_code_url", alias = "qrCode")]
    pub qr_code_url: Option<String>,
    #[serde(default, alias = "transaction_id", alias = "id")]
    pub transaction_id: Option<String>,
}

/// Raw body shared by both endpoints before error extraction.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Marker the backend puts in `error` when the caller is rate limited.
pub(crate) const RATE_LIMIT_MARKER: &str = "RATE_LIMIT";

/// Body of `POST /check-pix-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeStatusRequest {
    pub transaction_id: String,
}

/// Answer of `POST /check-pix-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeStatusResponse {
    #[serde(default)]
    pub status: PaymentStatus,
}

/// Payment status as reported by the backend.
///
/// Only `paid` is actionable; every other value (including unknown ones)
/// collapses into `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    #[default]
    #[serde(other)]
    Pending,
}

impl PaymentStatus {
    pub fn is_paid(self) -> bool {
        matches!(self, Self::Paid)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_pending() {
        let resp: ChargeStatusResponse =
            serde_json::from_str(r#"{"status":"waiting_payment"}"#).unwrap();
        assert_eq!(resp.status, PaymentStatus::Pending);

        let resp: ChargeStatusResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.status, PaymentStatus::Pending);
    }

    #[test]
    fn paid_status_parses() {
        let resp: ChargeStatusResponse = serde_json::from_str(r#"{"status":"paid"}"#).unwrap();
        assert!(resp.status.is_paid());
    }

    #[test]
    fn charge_request_omits_absent_optionals() {
        let req = CreateChargeRequest {
            amount: 25.0,
            utm_params: BTreeMap::from([("utm_source".into(), "fb".into())]),
            user_id: None,
            customer_name: Some("Maria".into()),
            customer_email: None,
            fingerprint: None,
            popup_variant: "classic".into(),
            offer_id: None,
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["amount"], 25.0);
        assert_eq!(json["utmParams"]["utm_source"], "fb");
        assert_eq!(json["customerName"], "Maria");
        assert_eq!(json["popupVariant"], "classic");
        assert!(json.get("customerEmail").is_none());
        assert!(json.get("offerId").is_none());
    }

    #[test]
    fn charge_response_accepts_snake_case_aliases() {
        let resp: CreateChargeResponse = serde_json::from_str(
            r#"{"pix_code":"000201","qr_code_url":"https://qr.example/1.png","transaction_id":"tx_1"}"#,
        )
        .unwrap();
        assert_eq!(resp.pix_code.as_deref(), Some("000201"));
        assert_eq!(
            resp.qr_code_url.as_deref(),
            Some("https://qr.example/1.png")
        );
        assert_eq!(resp.transaction_id.as_deref(), Some("tx_1"));
    }
}
