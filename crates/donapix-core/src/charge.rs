// ── Charge generation ──
//
// Requests a PIX charge from the payment backend. Transport faults and
// malformed answers are retried a bounded number of times; a rate limit
// is final on the first answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use donapix_api::{CreateChargeRequest, CreateChargeResponse, PaymentStatus, PixClient};

use crate::config::RetryPolicy;
use crate::error::ChargeError;
use crate::model::{Amount, AttributionContext, CustomerInfo};

// ── Backend seam ─────────────────────────────────────────────────

/// Payment backend operations the checkout depends on.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    async fn create_charge(
        &self,
        request: &CreateChargeRequest,
    ) -> Result<CreateChargeResponse, donapix_api::Error>;

    async fn charge_status(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentStatus, donapix_api::Error>;
}

#[async_trait]
impl PaymentBackend for PixClient {
    async fn create_charge(
        &self,
        request: &CreateChargeRequest,
    ) -> Result<CreateChargeResponse, donapix_api::Error> {
        PixClient::create_charge(self, request).await
    }

    async fn charge_status(
        &self,
        transaction_id: &str,
    ) -> Result<PaymentStatus, donapix_api::Error> {
        PixClient::charge_status(self, transaction_id).await
    }
}

// ── Request / outcome ────────────────────────────────────────────

/// Everything the backend needs to create one charge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount: Amount,
    pub attribution: AttributionContext,
    pub customer: CustomerInfo,
    pub popup_variant: String,
    pub offer_id: Option<String>,
}

impl ChargeRequest {
    fn to_wire(&self) -> CreateChargeRequest {
        CreateChargeRequest {
            amount: self.amount.as_reais(),
            utm_params: self.attribution.utm_params.clone(),
            user_id: self.customer.user_id.clone(),
            customer_name: non_blank(self.customer.name.as_deref()),
            customer_email: non_blank(self.customer.email.as_deref()),
            fingerprint: self.customer.fingerprint.clone(),
            popup_variant: self.popup_variant.clone(),
            offer_id: self.offer_id.clone(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// A charge the backend accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeAccepted {
    pub code: String,
    pub qr_image_url: Option<String>,
    pub transaction_id: String,
}

impl TryFrom<CreateChargeResponse> for ChargeAccepted {
    type Error = ChargeError;

    fn try_from(response: CreateChargeResponse) -> Result<Self, Self::Error> {
        let code = response.pix_code.filter(|c| !c.trim().is_empty());
        let transaction_id = response.transaction_id.filter(|t| !t.trim().is_empty());
        match (code, transaction_id) {
            (Some(code), Some(transaction_id)) => Ok(Self {
                code,
                qr_image_url: response.qr_code_url,
                transaction_id,
            }),
            _ => Err(ChargeError::InvalidResponse),
        }
    }
}

// ── Generator ────────────────────────────────────────────────────

/// Creates charges with bounded retries.
#[derive(Clone)]
pub struct ChargeGenerator {
    backend: Arc<dyn PaymentBackend>,
    policy: RetryPolicy,
}

impl ChargeGenerator {
    pub fn new(backend: Arc<dyn PaymentBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn backend(&self) -> &Arc<dyn PaymentBackend> {
        &self.backend
    }

    /// Request a charge.
    ///
    /// `RateLimited` returns after the first answer. Other failures are
    /// retried `policy.max_retries` times with a fixed delay; the last
    /// failure is returned.
    pub async fn generate(&self, request: &ChargeRequest) -> Result<ChargeAccepted, ChargeError> {
        let wire = request.to_wire();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            let outcome = self
                .backend
                .create_charge(&wire)
                .await
                .map_err(ChargeError::from)
                .and_then(ChargeAccepted::try_from);

            match outcome {
                Ok(accepted) => {
                    debug!(
                        transaction_id = %accepted.transaction_id,
                        attempt,
                        "charge created"
                    );
                    return Ok(accepted);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(error = %e, "charge request rate limited");
                    return Err(e);
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(error = %e, attempts = attempt, "charge request failed, giving up");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, attempt, max_attempts, "charge request failed, retrying");
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn wire_request_carries_attribution_and_trims_blank_customer_fields() {
        let request = ChargeRequest {
            amount: Amount::from_cents(10_050),
            attribution: AttributionContext {
                utm_params: BTreeMap::from([("utm_source".into(), "fb".into())]),
                ..AttributionContext::default()
            },
            customer: CustomerInfo {
                name: Some("   ".into()),
                email: Some(" ana@example.com ".into()),
                ..CustomerInfo::default()
            },
            popup_variant: "classic".into(),
            offer_id: Some("natal".into()),
        };

        let wire = request.to_wire();
        assert_eq!(wire.amount, 100.5);
        assert_eq!(
            wire.utm_params.get("utm_source").map(String::as_str),
            Some("fb")
        );
        assert!(wire.customer_name.is_none());
        assert_eq!(wire.customer_email.as_deref(), Some("ana@example.com"));
        assert_eq!(wire.popup_variant, "classic");
    }

    #[test]
    fn response_without_code_or_id_is_invalid() {
        let missing_code = CreateChargeResponse {
            transaction_id: Some("tx".into()),
            ..CreateChargeResponse::default()
        };
        assert_eq!(
            ChargeAccepted::try_from(missing_code),
            Err(ChargeError::InvalidResponse)
        );

        let missing_id = CreateChargeResponse {
            pix_code: Some("000201".into()),
            ..CreateChargeResponse::default()
        };
        assert_eq!(
            ChargeAccepted::try_from(missing_id),
            Err(ChargeError::InvalidResponse)
        );

        let ok = CreateChargeResponse {
            pix_code: Some("000201".into()),
            qr_code_url: None,
            transaction_id: Some("tx_1".into()),
        };
        let accepted = ChargeAccepted::try_from(ok).unwrap();
        assert_eq!(accepted.transaction_id, "tx_1");
        assert!(accepted.qr_image_url.is_none());
    }
}
