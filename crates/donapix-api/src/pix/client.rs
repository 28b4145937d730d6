// PIX backend HTTP client
//
// Wraps `reqwest::Client` with endpoint URL construction and the backend's
// error conventions: HTTP 429 or `{ "error": "RATE_LIMIT" }` is a rate
// limit, any other `error` field or non-2xx status is a backend error.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::pix::models::{
    ChargeStatusRequest, ChargeStatusResponse, CreateChargeRequest, CreateChargeResponse,
    ErrorEnvelope, PaymentStatus, RATE_LIMIT_MARKER,
};
use crate::transport::TransportConfig;

const GENERATE_PATH: &str = "generate-pix";
const STATUS_PATH: &str = "check-pix-status";

/// Raw HTTP client for the PIX charge backend.
///
/// All methods return typed payloads; error envelopes are translated into
/// [`Error`] variants before the caller sees them.
#[derive(Debug, Clone)]
pub struct PixClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl PixClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the functions root, e.g.
    /// `https://project.example.co/functions/v1`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            timeout_secs: 0,
        })
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Request a new PIX charge.
    ///
    /// `POST {base}/generate-pix`
    pub async fn create_charge(
        &self,
        request: &CreateChargeRequest,
    ) -> Result<CreateChargeResponse, Error> {
        let url = self.endpoint(GENERATE_PATH)?;
        debug!(amount = request.amount, variant = %request.popup_variant, "requesting charge");
        self.post(url, request).await
    }

    /// Query the payment status of a charge.
    ///
    /// `POST {base}/check-pix-status`
    pub async fn charge_status(&self, transaction_id: &str) -> Result<PaymentStatus, Error> {
        let url = self.endpoint(STATUS_PATH)?;
        let body = ChargeStatusRequest {
            transaction_id: transaction_id.to_owned(),
        };
        let resp: ChargeStatusResponse = self.post(url, &body).await?;
        Ok(resp.status)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Join an endpoint name onto the base URL, keeping any base path.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Send a POST request with JSON body and parse the answer.
    async fn post<T: DeserializeOwned>(&self, url: Url, body: &impl Serialize) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        parse_body(resp).await
    }

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }
}

/// Parse a backend answer, translating error conventions into [`Error`].
pub(crate) async fn parse_body<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::Transport)?;

    let envelope: Option<ErrorEnvelope> = serde_json::from_str(&body).ok();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let message = envelope.and_then(|e| e.message).unwrap_or_default();
        return Err(Error::RateLimited { message });
    }

    if let Some(ErrorEnvelope {
        error: Some(code),
        message,
    }) = envelope
    {
        if code == RATE_LIMIT_MARKER {
            return Err(Error::RateLimited {
                message: message.unwrap_or_default(),
            });
        }
        return Err(Error::Backend {
            status: status.as_u16(),
            message: message.unwrap_or(code),
        });
    }

    if !status.is_success() {
        return Err(Error::Backend {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}
