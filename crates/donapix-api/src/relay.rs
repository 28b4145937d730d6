// Server-side conversion relay client
//
// Posts one conversion per pixel to the relay, which forwards it to the
// ad platform's Conversions API. The response body is irrelevant to
// callers; only transport and HTTP failures are reported.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

const TRACK_PATH: &str = "track-conversion";

/// Body of `POST /track-conversion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConversion {
    pub pixel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub event_name: String,
    /// Deduplication key shared with the browser pixel delivery.
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
}

/// HTTP client for the conversion relay.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl RelayClient {
    /// Create a relay client. `base_url` is the functions root; the
    /// `track-conversion` path is appended.
    pub fn new(base_url: &Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url.as_str(), http)
    }

    /// Create a relay client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let endpoint = Url::parse(&format!("{}/{TRACK_PATH}", base_url.trim_end_matches('/')))?;
        Ok(Self { http, endpoint })
    }

    /// Deliver a single conversion.
    ///
    /// `POST {base}/track-conversion`
    pub async fn track_conversion(&self, conversion: &ServerConversion) -> Result<(), Error> {
        debug!(
            event = %conversion.event_name,
            event_id = %conversion.event_id,
            pixel_id = %conversion.pixel_id,
            "relaying conversion"
        );

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(conversion)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(Error::Backend {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        })
    }
}
