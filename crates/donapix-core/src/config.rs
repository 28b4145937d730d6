// ── Runtime checkout configuration ──
//
// These types describe *how* a checkout talks to its collaborators and
// how long it waits. They carry secrets and tuning, but never touch disk.
// The host (CLI, embedding app) constructs a `CheckoutConfig` and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use donapix_api::TransportConfig;

const DEFAULT_BACKEND_URL: &str = "http://localhost:54321/functions/v1";

/// A destination pixel and the token the relay needs to reach its
/// Conversions API.
#[derive(Debug, Clone)]
pub struct PixelConfig {
    pub id: String,
    pub access_token: Option<SecretString>,
}

impl PixelConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_token: None,
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }
}

/// Bounded retry policy for charge generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (2 ⇒ at most 3 attempts).
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Configuration for one checkout popup.
///
/// Built by the host, passed to `TransactionController` -- core never
/// reads config files.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Functions root of the PIX backend (`generate-pix`, `check-pix-status`).
    pub backend_url: Url,
    /// Functions root of the conversion relay. Defaults to `backend_url`.
    pub relay_url: Option<Url>,
    /// Bearer token for the functions gateway.
    pub api_key: Option<SecretString>,
    /// Request timeout.
    pub timeout: Duration,
    /// How long a generated charge stays payable.
    pub expiry: Duration,
    /// Interval between payment status queries.
    pub poll_interval: Duration,
    /// Countdown tick resolution.
    pub tick: Duration,
    pub retry: RetryPolicy,
    /// Popup variant identifier sent with every charge.
    pub popup_variant: String,
    pub offer_id: Option<String>,
    /// `content_name` attached to conversion events.
    pub content_name: Option<String>,
    pub pixels: Vec<PixelConfig>,
    /// Page the checkout is embedded in, reported as the event source.
    pub source_url: Option<Url>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid"),
            relay_url: None,
            api_key: None,
            timeout: Duration::from_secs(30),
            expiry: Duration::from_secs(15 * 60),
            poll_interval: Duration::from_secs(3),
            tick: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            popup_variant: "default".into(),
            offer_id: None,
            content_name: None,
            pixels: Vec::new(),
            source_url: None,
        }
    }
}

impl CheckoutConfig {
    /// Effective relay root.
    pub fn relay_url(&self) -> &Url {
        self.relay_url.as_ref().unwrap_or(&self.backend_url)
    }

    pub fn pixel_ids(&self) -> impl Iterator<Item = &str> {
        self.pixels.iter().map(|p| p.id.as_str())
    }

    /// HTTP settings shared by the backend and relay clients.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.timeout,
            bearer_token: self.api_key.as_ref().map(|k| k.expose_secret().to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_defaults_to_backend() {
        let mut config = CheckoutConfig::default();
        assert_eq!(config.relay_url(), &config.backend_url);

        let relay = Url::parse("https://relay.example/functions/v1").expect("valid url");
        config.relay_url = Some(relay.clone());
        assert_eq!(config.relay_url(), &relay);
    }

    #[test]
    fn transport_carries_timeout_and_key() {
        let config = CheckoutConfig {
            api_key: Some(SecretString::from("anon")),
            timeout: Duration::from_secs(5),
            ..CheckoutConfig::default()
        };
        let transport = config.transport();
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.bearer_token.as_deref(), Some("anon"));
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
    }
}
