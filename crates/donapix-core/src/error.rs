// ── Core error types ──
//
// User-facing errors from donapix-core. These are NOT API-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<donapix_api::Error>` impls translate transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

use crate::model::AmountParseError;

const GENERIC_FAILURE: &str = "We couldn't generate your PIX code. Please try again.";
const RATE_LIMIT_FALLBACK: &str =
    "Too many PIX codes were requested. Please wait a few minutes and try again.";

/// Outcome of a failed charge generation, as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChargeError {
    /// The backend refused because too many charges were requested.
    /// Never retried.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The backend answered success without a payment code or id.
    #[error("backend answered without a payment code")]
    InvalidResponse,

    /// Network or backend failure.
    #[error("charge request failed: {message}")]
    Transport { message: String },
}

impl ChargeError {
    /// Whether the generator may try again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::RateLimited { .. })
    }

    /// Message to show next to the amount selector.
    pub fn user_message(&self) -> &str {
        match self {
            Self::RateLimited { message } if !message.trim().is_empty() => message,
            Self::RateLimited { .. } => RATE_LIMIT_FALLBACK,
            Self::InvalidResponse | Self::Transport { .. } => GENERIC_FAILURE,
        }
    }
}

impl From<donapix_api::Error> for ChargeError {
    fn from(err: donapix_api::Error) -> Self {
        match err {
            donapix_api::Error::RateLimited { message } => Self::RateLimited { message },
            donapix_api::Error::Deserialization { .. } => Self::InvalidResponse,
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Usage errors ─────────────────────────────────────────────────
    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("A PIX charge is already being generated")]
    GenerationInProgress,

    #[error("Transaction {transaction_id} is still awaiting payment")]
    ChargeActive { transaction_id: String },

    #[error("Transaction {transaction_id} is already paid")]
    AlreadyPaid { transaction_id: String },

    #[error("Checkout was closed before the charge completed")]
    Cancelled,

    // ── Charge errors ────────────────────────────────────────────────
    #[error(transparent)]
    Charge(#[from] ChargeError),

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Attribution storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// The charge error to surface in the UI, if this is one.
    pub fn as_charge_error(&self) -> Option<&ChargeError> {
        match self {
            Self::Charge(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AmountParseError> for CoreError {
    fn from(err: AmountParseError) -> Self {
        Self::InvalidAmount {
            message: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<donapix_api::Error> for CoreError {
    fn from(err: donapix_api::Error) -> Self {
        match err {
            donapix_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            donapix_api::Error::Tls(msg) => CoreError::Config {
                message: format!("HTTP client setup failed: {msg}"),
            },
            donapix_api::Error::RateLimited { message } => {
                CoreError::Charge(ChargeError::RateLimited { message })
            }
            other => CoreError::Api {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}
