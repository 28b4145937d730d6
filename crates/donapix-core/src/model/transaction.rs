// ── Transaction domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::amount::Amount;
use crate::error::ChargeError;

/// Lifecycle status of a checkout transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Idle,
    Generating,
    AwaitingPayment,
    Paid,
    Expired,
    Failed,
}

impl TransactionStatus {
    /// `Paid` never transitions anywhere else.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Whether a timer and a poller may be live in this status.
    pub fn is_waiting(self) -> bool {
        matches!(self, Self::AwaitingPayment)
    }
}

/// Where the UI gets the QR symbol from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum QrImage {
    /// Image hosted by the backend.
    Remote(String),
    /// No image supplied; render a QR symbol from the payment code.
    RenderFromCode,
}

impl QrImage {
    pub fn from_url(url: Option<String>) -> Self {
        match url {
            Some(u) if !u.trim().is_empty() => Self::Remote(u),
            _ => Self::RenderFromCode,
        }
    }
}

/// A generated PIX charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: Amount,
    /// Copy-paste payment string.
    pub code: String,
    pub qr_image: QrImage,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Observable controller state. One value per transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSnapshot {
    pub status: TransactionStatus,
    /// Amount of the current or last attempted charge.
    pub amount: Option<Amount>,
    pub transaction: Option<Transaction>,
    /// Error of the last failed generation, cleared by the next attempt.
    pub last_error: Option<ChargeError>,
}

impl TransactionSnapshot {
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction.as_ref().map(|t| t.id.as_str())
    }
}
