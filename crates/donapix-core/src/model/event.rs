// ── Conversion event domain types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::amount::Amount;
use super::attribution::AttributionContext;

/// Name of a marketing event.
///
/// `InitiateCheckout` and `Purchase` are standard pixel events;
/// `PixGenerated` and custom names are delivered as custom events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventName {
    InitiateCheckout,
    PixGenerated,
    Purchase,
    Custom(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InitiateCheckout => "InitiateCheckout",
            Self::PixGenerated => "PixGenerated",
            Self::Purchase => "Purchase",
            Self::Custom(name) => name,
        }
    }

    /// Whether the pixel knows this event natively (`track` vs `trackCustom`).
    pub fn is_standard(&self) -> bool {
        matches!(self, Self::InitiateCheckout | Self::Purchase)
    }

    /// Lowercase form used as the event id prefix.
    pub(crate) fn slug(&self) -> String {
        let mut out = String::with_capacity(self.as_str().len() + 4);
        for (i, ch) in self.as_str().chars().enumerate() {
            if ch.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(ch.to_ascii_lowercase());
            } else if ch.is_ascii_alphanumeric() {
                out.push(ch);
            } else {
                out.push('_');
            }
        }
        out
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        match name.as_str() {
            "InitiateCheckout" => Self::InitiateCheckout,
            "PixGenerated" => Self::PixGenerated,
            "Purchase" => Self::Purchase,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self::from(name.to_owned())
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.as_str().to_owned()
    }
}

// ── Parameters ──────────────────────────────────────────────────────

/// Event-specific fields.
///
/// `currency` is filled in by the dispatcher whenever `value` is present.
/// A `value` or `currency` key in `custom` is folded into the typed field
/// before delivery, so both channels see the same amount.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventParams {
    pub value: Option<Amount>,
    pub currency: Option<String>,
    pub content_name: Option<String>,
    pub transaction_id: Option<String>,
    /// Caller-supplied deduplication key; derived when absent.
    pub event_id: Option<String>,
    /// Free-form extra fields forwarded as-is.
    pub custom: Map<String, Value>,
}

impl EventParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, amount: Amount) -> Self {
        self.value = Some(amount);
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn content_name(mut self, name: impl Into<String>) -> Self {
        self.content_name = Some(name.into());
        self
    }

    pub fn transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn event_id(mut self, id: impl Into<String>) -> Self {
        self.event_id = Some(id.into());
        self
    }

    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Pixel-shaped JSON object (`value` in reais).
    pub fn to_json(&self) -> Value {
        let mut obj = self.custom.clone();
        if let Some(value) = self.value {
            obj.insert("value".into(), json!(value.as_reais()));
        }
        if let Some(ref currency) = self.currency {
            obj.insert("currency".into(), json!(currency));
        }
        if let Some(ref name) = self.content_name {
            obj.insert("content_name".into(), json!(name));
        }
        if let Some(ref id) = self.transaction_id {
            obj.insert("transaction_id".into(), json!(id));
        }
        Value::Object(obj)
    }
}

// ── Identity matching ───────────────────────────────────────────────

/// Customer fields collected by the popup form. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Host-side user identifier, sent as `external_id`.
    pub user_id: Option<String>,
    /// Device fingerprint forwarded to the charge backend.
    pub fingerprint: Option<String>,
}

/// Best-effort identity-matching fields attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub external_id: Option<String>,
    pub fbc: Option<String>,
    pub fbp: Option<String>,
    pub country: Option<String>,
}

impl UserData {
    /// Build from form fields and session attribution. The full name is
    /// split into a first name and the remaining fragments.
    pub fn from_customer(customer: &CustomerInfo, attribution: &AttributionContext) -> Self {
        let (first_name, last_name) = customer
            .name
            .as_deref()
            .map(split_name)
            .unwrap_or_default();

        Self {
            email: customer
                .email
                .as_deref()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            first_name,
            last_name,
            external_id: customer.user_id.clone(),
            fbc: attribution.click_id.clone(),
            fbp: attribution.browser_id.clone(),
            country: Some("br".into()),
        }
    }

    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }

    /// Pixel advanced-matching keys (`em`, `fn`, `ln`, ...).
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        let fields = [
            ("em", &self.email),
            ("fn", &self.first_name),
            ("ln", &self.last_name),
            ("external_id", &self.external_id),
            ("fbc", &self.fbc),
            ("fbp", &self.fbp),
            ("country", &self.country),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                obj.insert(key.into(), json!(v));
            }
        }
        Value::Object(obj)
    }
}

fn split_name(full: &str) -> (Option<String>, Option<String>) {
    let mut parts = full.split_whitespace();
    let first = parts.next().map(str::to_lowercase);
    let rest: Vec<&str> = parts.collect();
    let last = (!rest.is_empty()).then(|| rest.join(" ").to_lowercase());
    (first, last)
}

// ── Event ───────────────────────────────────────────────────────────

/// A normalized marketing event, ready for pixel and relay delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionEvent {
    pub name: EventName,
    /// Deduplication key shared by the pixel and relay deliveries.
    pub event_id: String,
    pub params: EventParams,
    pub user_data: UserData,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
