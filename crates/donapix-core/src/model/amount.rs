// ── Monetary amounts ──
//
// Amounts are held in centavos so arithmetic never drifts; conversion to
// a decimal number of reais only happens at wire boundaries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currency of every amount handled by this crate.
pub const CURRENCY: &str = "BRL";

/// A BRL amount stored as an integer number of centavos.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid amount '{0}'")]
    Invalid(String),
    #[error("amount '{0}' has more than two fraction digits")]
    TooPrecise(String),
    #[error("amount '{0}' is too large")]
    Overflow(String),
}

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Whole reais. Saturates instead of overflowing.
    pub const fn from_reais(reais: u64) -> Self {
        Self(reais.saturating_mul(100))
    }

    /// Decimal reais rounded to the nearest centavo. `None` for negative,
    /// non-finite or out-of-range input.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::as_conversions
    )]
    pub fn from_reais_f64(reais: f64) -> Option<Self> {
        if !reais.is_finite() || reais < 0.0 {
            return None;
        }
        let cents = (reais * 100.0).round();
        if cents >= u64::MAX as f64 {
            return None;
        }
        Some(Self(cents as u64))
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Decimal number of reais, as sent to the backend and the ad platform.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_reais(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Render as Brazilian currency, e.g. `R$ 1.234,56`.
    pub fn to_brl(self) -> String {
        let reais = self.0 / 100;
        let cents = self.0 % 100;

        let digits = reais.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        format!("R$ {grouped},{cents:02}")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_brl())
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    /// Accepts `100`, `100.5`, `100,50`, `1.234,56` and `R$ 1.234,56`.
    ///
    /// A comma is always the decimal separator. Without a comma, a dot
    /// followed by one or two digits is decimal; otherwise dots group
    /// thousands.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().trim_start_matches("R$").trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (int_part, frac_part) = if let Some((int, frac)) = trimmed.split_once(',') {
            (int.replace('.', ""), frac.to_owned())
        } else if let Some((int, frac)) = trimmed.rsplit_once('.') {
            if frac.len() <= 2 && !int.contains('.') {
                (int.to_owned(), frac.to_owned())
            } else {
                (trimmed.replace('.', ""), String::new())
            }
        } else {
            (trimmed.to_owned(), String::new())
        };

        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if int_part.is_empty() || !all_digits(&int_part) || !all_digits(&frac_part) {
            return Err(AmountParseError::Invalid(raw.to_owned()));
        }
        if frac_part.len() > 2 {
            return Err(AmountParseError::TooPrecise(raw.to_owned()));
        }

        let reais: u64 = int_part
            .parse()
            .map_err(|_| AmountParseError::Overflow(raw.to_owned()))?;
        let cents: u64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<u64>().map_or(0, |d| d * 10),
            _ => frac_part.parse().unwrap_or(0),
        };

        reais
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .map(Self)
            .ok_or_else(|| AmountParseError::Overflow(raw.to_owned()))
    }
}
