//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use donapix_api::{PixClient, RelayClient};
use donapix_core::{Amount, CheckoutConfig};

use crate::error::CliError;

/// Backend client for the profile's functions root.
pub fn pix_client(checkout: &CheckoutConfig) -> Result<PixClient, CliError> {
    Ok(PixClient::new(checkout.backend_url.clone(), &checkout.transport())?)
}

/// Relay client; falls back to the backend root when no relay is set.
pub fn relay_client(checkout: &CheckoutConfig) -> Result<RelayClient, CliError> {
    Ok(RelayClient::new(checkout.relay_url(), &checkout.transport())?)
}

/// Parse a user-typed amount such as `50`, `25,90` or `R$ 1.000,00`.
pub fn parse_amount(raw: &str) -> Result<Amount, CliError> {
    let amount: Amount = raw.parse().map_err(|e: donapix_core::AmountParseError| {
        CliError::Validation {
            field: "amount".into(),
            reason: e.to_string(),
        }
    })?;
    if !amount.is_positive() {
        return Err(CliError::Validation {
            field: "amount".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(amount)
}

/// Spinner on stderr, hidden in quiet mode or when stderr is not a terminal.
pub fn spinner(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
