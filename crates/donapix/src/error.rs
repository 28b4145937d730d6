//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable
//! help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use donapix_config::ConfigError;
use donapix_core::{ChargeError, CoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    pub const RATE_LIMITED: i32 = 9;
    pub const EXPIRED: i32 = 10;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Charges ──────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(donapix::rate_limited),
        help("The backend limits how many PIX codes can be requested. Wait a few minutes.")
    )]
    RateLimited { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(donapix::charge_failed),
        help("{detail}\nCheck that the backend is reachable: donapix config show")
    )]
    ChargeFailed { message: String, detail: String },

    #[error("PIX code for transaction {transaction_id} expired before payment")]
    #[diagnostic(
        code(donapix::expired),
        help("Run `donapix checkout` again to get a fresh code.")
    )]
    Expired { transaction_id: String },

    #[error("Checkout interrupted")]
    #[diagnostic(code(donapix::interrupted))]
    Interrupted,

    // ── Backend ──────────────────────────────────────────────────────
    #[error("Backend request failed: {message}")]
    #[diagnostic(
        code(donapix::api_error),
        help("Verify --backend-url and the gateway key of the active profile.")
    )]
    Api { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(donapix::validation))]
    Validation { field: String, reason: String },

    #[error("{message}")]
    #[diagnostic(code(donapix::busy))]
    Busy { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(donapix::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: donapix config init --backend-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(donapix::no_config),
        help(
            "Pass --backend-url, set DONAPIX_BACKEND_URL, or create a profile:\n\
             donapix config init --backend-url <URL>\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(donapix::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(donapix::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RateLimited { .. } => exit_code::RATE_LIMITED,
            Self::Expired { .. } => exit_code::EXPIRED,
            Self::Interrupted => exit_code::INTERRUPTED,
            Self::ChargeFailed { .. } | Self::Api { .. } => exit_code::CONNECTION,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl From<ChargeError> for CliError {
    fn from(err: ChargeError) -> Self {
        match err {
            ChargeError::RateLimited { .. } => Self::RateLimited {
                message: err.user_message().to_owned(),
            },
            ChargeError::InvalidResponse | ChargeError::Transport { .. } => Self::ChargeFailed {
                message: err.user_message().to_owned(),
                detail: err.to_string(),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Charge(charge) => charge.into(),
            CoreError::InvalidAmount { message } => Self::Validation {
                field: "amount".into(),
                reason: message,
            },
            CoreError::GenerationInProgress
            | CoreError::ChargeActive { .. }
            | CoreError::AlreadyPaid { .. } => Self::Busy {
                message: err.to_string(),
            },
            CoreError::Cancelled => Self::Interrupted,
            CoreError::Api { message, .. } => Self::Api { message },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Storage(message) => Self::Io(std::io::Error::other(message)),
        }
    }
}

impl From<donapix_api::Error> for CliError {
    fn from(err: donapix_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_keeps_backend_message_and_exit_code() {
        let err: CliError = CoreError::Charge(ChargeError::RateLimited {
            message: "Aguarde 5 minutos".into(),
        })
        .into();
        assert_eq!(err.to_string(), "Aguarde 5 minutos");
        assert_eq!(err.exit_code(), exit_code::RATE_LIMITED);
    }

    #[test]
    fn invalid_amount_is_a_usage_error() {
        let err: CliError = CoreError::InvalidAmount {
            message: "must be positive".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
