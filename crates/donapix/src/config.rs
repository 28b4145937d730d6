//! CLI-side configuration: picks the active profile and layers flag
//! overrides on top of `donapix_config`.
//!
//! Core never sees these types -- it receives a pre-built `CheckoutConfig`.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use donapix_config::{Config, Profile};
use donapix_core::CheckoutConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use donapix_config::{config_path, load_config};

/// Everything a command needs from configuration.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub checkout: CheckoutConfig,
    pub attribution_file: PathBuf,
    pub attribution_ttl: Duration,
}

/// Profile named by `--profile`, else the config's default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `CheckoutConfig` from the config file, profile, and CLI overrides.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly named profile must exist.
        None if global.profile.is_some() => {
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        // No profile: flags / env alone must name a backend.
        None => {
            let url = global.backend_url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            Profile::new(url)
        }
    };

    if let Some(ref url) = global.backend_url {
        profile.backend_url.clone_from(url);
    }

    let mut checkout =
        donapix_config::profile_to_checkout_config(&profile, &profile_name, &cfg.defaults)?;
    if let Some(ref key) = global.api_key {
        checkout.api_key = Some(SecretString::from(key.clone()));
    }
    if let Some(secs) = global.timeout {
        checkout.timeout = Duration::from_secs(secs);
    }

    Ok(Resolved {
        attribution_file: profile
            .attribution_file
            .clone()
            .unwrap_or_else(donapix_config::attribution_path),
        attribution_ttl: cfg.defaults.attribution_ttl(),
        profile_name,
        checkout,
    })
}
