//! Shared configuration for donapix hosts.
//!
//! TOML profiles, secret resolution (env + keyring + plaintext), and
//! translation to `donapix_core::CheckoutConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use donapix_core::{CheckoutConfig, PixelConfig, RetryPolicy};

const KEYRING_SERVICE: &str = "donapix";
const ENV_PREFIX: &str = "DONAPIX_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|p| (name.clone(), p))
            .ok_or(ConfigError::UnknownProfile { profile: name })
    }
}

/// Timing and retry knobs shared by every profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Charge validity, seconds.
    #[serde(default = "default_expiry")]
    pub expiry_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// How long captured attribution is reused across runs, seconds.
    #[serde(default = "default_attribution_ttl")]
    pub attribution_ttl_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            color: default_color(),
            timeout: default_timeout(),
            expiry_secs: default_expiry(),
            poll_interval_secs: default_poll_interval(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            attribution_ttl_secs: default_attribution_ttl(),
        }
    }
}

impl Defaults {
    pub fn attribution_ttl(&self) -> Duration {
        Duration::from_secs(self.attribution_ttl_secs)
    }
}

fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_expiry() -> u64 {
    15 * 60
}
fn default_poll_interval() -> u64 {
    3
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1_000
}
fn default_attribution_ttl() -> u64 {
    24 * 60 * 60
}

/// A named backend profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Functions root of the PIX backend
    /// (e.g., "https://abc.supabase.co/functions/v1").
    pub backend_url: String,

    /// Functions root of the conversion relay (defaults to `backend_url`).
    pub relay_url: Option<String>,

    /// Gateway key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the gateway key.
    pub api_key_env: Option<String>,

    #[serde(default = "default_popup_variant")]
    pub popup_variant: String,

    pub offer_id: Option<String>,

    /// `content_name` attached to conversion events.
    pub content_name: Option<String>,

    /// Page reported as the event source.
    pub source_url: Option<String>,

    /// Where captured attribution is kept between runs.
    pub attribution_file: Option<PathBuf>,

    #[serde(default)]
    pub pixels: Vec<PixelProfile>,

    /// Override the global timeout.
    pub timeout: Option<u64>,

    /// Override the global expiry.
    pub expiry_secs: Option<u64>,
}

fn default_popup_variant() -> String {
    "default".into()
}

impl Profile {
    /// Profile with only a backend; everything else at its default.
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            relay_url: None,
            api_key: None,
            api_key_env: None,
            popup_variant: default_popup_variant(),
            offer_id: None,
            content_name: None,
            source_url: None,
            attribution_file: None,
            pixels: Vec::new(),
            timeout: None,
            expiry_secs: None,
        }
    }
}

/// A conversion pixel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PixelProfile {
    pub id: String,

    /// Conversions API token (plaintext; prefer keyring or env var).
    pub access_token: Option<String>,

    /// Environment variable name containing the token.
    pub access_token_env: Option<String>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "donapix", "donapix")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the persisted attribution context.
pub fn attribution_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share").join("attribution.json"),
        |dirs| dirs.data_dir().join("attribution.json"),
    )
}

fn home_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("donapix");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys use `__` as the nesting separator, e.g.
/// `DONAPIX_DEFAULTS__TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

/// Env var named by the profile → system keyring → plaintext.
fn resolve_secret(
    env_name: Option<&str>,
    keyring_user: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Named env var
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, keyring_user) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    plaintext.map(|s| SecretString::from(s.to_owned()))
}

/// Gateway key for a profile, if any is configured.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.api_key_env.as_deref(),
        &format!("{profile_name}/api-key"),
        profile.api_key.as_deref(),
    )
}

/// Conversions API token for a pixel, if any is configured.
pub fn resolve_pixel_token(pixel: &PixelProfile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        pixel.access_token_env.as_deref(),
        &format!("{profile_name}/pixel/{}", pixel.id),
        pixel.access_token.as_deref(),
    )
}

/// Store a secret in the system keyring under this profile.
pub fn store_secret(profile_name: &str, key: &str, secret: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{key}"))
        .and_then(|entry| entry.set_password(secret))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    value.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {value}"),
    })
}

/// Build a `CheckoutConfig` from a profile and the global defaults.
pub fn profile_to_checkout_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CheckoutConfig, ConfigError> {
    let backend_url = parse_url("backend_url", &profile.backend_url)?;
    let relay_url = profile
        .relay_url
        .as_deref()
        .map(|u| parse_url("relay_url", u))
        .transpose()?;
    let source_url = profile
        .source_url
        .as_deref()
        .map(|u| parse_url("source_url", u))
        .transpose()?;

    if defaults.poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            field: "poll_interval_secs".into(),
            reason: "must be at least 1".into(),
        });
    }
    let expiry_secs = profile.expiry_secs.unwrap_or(defaults.expiry_secs);
    if expiry_secs == 0 {
        return Err(ConfigError::Validation {
            field: "expiry_secs".into(),
            reason: "must be at least 1".into(),
        });
    }

    let pixels = profile
        .pixels
        .iter()
        .map(|pixel| {
            let config = PixelConfig::new(pixel.id.clone());
            match resolve_pixel_token(pixel, profile_name) {
                Some(token) => config.with_token(token),
                None => config,
            }
        })
        .collect();

    Ok(CheckoutConfig {
        backend_url,
        relay_url,
        api_key: resolve_api_key(profile, profile_name),
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        expiry: Duration::from_secs(expiry_secs),
        poll_interval: Duration::from_secs(defaults.poll_interval_secs),
        retry: RetryPolicy {
            max_retries: defaults.max_retries,
            delay: Duration::from_millis(defaults.retry_delay_ms),
        },
        popup_variant: profile.popup_variant.clone(),
        offer_id: profile.offer_id.clone(),
        content_name: profile.content_name.clone(),
        pixels,
        source_url,
        ..CheckoutConfig::default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
        default_profile = "ong"

        [defaults]
        timeout = 20
        expiry_secs = 600

        [profiles.ong]
        backend_url = "https://abc.supabase.co/functions/v1"
        popup_variant = "classic"
        content_name = "Doação"
        api_key_env = "ONG_GATEWAY_KEY"

        [[profiles.ong.pixels]]
        id = "1234"
        access_token_env = "ONG_PIXEL_TOKEN"
    "#;

    #[test]
    fn loads_profiles_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.defaults.timeout, 20);
            assert_eq!(config.defaults.poll_interval_secs, 3);
            let (name, profile) = config.profile(None).map_err(|e| e.to_string())?;
            assert_eq!(name, "ong");
            assert_eq!(profile.popup_variant, "classic");
            assert_eq!(profile.pixels[0].id, "1234");
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("DONAPIX_DEFAULTS__TIMEOUT", "5");
            jail.set_env("DONAPIX_DEFAULTS__ATTRIBUTION_TTL_SECS", "3600");
            jail.set_env("DONAPIX_DEFAULT_PROFILE", "other");

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.defaults.timeout, 5);
            assert_eq!(config.defaults.attribution_ttl_secs, 3_600);
            assert_eq!(config.default_profile.as_deref(), Some("other"));
            assert!(matches!(
                config.profile(None),
                Err(ConfigError::UnknownProfile { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let config = load_config_from(Path::new("nope.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            assert_eq!(
                config.defaults.attribution_ttl(),
                Duration::from_secs(86_400)
            );
            Ok(())
        });
    }

    #[test]
    fn profile_translates_to_checkout_config() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("ONG_GATEWAY_KEY", "gw-secret");
            jail.set_env("ONG_PIXEL_TOKEN", "px-secret");

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            let (name, profile) = config.profile(Some("ong")).map_err(|e| e.to_string())?;
            let checkout = profile_to_checkout_config(profile, &name, &config.defaults)
                .map_err(|e| e.to_string())?;

            assert_eq!(
                checkout.backend_url.as_str(),
                "https://abc.supabase.co/functions/v1"
            );
            assert_eq!(
                checkout.relay_url().as_str(),
                "https://abc.supabase.co/functions/v1"
            );
            assert_eq!(checkout.timeout, Duration::from_secs(20));
            assert_eq!(checkout.expiry, Duration::from_secs(600));
            assert_eq!(checkout.retry, RetryPolicy::default());
            assert_eq!(checkout.content_name.as_deref(), Some("Doação"));
            let api_key = checkout.api_key.as_ref().unwrap();
            assert_eq!(api_key.expose_secret(), "gw-secret");
            let token = checkout.pixels[0].access_token.as_ref().unwrap();
            assert_eq!(token.expose_secret(), "px-secret");
            Ok(())
        });
    }

    #[test]
    fn invalid_urls_are_rejected() {
        let profile = Profile::new("not a url");
        let err = profile_to_checkout_config(&profile, "x", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "backend_url"));
    }

    #[test]
    fn save_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.defaults.max_retries = 4;

        save_config_to(&config, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("max_retries = 4"));
    }
}
