//! Config subcommand handlers.

use std::io::{self, BufRead, IsTerminal};

use donapix_config::{Config, PixelProfile, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, ConfigInitArgs, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output::{self, Painter};

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => show(global),
        ConfigCommand::Init(init_args) => init(init_args, global),
        ConfigCommand::SetToken { pixel_id } => set_token(&pixel_id, global),
    }
}

// ── Show ─────────────────────────────────────────────────────────────

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = redacted(config::load_config()?);
    let out = match global.output {
        OutputFormat::Json => serde_json::to_string_pretty(&cfg),
        OutputFormat::JsonCompact => serde_json::to_string(&cfg),
        OutputFormat::Table | OutputFormat::Plain => {
            return toml::to_string_pretty(&cfg)
                .map(|s| output::print_output(s.trim_end(), global.quiet))
                .map_err(|e| CliError::Render(e.to_string()));
        }
    }
    .map_err(|e| CliError::Render(e.to_string()))?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Mask plaintext secrets. Env var names stay visible.
fn redacted(mut cfg: Config) -> Config {
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some(REDACTED.into());
        }
        for pixel in &mut profile.pixels {
            if pixel.access_token.is_some() {
                pixel.access_token = Some(REDACTED.into());
            }
        }
    }
    cfg
}

// ── Init ─────────────────────────────────────────────────────────────

fn init(args: ConfigInitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let backend_url = global
        .backend_url
        .clone()
        .ok_or_else(|| CliError::Validation {
            field: "backend-url".into(),
            reason: "config init needs --backend-url".into(),
        })?;
    backend_url
        .parse::<url::Url>()
        .map_err(|_| CliError::Validation {
            field: "backend-url".into(),
            reason: format!("invalid URL: {backend_url}"),
        })?;

    let mut cfg = config::load_config()?;
    let name = global.profile.clone().unwrap_or_else(|| "default".into());
    if cfg.profiles.contains_key(&name) && !args.force {
        return Err(CliError::Validation {
            field: "profile".into(),
            reason: format!("profile '{name}' already exists (pass --force to replace it)"),
        });
    }

    let mut profile = Profile::new(backend_url);
    profile.popup_variant = args.popup_variant;
    profile.content_name = args.content_name;
    profile.pixels = args
        .pixels
        .into_iter()
        .map(|id| PixelProfile {
            id,
            access_token: None,
            access_token_env: None,
        })
        .collect();

    cfg.profiles.insert(name.clone(), profile);
    if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(name.clone());
    }
    let path = donapix_config::save_config(&cfg)?;

    let painter = Painter::new(&global.color);
    output::print_output(
        &format!(
            "{} profile '{name}' written to {}",
            painter.success("Saved"),
            path.display()
        ),
        global.quiet,
    );
    Ok(())
}

// ── Tokens ───────────────────────────────────────────────────────────

fn set_token(pixel_id: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config()?;
    let profile_name = config::active_profile_name(global, &cfg);

    if io::stdin().is_terminal() {
        eprintln!("Paste the access token for pixel {pixel_id}, then press Enter:");
    }
    let mut token = String::new();
    io::stdin().lock().read_line(&mut token)?;
    let token = token.trim();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "no token on stdin".into(),
        });
    }

    donapix_config::store_secret(&profile_name, &format!("pixel/{pixel_id}"), token)?;
    let painter = Painter::new(&global.color);
    output::print_output(
        &format!(
            "{} token for pixel {pixel_id} in profile '{profile_name}'",
            painter.success("Stored")
        ),
        global.quiet,
    );
    Ok(())
}
