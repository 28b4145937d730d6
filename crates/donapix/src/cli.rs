//! Clap derive structures for the `donapix` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// donapix -- PIX donation checkout from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "donapix",
    version,
    about = "Run PIX donation checkouts from the command line",
    long_about = "Generates PIX charges against a donation backend, waits for payment\n\
        with a live countdown, and reports conversion events to the configured\n\
        pixels and relay.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "DONAPIX_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend functions URL (overrides profile)
    #[arg(long, short = 'b', env = "DONAPIX_BACKEND_URL", global = true)]
    pub backend_url: Option<String>,

    /// Gateway API key
    #[arg(long, env = "DONAPIX_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DONAPIX_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "DONAPIX_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a PIX charge and wait for payment
    #[command(alias = "pay")]
    Checkout(CheckoutArgs),

    /// Query the payment status of a transaction
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Checkout ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CheckoutArgs {
    /// Donation amount in reais (e.g. 50, 25,90, "R$ 1.000,00")
    #[arg(long, short = 'a')]
    pub amount: String,

    /// Donor full name
    #[arg(long)]
    pub name: Option<String>,

    /// Donor email
    #[arg(long)]
    pub email: Option<String>,

    /// Campaign tag, repeatable (e.g. --utm utm_source=instagram)
    #[arg(long = "utm", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub utm: Vec<(String, String)>,

    /// Landing page URL to capture campaign tags from
    #[arg(long, value_name = "URL")]
    pub landing_url: Option<String>,

    /// Cookie header of the landing page (reads _fbc / _fbp)
    #[arg(long, value_name = "HEADER")]
    pub cookie: Option<String>,

    /// Print the charge and exit without waiting for payment
    #[arg(long)]
    pub no_wait: bool,

    /// Forget campaign tags captured by earlier runs
    #[arg(long)]
    pub new_session: bool,
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_owned(), value.trim().to_owned()))
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Transaction id returned by `checkout`
    pub transaction_id: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective configuration (secrets redacted)
    Show,

    /// Write a profile to the config file
    Init(ConfigInitArgs),

    /// Store a pixel access token in the system keyring (reads stdin)
    SetToken {
        /// Pixel id the token belongs to
        pixel_id: String,
    },
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Pixel id to report conversions to, repeatable
    #[arg(long = "pixel", value_name = "ID")]
    pub pixels: Vec<String>,

    /// Popup variant sent with every charge
    #[arg(long, default_value = "default")]
    pub popup_variant: String,

    /// `content_name` attached to conversion events
    #[arg(long)]
    pub content_name: Option<String>,

    /// Replace an existing profile of the same name
    #[arg(long)]
    pub force: bool,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
