//! Command dispatch: bridges CLI args to the checkout core and output formatting.

pub mod checkout;
pub mod config_cmd;
pub mod status;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a backend-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Checkout(args) => checkout::handle(args, resolved, global).await,
        Command::Status(args) => status::handle(&args, &resolved, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
