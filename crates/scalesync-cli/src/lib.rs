//! Shared plumbing for the `garmin-setup` and `garmin-upload` binaries.

use std::io;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout stays free for command output.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Ask the operator for a multi-factor authentication code on the terminal.
pub fn prompt_mfa_code() -> Result<String> {
    let code = rpassword::prompt_password("MFA code: ").context("Failed to read MFA code")?;
    Ok(code.trim().to_string())
}
