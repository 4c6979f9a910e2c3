//! garmin-setup - authenticate with Garmin Connect and store session tokens.
//!
//! Without `--from-config` the account comes from `GARMIN_EMAIL` and
//! `GARMIN_PASSWORD`. With it, every Garmin exporter in the config file is
//! authenticated in turn.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use scalesync_cli::{init_tracing, prompt_mfa_code};
use scalesync_core::{
    Authenticator, BatchReport, GarminSsoClient, DEFAULT_CONFIG_PATH, DEFAULT_DOMAIN,
};

#[derive(Parser, Debug)]
#[command(name = "garmin-setup")]
#[command(about = "Setup Garmin Connect authentication")]
struct Args {
    /// Read users and credentials from the config file
    #[arg(long)]
    from_config: bool,

    /// Path to the config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,

    /// Setup only this user
    #[arg(long, requires = "from_config")]
    user: Option<String>,

    /// Override token directory (or set TOKEN_DIR env var)
    #[arg(long)]
    token_dir: Option<String>,

    /// Garmin domain (garmin.cn for accounts in China)
    #[arg(long, default_value = DEFAULT_DOMAIN)]
    domain: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing();

    match run(&args).await {
        Ok(report) if report.is_success() => {
            info!(users = report.outcomes.len(), "All users authenticated");
            println!("All done! You can now sync your scale.");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            for failure in report.failures() {
                error!(
                    user = %failure.user_name,
                    error = failure.error_message.as_deref().unwrap_or("unknown error"),
                    "Setup failed"
                );
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<BatchReport> {
    let client = GarminSsoClient::new()?
        .with_domain(&args.domain)
        .with_mfa_prompt(prompt_mfa_code);
    let auth = Authenticator::from_process(&client)?;

    let report = if args.from_config {
        info!(path = %args.config_path.display(), "Reading users from config");
        auth.run_from_config_path(
            &args.config_path,
            args.user.as_deref(),
            args.token_dir.as_deref(),
        )
        .await?
    } else {
        auth.run_legacy(args.token_dir.as_deref()).await?
    };
    Ok(report)
}
