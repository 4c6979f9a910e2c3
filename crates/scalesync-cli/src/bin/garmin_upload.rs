//! garmin-upload - upload one body composition measurement to Garmin Connect.
//!
//! Reads a JSON measurement on stdin and writes a JSON result on stdout:
//! `{"success": true, "data": {...}}` or `{"success": false, "error": "..."}`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::error;

use scalesync_cli::init_tracing;
use scalesync_core::{
    process_upload, GarminSsoClient, GarminUploader, TokenDirResolver, UploadReport, DEFAULT_DOMAIN,
};

#[derive(Parser, Debug)]
#[command(name = "garmin-upload")]
#[command(about = "Upload body composition to Garmin Connect")]
struct Args {
    /// Directory containing auth tokens (or set TOKEN_DIR env var, default: ~/.garmin_tokens)
    #[arg(long)]
    token_dir: Option<String>,

    /// Garmin domain used when the stored tokens do not name one
    #[arg(long, default_value = DEFAULT_DOMAIN)]
    domain: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing();

    let report = match run(&args).await {
        Ok(report) => report,
        Err(e) => {
            error!("{:#}", e);
            UploadReport {
                success: false,
                data: None,
                error: Some(format!("{:#}", e)),
            }
        }
    };

    match serde_json::to_string(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!(error = %e, "Failed to serialize upload report");
            return ExitCode::FAILURE;
        }
    }

    if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(args: &Args) -> Result<UploadReport> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("Failed to read stdin")?;

    let token_dir = TokenDirResolver::from_process()?.resolve(args.token_dir.as_deref());
    let uploader = GarminUploader::new(token_dir, GarminSsoClient::new()?.with_domain(&args.domain));
    Ok(process_upload(&raw, &uploader).await)
}
