use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems that stop a run before any login is attempted.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("GARMIN_EMAIL and GARMIN_PASSWORD must be set in your environment or .env file")]
    MissingLegacyCredentials,

    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("No Garmin exporters found in config")]
    NoExporters,

    #[error("User '{0}' not found in config or has no Garmin exporter")]
    UserNotFound(String),

    #[error("Could not determine home directory")]
    NoHomeDirectory,
}

/// Failures of the upload adapter.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid JSON input: {0}")]
    InvalidInput(#[from] serde_json::Error),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}
