use std::path::PathBuf;

use thiserror::Error;

use crate::api::error::truncate_body;

/// Errors from a single account's login or token handling.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing email or password")]
    MissingCredentials,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Multi-factor authentication required but no MFA prompt is available")]
    MfaRequired,

    #[error("Failed to read MFA code: {0}")]
    MfaPrompt(String),

    #[error("Request blocked by Garmin (HTTP {0}) - too many attempts from this network")]
    Blocked(u16),

    #[error("Login rejected, unexpected page title: {0}")]
    LoginRejected(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to save tokens to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load tokens from {}: {reason}", path.display())]
    TokenLoad { path: PathBuf, reason: String },

    #[error("Invalid token data: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => AuthError::InvalidCredentials,
            code @ (403 | 429) => AuthError::Blocked(code),
            _ => AuthError::UnexpectedResponse(format!(
                "Status {}: {}",
                status,
                truncate_body(body)
            )),
        }
    }
}
