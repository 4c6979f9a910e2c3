use std::path::Path;

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::AuthError;

/// File names inside a token directory. These match the files written by
/// the Python `garth` library, so token directories are interchangeable.
const OAUTH1_FILE: &str = "oauth1_token.json";
const OAUTH2_FILE: &str = "oauth2_token.json";

/// Long-lived token obtained from the SSO ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth1Token {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    #[serde(default)]
    pub mfa_token: Option<String>,
    #[serde(default)]
    pub mfa_expiration_timestamp: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Short-lived bearer token used for Connect API calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Token {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub jti: String,
    #[serde(default)]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub refresh_token_expires_in: i64,
    #[serde(default)]
    pub refresh_token_expires_at: i64,
}

impl OAuth2Token {
    /// Fill in absolute expiry times from the relative ones in the exchange response.
    pub fn with_expirations(mut self, now: i64) -> Self {
        self.expires_at = now + self.expires_in;
        self.refresh_token_expires_at = now + self.refresh_token_expires_in;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }

    /// Value for the `Authorization` header, e.g. `Bearer abc`.
    pub fn authorization(&self) -> String {
        let mut chars = self.token_type.chars();
        let scheme = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => "Bearer".to_string(),
        };
        format!("{} {}", scheme, self.access_token)
    }
}

/// Tokens for one Garmin account.
#[derive(Debug, Clone, PartialEq)]
pub struct GarminSession {
    pub oauth1: OAuth1Token,
    pub oauth2: OAuth2Token,
}

impl GarminSession {
    /// Load both token files from `dir`.
    pub fn load(dir: &Path) -> Result<Self, AuthError> {
        Ok(Self {
            oauth1: read_json(&dir.join(OAUTH1_FILE))?,
            oauth2: read_json(&dir.join(OAUTH2_FILE))?,
        })
    }

    /// Write both token files into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), AuthError> {
        std::fs::create_dir_all(dir).map_err(|source| AuthError::Persist {
            path: dir.to_path_buf(),
            source,
        })?;
        write_json(&dir.join(OAUTH1_FILE), &self.oauth1)?;
        write_json(&dir.join(OAUTH2_FILE), &self.oauth2)?;
        Ok(())
    }

    /// Whether `dir` holds a complete set of token files.
    pub fn exists_in(dir: &Path) -> bool {
        dir.join(OAUTH1_FILE).is_file() && dir.join(OAUTH2_FILE).is_file()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AuthError> {
    let contents = std::fs::read_to_string(path).map_err(|e| AuthError::TokenLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| AuthError::TokenLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AuthError> {
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(path, contents).map_err(|source| AuthError::Persist {
        path: path.to_path_buf(),
        source,
    })
}
