//! API client for the Garmin Connect REST API.
//!
//! Only the upload service is used: body composition measurements are sent
//! as FIT files.

use std::time::Duration;

use reqwest::{header, multipart, Client, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{GarminSession, DESKTOP_USER_AGENT};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Upload endpoint, relative to the Connect API host.
const UPLOAD_PATH: &str = "/upload-service/upload";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Authenticated Connect API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ConnectClient {
    client: Client,
    base_url: String,
    authorization: String,
}

impl ConnectClient {
    /// Create a client authorized with the session's OAuth2 token.
    pub fn new(session: &GarminSession, domain: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(DESKTOP_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("https://connectapi.{}", domain),
            authorization: session.oauth2.authorization(),
        })
    }

    /// Upload a FIT file, retrying with backoff while rate limited.
    pub async fn upload_fit(&self, file_name: &str, contents: Vec<u8>) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, UPLOAD_PATH);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let part = multipart::Part::bytes(contents.clone())
                .file_name(file_name.to_string())
                .mime_str("application/octet-stream")?;
            let form = multipart::Form::new().part("file", part);

            let response = self
                .client
                .post(&url)
                .header(header::AUTHORIZATION, &self.authorization)
                .multipart(form)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    debug!(bytes = text.len(), "Upload response received");
                    // Garmin sometimes answers with an empty body
                    if text.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    return serde_json::from_str(&text)
                        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse upload response: {}", e)));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OAuth1Token, OAuth2Token};

    fn session() -> GarminSession {
        GarminSession {
            oauth1: OAuth1Token {
                oauth_token: "t".into(),
                oauth_token_secret: "s".into(),
                mfa_token: None,
                mfa_expiration_timestamp: None,
                domain: None,
            },
            oauth2: OAuth2Token {
                scope: String::new(),
                jti: String::new(),
                token_type: "bearer".into(),
                access_token: "abc".into(),
                refresh_token: String::new(),
                expires_in: 0,
                expires_at: 0,
                refresh_token_expires_in: 0,
                refresh_token_expires_at: 0,
            },
        }
    }

    #[test]
    fn test_new_uses_domain_and_bearer_token() {
        let client = ConnectClient::new(&session(), "garmin.com").unwrap();
        assert_eq!(client.base_url, "https://connectapi.garmin.com");
        assert_eq!(client.authorization, "Bearer abc");

        let client = ConnectClient::new(&session(), "garmin.cn").unwrap();
        assert_eq!(client.base_url, "https://connectapi.garmin.cn");
    }
}
