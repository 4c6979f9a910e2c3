//! Garmin SSO login.
//!
//! The sign-in flow mirrors what the Garmin Connect web widget does:
//!
//! 1. `GET /sso/embed` to pick up session cookies
//! 2. `GET /sso/signin` and scrape the `_csrf` token
//! 3. `POST /sso/signin` with the credentials (plus an MFA step if asked)
//! 4. exchange the service ticket for an OAuth1 token (`preauthorized`)
//! 5. exchange the OAuth1 token for an OAuth2 bearer token
//!
//! SSO requests carry a desktop browser `User-Agent`; Garmin's bot
//! detection rejects the default one. The `oauth-service` calls carry the
//! Connect mobile app's agent instead.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::{header, Client, Response};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::oauth1::{self, OAuthConsumer, TokenCredentials};
use super::{AuthError, GarminSession, OAuth1Token, OAuth2Token, SessionClient};

// ============================================================================
// Constants
// ============================================================================

/// Browser identity sent with every SSO request.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Identity expected by the OAuth endpoints.
const MOBILE_USER_AGENT: &str = "com.garmin.android.apps.connectmobile";

/// Public location of the Connect app's OAuth consumer credentials.
const OAUTH_CONSUMER_URL: &str = "https://thegarth.s3.amazonaws.com/oauth_consumer.json";

pub const DEFAULT_DOMAIN: &str = "garmin.com";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

static CSRF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="_csrf"\s+value="(.+?)""#).expect("csrf pattern is valid"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>(.+?)</title>").expect("title pattern is valid"));
static TICKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"embed\?ticket=([^"]+)""#).expect("ticket pattern is valid"));

/// Supplies a one-time MFA code when Garmin asks for one.
pub type MfaPrompt = Box<dyn Fn() -> anyhow::Result<String> + Send + Sync>;

pub struct GarminSsoClient {
    client: Client,
    domain: String,
    consumer: OnceCell<OAuthConsumer>,
    mfa_prompt: Option<MfaPrompt>,
}

impl GarminSsoClient {
    pub fn new() -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .cookie_store(true)
            .user_agent(DESKTOP_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            domain: DEFAULT_DOMAIN.to_string(),
            consumer: OnceCell::new(),
            mfa_prompt: None,
        })
    }

    /// Use another Garmin domain, e.g. `garmin.cn`.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_mfa_prompt<F>(mut self, prompt: F) -> Self
    where
        F: Fn() -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.mfa_prompt = Some(Box::new(prompt));
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn sso_url(&self, path: &str) -> String {
        format!("https://sso.{}/sso{}", self.domain, path)
    }

    fn oauth_url(&self, path: &str) -> String {
        format!("https://connectapi.{}/oauth-service/oauth/{}", self.domain, path)
    }

    fn signin_params(&self) -> Vec<(&'static str, String)> {
        let embed = self.sso_url("/embed");
        vec![
            ("id", "gauth-widget".to_string()),
            ("embedWidget", "true".to_string()),
            ("gauthHost", embed.clone()),
            ("service", embed.clone()),
            ("source", embed.clone()),
            ("redirectAfterAccountLoginUrl", embed.clone()),
            ("redirectAfterAccountCreationUrl", embed),
        ]
    }

    /// Run the SSO pages and return the service ticket.
    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let embed_params = [
            ("id", "gauth-widget".to_string()),
            ("embedWidget", "true".to_string()),
            ("gauthHost", self.sso_url("")),
        ];
        let response = self
            .client
            .get(self.sso_url("/embed"))
            .query(&embed_params)
            .send()
            .await?;
        let (referer, _) = read_page(response).await?;

        let signin_url = self.sso_url("/signin");
        let params = self.signin_params();

        let response = self
            .client
            .get(&signin_url)
            .query(&params)
            .header(header::REFERER, &referer)
            .send()
            .await?;
        let (referer, page) = read_page(response).await?;
        let csrf = capture(&CSRF_RE, &page, "CSRF token")?;

        debug!("Submitting credentials");
        let form = [
            ("username", email),
            ("password", password),
            ("embed", "true"),
            ("_csrf", csrf.as_str()),
        ];
        let response = self
            .client
            .post(&signin_url)
            .query(&params)
            .header(header::REFERER, &referer)
            .form(&form)
            .send()
            .await?;
        let (referer, mut page) = read_page(response).await?;

        let mut title = capture(&TITLE_RE, &page, "page title")?;
        if title.contains("MFA") {
            page = self.verify_mfa(&page, &params, &referer).await?;
            title = capture(&TITLE_RE, &page, "page title")?;
        }
        if title != "Success" {
            return Err(AuthError::LoginRejected(title));
        }

        capture(&TICKET_RE, &page, "service ticket")
    }

    async fn verify_mfa(
        &self,
        page: &str,
        params: &[(&'static str, String)],
        referer: &str,
    ) -> Result<String, AuthError> {
        let prompt = self.mfa_prompt.as_ref().ok_or(AuthError::MfaRequired)?;
        let csrf = capture(&CSRF_RE, page, "MFA CSRF token")?;

        info!("Garmin requested a multi-factor authentication code");
        let code = prompt().map_err(|e| AuthError::MfaPrompt(e.to_string()))?;

        let form = [
            ("mfa-code", code.trim()),
            ("embed", "true"),
            ("_csrf", csrf.as_str()),
            ("fromPage", "setupEnterMfaCode"),
        ];
        let response = self
            .client
            .post(self.sso_url("/verifyMFA/loginEnterMfaCode"))
            .query(params)
            .header(header::REFERER, referer)
            .form(&form)
            .send()
            .await?;
        let (_, page) = read_page(response).await?;
        Ok(page)
    }

    async fn consumer(&self) -> Result<&OAuthConsumer, AuthError> {
        self.consumer
            .get_or_try_init(|| async {
                let response = self.client.get(OAUTH_CONSUMER_URL).send().await?;
                let response = check_response(response).await?;
                Ok::<_, AuthError>(response.json::<OAuthConsumer>().await?)
            })
            .await
    }

    /// Trade the SSO ticket for an OAuth1 token.
    async fn preauthorize(&self, ticket: &str) -> Result<OAuth1Token, AuthError> {
        let consumer = self.consumer().await?;
        let url = self.oauth_url("preauthorized");
        let login_url = self.sso_url("/embed");
        let query = [
            ("ticket", ticket),
            ("login-url", login_url.as_str()),
            ("accepts-mfa-tokens", "true"),
        ];

        let authorization = oauth1::authorization_header("GET", &url, consumer, None, &query);
        let response = self
            .client
            .get(&url)
            .query(&query)
            .header(header::AUTHORIZATION, authorization)
            .header(header::USER_AGENT, MOBILE_USER_AGENT)
            .send()
            .await?;
        let body = check_response(response).await?.text().await?;

        parse_oauth1_response(&body, &self.domain)
    }

    /// Exchange an OAuth1 token for a fresh OAuth2 token.
    pub async fn exchange(&self, oauth1: &OAuth1Token) -> Result<OAuth2Token, AuthError> {
        let consumer = self.consumer().await?;
        let url = self.oauth_url("exchange/user/2.0");

        let mut form: Vec<(&str, &str)> = Vec::new();
        if let Some(ref mfa_token) = oauth1.mfa_token {
            form.push(("mfa_token", mfa_token.as_str()));
        }

        let token = TokenCredentials {
            token: &oauth1.oauth_token,
            secret: &oauth1.oauth_token_secret,
        };
        let authorization = oauth1::authorization_header("POST", &url, consumer, Some(token), &form);
        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, authorization)
            .header(header::USER_AGENT, MOBILE_USER_AGENT)
            .form(&form)
            .send()
            .await?;
        let token: OAuth2Token = check_response(response).await?.json().await?;

        Ok(token.with_expirations(Utc::now().timestamp()))
    }

    /// Replace an expired OAuth2 token in place.
    pub async fn refresh(&self, session: &mut GarminSession) -> Result<(), AuthError> {
        debug!("Exchanging OAuth1 token for a new OAuth2 token");
        session.oauth2 = self.exchange(&session.oauth1).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionClient for GarminSsoClient {
    type Session = GarminSession;

    async fn login(&self, email: &str, password: &str) -> Result<GarminSession, AuthError> {
        let ticket = self.sign_in(email, password).await?;
        debug!("SSO ticket received");
        let oauth1 = self.preauthorize(&ticket).await?;
        let oauth2 = self.exchange(&oauth1).await?;
        Ok(GarminSession { oauth1, oauth2 })
    }

    fn persist(&self, session: &GarminSession, dir: &Path) -> Result<(), AuthError> {
        session.save(dir)
    }
}

/// Check status and return the final URL together with the body.
async fn read_page(response: Response) -> Result<(String, String), AuthError> {
    let response = check_response(response).await?;
    let url = response.url().to_string();
    let body = response.text().await?;
    Ok((url, body))
}

async fn check_response(response: Response) -> Result<Response, AuthError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::from_status(status, &body))
    }
}

fn capture(re: &Regex, page: &str, what: &str) -> Result<String, AuthError> {
    re.captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AuthError::UnexpectedResponse(format!("Could not find {} in SSO response", what)))
}

/// Parse the form-encoded `preauthorized` response.
fn parse_oauth1_response(body: &str, domain: &str) -> Result<OAuth1Token, AuthError> {
    let mut token = OAuth1Token {
        oauth_token: String::new(),
        oauth_token_secret: String::new(),
        mfa_token: None,
        mfa_expiration_timestamp: None,
        domain: Some(domain.to_string()),
    };

    for pair in body.trim().split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        match key {
            "oauth_token" => token.oauth_token = value,
            "oauth_token_secret" => token.oauth_token_secret = value,
            "mfa_token" => token.mfa_token = Some(value),
            "mfa_expiration_timestamp" => token.mfa_expiration_timestamp = Some(value),
            _ => {}
        }
    }

    if token.oauth_token.is_empty() || token.oauth_token_secret.is_empty() {
        return Err(AuthError::UnexpectedResponse(
            "OAuth1 response did not contain a token".to_string(),
        ));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_csrf() {
        let page = r#"<form><input type="hidden" name="_csrf"
            value="ABC123-def" /></form>"#;
        assert_eq!(capture(&CSRF_RE, page, "csrf").unwrap(), "ABC123-def");
        assert!(matches!(
            capture(&CSRF_RE, "<html></html>", "csrf"),
            Err(AuthError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_capture_title_and_ticket() {
        let page = r#"<html><head><title>Success</title></head>
            <script>var response_url = "https:\/\/sso.garmin.com\/sso\/embed?ticket=ST-0123-abc-cas";</script>"#;
        assert_eq!(capture(&TITLE_RE, page, "title").unwrap(), "Success");
        assert_eq!(capture(&TICKET_RE, page, "ticket").unwrap(), "ST-0123-abc-cas");
    }

    #[test]
    fn test_parse_oauth1_response() {
        let token = parse_oauth1_response(
            "oauth_token=abc&oauth_token_secret=s%2Fcret&mfa_token=m1&mfa_expiration_timestamp=2024-01-01+00%3A00%3A00.000",
            "garmin.com",
        )
        .unwrap();
        assert_eq!(token.oauth_token, "abc");
        assert_eq!(token.oauth_token_secret, "s/cret");
        assert_eq!(token.mfa_token.as_deref(), Some("m1"));
        assert_eq!(token.mfa_expiration_timestamp.as_deref(), Some("2024-01-01 00:00:00.000"));
        assert_eq!(token.domain.as_deref(), Some("garmin.com"));
    }

    #[test]
    fn test_parse_oauth1_response_without_token() {
        assert!(parse_oauth1_response("error=denied", "garmin.com").is_err());
        assert!(parse_oauth1_response("", "garmin.com").is_err());
    }

    #[test]
    fn test_urls_follow_domain() {
        let client = GarminSsoClient::new().unwrap().with_domain("garmin.cn");
        assert_eq!(client.sso_url("/signin"), "https://sso.garmin.cn/sso/signin");
        assert_eq!(
            client.oauth_url("preauthorized"),
            "https://connectapi.garmin.cn/oauth-service/oauth/preauthorized"
        );
        let params = client.signin_params();
        assert!(params.iter().any(|(k, v)| *k == "service" && v == "https://sso.garmin.cn/sso/embed"));
    }

    #[test]
    fn test_desktop_user_agent() {
        assert!(DESKTOP_USER_AGENT.starts_with("Mozilla/5.0 (Macintosh"));
        assert!(DESKTOP_USER_AGENT.ends_with("Safari/537.36"));
        assert!(!DESKTOP_USER_AGENT.contains("  "));
    }
}
