use std::fmt;

use crate::env::Env;
use crate::error::SetupError;

use super::AuthError;

/// Environment variables read in legacy (single account) mode.
pub const EMAIL_ENV: &str = "GARMIN_EMAIL";
pub const PASSWORD_ENV: &str = "GARMIN_PASSWORD";

/// User name reported for the legacy single-account run.
pub const LEGACY_USER_NAME: &str = "default";

/// Credentials for one account, resolved fresh on every run.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    user_name: String,
    email: String,
    password: String,
    token_dir: Option<String>,
}

impl CredentialRecord {
    pub fn new(
        user_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        token_dir: Option<String>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            email: email.into(),
            password: password.into(),
            token_dir,
        }
    }

    /// Read `GARMIN_EMAIL` / `GARMIN_PASSWORD`. Both must be non-blank.
    pub fn from_legacy_env(env: &impl Env) -> Result<Self, SetupError> {
        let email = env.var(EMAIL_ENV).unwrap_or_default().trim().to_string();
        let password = env.var(PASSWORD_ENV).unwrap_or_default().trim().to_string();

        if email.is_empty() || password.is_empty() {
            return Err(SetupError::MissingLegacyCredentials);
        }

        Ok(Self::new(LEGACY_USER_NAME, email, password, None))
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Token directory configured for this account, if any.
    pub fn token_dir(&self) -> Option<&str> {
        self.token_dir.as_deref()
    }

    /// Trimmed email and password, or an error if either is blank.
    pub fn login_pair(&self) -> Result<(&str, &str), AuthError> {
        let email = self.email.trim();
        let password = self.password.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok((email, password))
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("user_name", &self.user_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("token_dir", &self.token_dir)
            .finish()
    }
}
