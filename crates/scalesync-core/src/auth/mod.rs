//! Authentication against Garmin Connect.
//!
//! This module provides:
//! - `CredentialRecord`: per-account credentials resolved from config or env
//! - `SessionClient`: the login/persist seam used by the setup orchestrator
//! - `GarminSsoClient`: the real client (SSO sign-in, OAuth1, OAuth2)
//! - `GarminSession`: OAuth tokens stored in a token directory

pub mod credentials;
pub mod error;
pub mod oauth1;
pub mod session;
pub mod sso;

use std::path::Path;

use async_trait::async_trait;

pub use credentials::CredentialRecord;
pub use error::AuthError;
pub use session::{GarminSession, OAuth1Token, OAuth2Token};
pub use sso::{GarminSsoClient, MfaPrompt, DEFAULT_DOMAIN, DESKTOP_USER_AGENT};

/// Logs in to the remote service and stores the resulting session.
///
/// The session type is opaque to callers; they only hand it back to
/// [`SessionClient::persist`].
#[async_trait]
pub trait SessionClient: Send + Sync {
    type Session: Send;

    async fn login(&self, email: &str, password: &str) -> Result<Self::Session, AuthError>;

    /// Write the session into `dir`. The directory already exists.
    fn persist(&self, session: &Self::Session, dir: &Path) -> Result<(), AuthError>;
}
