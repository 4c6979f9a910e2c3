//! Garmin authentication for one or many users.
//!
//! Legacy mode authenticates the single account named by `GARMIN_EMAIL` and
//! `GARMIN_PASSWORD`. Batch mode authenticates every Garmin exporter found
//! in the config file, one user at a time. A failure for one user is
//! recorded in the [`BatchReport`] and never stops the others.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, CredentialRecord, SessionClient};
use crate::config::{CredentialExtractor, RootConfig};
use crate::env::{Env, ProcessEnv};
use crate::error::SetupError;
use crate::token_dir::TokenDirResolver;

/// Result of authenticating one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub user_name: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub token_dir: Option<PathBuf>,
}

impl AuthOutcome {
    fn succeeded(user_name: &str, token_dir: PathBuf) -> Self {
        Self {
            user_name: user_name.to_string(),
            success: true,
            error_message: None,
            token_dir: Some(token_dir),
        }
    }

    fn failed(user_name: &str, error: &AuthError, token_dir: Option<PathBuf>) -> Self {
        Self {
            user_name: user_name.to_string(),
            success: false,
            error_message: Some(error.to_string()),
            token_dir,
        }
    }
}

/// Outcomes of one run, in the order they were reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<AuthOutcome>,
}

impl BatchReport {
    /// True when at least one user was attempted and all of them succeeded.
    pub fn is_success(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AuthOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

/// Drives a [`SessionClient`] through the configured accounts.
pub struct Authenticator<'a, C, E> {
    client: &'a C,
    token_dirs: TokenDirResolver<E>,
}

impl<'a, C: SessionClient> Authenticator<'a, C, ProcessEnv> {
    /// Authenticator reading the process environment and the user's home directory.
    pub fn from_process(client: &'a C) -> Result<Self, SetupError> {
        Ok(Self::new(client, TokenDirResolver::from_process()?))
    }
}

impl<'a, C: SessionClient, E: Env> Authenticator<'a, C, E> {
    pub fn new(client: &'a C, token_dirs: TokenDirResolver<E>) -> Self {
        Self { client, token_dirs }
    }

    /// Log in and store the session in `token_dir`, creating it if needed.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        token_dir: &Path,
    ) -> Result<(), AuthError> {
        info!(email, "Authenticating");
        let session = self.client.login(email, password).await?;

        std::fs::create_dir_all(token_dir).map_err(|source| AuthError::Persist {
            path: token_dir.to_path_buf(),
            source,
        })?;
        self.client.persist(&session, token_dir)?;

        info!(dir = %token_dir.display(), "Tokens saved");
        Ok(())
    }

    /// Authenticate the account from `GARMIN_EMAIL` / `GARMIN_PASSWORD`.
    pub async fn run_legacy(&self, cli_token_dir: Option<&str>) -> Result<BatchReport, SetupError> {
        let record = CredentialRecord::from_legacy_env(self.token_dirs.env())?;
        let outcome = self.attempt(&record, cli_token_dir).await;
        Ok(BatchReport {
            outcomes: vec![outcome],
        })
    }

    /// Load `path` and authenticate the users it declares.
    pub async fn run_from_config_path(
        &self,
        path: &Path,
        target_user: Option<&str>,
        cli_token_dir: Option<&str>,
    ) -> Result<BatchReport, SetupError> {
        let config = RootConfig::load(path)?;
        self.run_from_config(&config, target_user, cli_token_dir).await
    }

    /// Authenticate every Garmin exporter in `config`, or only those of
    /// `target_user`. Records with blank credentials fail before any login.
    pub async fn run_from_config(
        &self,
        config: &RootConfig,
        target_user: Option<&str>,
        cli_token_dir: Option<&str>,
    ) -> Result<BatchReport, SetupError> {
        let mut records = CredentialExtractor::new(self.token_dirs.env()).extract(config);
        if records.is_empty() {
            return Err(SetupError::NoExporters);
        }

        if let Some(target) = target_user {
            records.retain(|r| r.user_name() == target);
            if records.is_empty() {
                return Err(SetupError::UserNotFound(target.to_string()));
            }
        }

        let mut report = BatchReport::default();
        let mut pending = Vec::with_capacity(records.len());
        for record in &records {
            match record.login_pair() {
                Ok(_) => pending.push(record),
                Err(e) => {
                    error!(
                        user = record.user_name(),
                        "Missing email or password. Add credentials to config.yaml or set env vars"
                    );
                    report.outcomes.push(AuthOutcome::failed(record.user_name(), &e, None));
                }
            }
        }

        for record in pending {
            info!(user = record.user_name(), "Setting up Garmin");
            let outcome = self.attempt(record, cli_token_dir).await;
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    async fn attempt(&self, record: &CredentialRecord, cli_token_dir: Option<&str>) -> AuthOutcome {
        let user = record.user_name();
        debug!(user, state = "ResolvingDirectory", "Credential state changed");
        let explicit = cli_token_dir
            .filter(|d| !d.trim().is_empty())
            .or(record.token_dir());
        let token_dir = self.token_dirs.resolve(explicit);

        debug!(user, state = "Authenticating", dir = %token_dir.display(), "Credential state changed");
        let result = match record.login_pair() {
            Ok((email, password)) => self.authenticate(email, password, &token_dir).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(user, state = "Persisted", "Credential state changed");
                AuthOutcome::succeeded(user, token_dir)
            }
            Err(e) => {
                error!(user, error = %e, "Authentication failed");
                if !matches!(e, AuthError::MissingCredentials) {
                    warn!(
                        "If Garmin is blocking your IP, try running garmin-setup from a different \
                         machine or network, then copy the token directory ({}) to this machine.",
                        token_dir.display()
                    );
                }
                debug!(user, state = "Failed", "Credential state changed");
                AuthOutcome::failed(user, &e, Some(token_dir))
            }
        }
    }
}
