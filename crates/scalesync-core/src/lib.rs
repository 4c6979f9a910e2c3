//! scalesync core - Garmin Connect authentication and body composition upload.
//!
//! This crate provides:
//! - `config`: YAML config with per-user and global Garmin exporters
//! - `env` / `token_dir`: `${VAR}` expansion and token directory resolution
//! - `auth`: Garmin SSO login and the `oauth1_token.json` / `oauth2_token.json` session files
//! - `setup`: legacy and config-driven authentication of one or many users
//! - `upload`: FIT encoding and upload of a single measurement

pub mod api;
pub mod auth;
pub mod config;
pub mod env;
pub mod error;
pub mod fit;
pub mod models;
pub mod setup;
pub mod token_dir;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use auth::{
    AuthError, CredentialRecord, GarminSession, GarminSsoClient, SessionClient, DEFAULT_DOMAIN,
};
pub use config::{CredentialExtractor, RootConfig, DEFAULT_CONFIG_PATH};
pub use env::{Env, EnvRefResolver, ProcessEnv};
pub use error::{SetupError, UploadError};
pub use models::BodyComposition;
pub use setup::{AuthOutcome, Authenticator, BatchReport};
pub use token_dir::{TokenDirResolver, TOKEN_DIR_ENV};
pub use upload::{process_upload, BodyCompositionSink, GarminUploader, UploadReport};
