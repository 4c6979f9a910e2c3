//! Token directory resolution.
//!
//! Tokens used to live in `~/.garmin_renpho_tokens`. The default is now
//! `~/.garmin_tokens`, but installations that authenticated under the old
//! name keep working until the new directory appears.

use std::path::PathBuf;

use tracing::debug;

use crate::env::{Env, ProcessEnv};
use crate::error::SetupError;

/// Environment variable that overrides the default token directory.
pub const TOKEN_DIR_ENV: &str = "TOKEN_DIR";

/// Default token directory name, relative to the home directory.
const DEFAULT_DIR_NAME: &str = ".garmin_tokens";

/// Token directory name used by earlier releases.
const LEGACY_DIR_NAME: &str = ".garmin_renpho_tokens";

pub struct TokenDirResolver<E> {
    env: E,
    home: PathBuf,
}

impl TokenDirResolver<ProcessEnv> {
    /// Resolver backed by the process environment and the user's home directory.
    pub fn from_process() -> Result<Self, SetupError> {
        let home = dirs::home_dir().ok_or(SetupError::NoHomeDirectory)?;
        Ok(Self::new(ProcessEnv, home))
    }
}

impl<E: Env> TokenDirResolver<E> {
    pub fn new(env: E, home: PathBuf) -> Self {
        Self { env, home }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Resolve using the `TOKEN_DIR` environment variable.
    pub fn resolve(&self, explicit: Option<&str>) -> PathBuf {
        self.resolve_with_var(explicit, TOKEN_DIR_ENV)
    }

    /// Resolve the token directory. First match wins:
    /// a non-blank explicit override, a non-blank `var_name`, the legacy
    /// directory if it exists while the new one does not, the new default.
    ///
    /// Directory existence is checked on every call.
    pub fn resolve_with_var(&self, explicit: Option<&str>, var_name: &str) -> PathBuf {
        if let Some(dir) = explicit.map(str::trim).filter(|d| !d.is_empty()) {
            debug!(dir, "Using explicit token directory");
            return self.expand(dir);
        }

        if let Some(dir) = self.env.var(var_name) {
            let dir = dir.trim();
            if !dir.is_empty() {
                debug!(dir, var = var_name, "Using token directory from environment");
                return self.expand(dir);
            }
        }

        let new = self.home.join(DEFAULT_DIR_NAME);
        let legacy = self.home.join(LEGACY_DIR_NAME);
        if legacy.is_dir() && !new.is_dir() {
            debug!(dir = %legacy.display(), "Using legacy token directory");
            return legacy;
        }
        new
    }

    /// Expand `~` against the configured home directory and make the path absolute.
    fn expand(&self, dir: &str) -> PathBuf {
        let home = self.home.to_string_lossy();
        let expanded = shellexpand::tilde_with_context(dir, || Some(home.as_ref()));
        let path = PathBuf::from(expanded.as_ref());
        std::path::absolute(&path).unwrap_or(path)
    }
}
