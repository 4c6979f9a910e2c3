//! Environment lookup and `${VAR}` placeholder resolution.
//!
//! Everything that reads environment variables goes through the [`Env`]
//! trait so that resolution can be exercised against a fixed map in tests
//! instead of the process environment.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_yaml::Value;
use tracing::warn;

/// Matches `${NAME}` placeholders. `$NAME` without braces is left alone.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Read-only view of environment variables.
pub trait Env {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Env for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<E: Env + ?Sized> Env for &E {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}

/// Substitutes `${NAME}` placeholders in configuration values.
pub struct EnvRefResolver<E> {
    env: E,
}

impl<E: Env> EnvRefResolver<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Replace every `${NAME}` in `input`, left to right.
    ///
    /// Unset variables keep their placeholder text and produce a warning.
    /// Substituted values are not scanned again.
    pub fn resolve_str(&self, input: &str) -> String {
        PLACEHOLDER
            .replace_all(input, |caps: &Captures| {
                let name = &caps[1];
                match self.env.var(name) {
                    Some(value) => value,
                    None => {
                        warn!(variable = name, "Environment variable is not set");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// Resolve a configuration value. Only strings are rewritten; numbers,
    /// booleans, sequences and maps are returned as they are.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve_str(s)),
            other => other.clone(),
        }
    }
}
