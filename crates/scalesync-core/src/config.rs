//! Application configuration and credential extraction.
//!
//! The configuration file is YAML shared with the rest of the scale sync
//! application. Only the parts that describe Garmin exporters are read here:
//!
//! ```yaml
//! users:
//!   - name: alice
//!     exporters:
//!       - type: garmin
//!         email: ${ALICE_GARMIN_EMAIL}
//!         password: ${ALICE_GARMIN_PASSWORD}
//!         token_dir: ~/.garmin_tokens_alice
//! global_exporters:
//!   - type: garmin
//!     email: shared@example.com
//!     password: ${GARMIN_PASSWORD}
//! ```
//!
//! Other keys are ignored.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use tracing::debug;

use crate::auth::CredentialRecord;
use crate::env::{Env, EnvRefResolver};
use crate::error::SetupError;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Exporter type handled by this crate.
pub const GARMIN_EXPORTER: &str = "garmin";

/// Name given to users declared without one.
const UNKNOWN_USER_NAME: &str = "Unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<UserConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub global_exporters: Vec<ExporterEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user_name", deserialize_with = "name_or_unknown")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exporters: Vec<ExporterEntry>,
}

/// One exporter entry. Credentials are kept as raw YAML values so that
/// numeric or boolean scalars survive until extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExporterEntry {
    #[serde(rename = "type", default, deserialize_with = "scalar_or_empty")]
    pub kind: String,
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub password: Option<Value>,
    #[serde(default)]
    pub token_dir: Option<Value>,
}

impl ExporterEntry {
    pub fn is_garmin(&self) -> bool {
        self.kind == GARMIN_EXPORTER
    }
}

fn default_user_name() -> String {
    UNKNOWN_USER_NAME.to_string()
}

/// A null or non-scalar name falls back to "Unknown", like a missing one.
fn name_or_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(scalar_text)
        .unwrap_or_else(default_user_name))
}

fn scalar_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text).unwrap_or_default())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl RootConfig {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SetupError::ConfigNotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(SetupError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = Self::parse(&contents).map_err(|source| SetupError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), users = config.users.len(), "Config loaded");
        Ok(config)
    }

    /// Parse YAML text. An empty document is an empty config.
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(contents)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value)
    }
}

/// Turns a [`RootConfig`] into per-user Garmin credentials.
///
/// Per-user exporters and global exporters never mix: if any user anywhere
/// declares a garmin exporter, global garmin exporters are ignored for every
/// user, including users that declared none themselves.
pub struct CredentialExtractor<E> {
    resolver: EnvRefResolver<E>,
}

impl<E: Env> CredentialExtractor<E> {
    pub fn new(env: E) -> Self {
        Self {
            resolver: EnvRefResolver::new(env),
        }
    }

    /// Extract credential records in user declaration order.
    pub fn extract(&self, config: &RootConfig) -> Vec<CredentialRecord> {
        let mut records: Vec<CredentialRecord> = config
            .users
            .iter()
            .flat_map(|user| {
                user.exporters
                    .iter()
                    .filter(|entry| entry.is_garmin())
                    .map(move |entry| self.record(&user.name, entry))
            })
            .collect();

        if records.is_empty() {
            for entry in config.global_exporters.iter().filter(|e| e.is_garmin()) {
                for user in &config.users {
                    records.push(self.record(&user.name, entry));
                }
            }
            if !records.is_empty() {
                debug!(count = records.len(), "Applied global garmin exporters to all users");
            }
        }

        records
    }

    fn record(&self, user_name: &str, entry: &ExporterEntry) -> CredentialRecord {
        let token_dir = entry
            .token_dir
            .as_ref()
            .and_then(scalar_text)
            .filter(|dir| !dir.trim().is_empty());

        CredentialRecord::new(
            user_name,
            self.resolved_text(entry.email.as_ref()),
            self.resolved_text(entry.password.as_ref()),
            token_dir,
        )
    }

    /// Resolve placeholders, then render the scalar as text. Anything that
    /// is not a scalar counts as blank.
    fn resolved_text(&self, value: Option<&Value>) -> String {
        value
            .map(|v| self.resolver.resolve_value(v))
            .as_ref()
            .and_then(scalar_text)
            .unwrap_or_default()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn extract(yaml: &str, vars: &[(&str, &str)]) -> Vec<CredentialRecord> {
        let config = RootConfig::parse(yaml).expect("test yaml parses");
        CredentialExtractor::new(env(vars)).extract(&config)
    }

    #[test]
    fn test_round_trip_with_placeholders() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type: garmin
        email: "${E}"
        password: "${P}"
        token_dir: /tmp/a
"#;
        let records = extract(yaml, &[("E", "foo@example.com"), ("P", "secret")]);
        assert_eq!(
            records,
            vec![CredentialRecord::new(
                "alice",
                "foo@example.com",
                "secret",
                Some("/tmp/a".to_string())
            )]
        );
    }

    #[test]
    fn test_per_user_exporters_in_declaration_order() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type: intervals
        api_key: abc
      - type: garmin
        email: a1@example.com
        password: p1
      - type: garmin
        email: a2@example.com
        password: p2
  - name: bob
    exporters:
      - type: garmin
        email: b@example.com
        password: pb
"#;
        let records = extract(yaml, &[]);
        let emails: Vec<_> = records.iter().map(|r| (r.user_name(), r.email())).collect();
        assert_eq!(
            emails,
            vec![
                ("alice", "a1@example.com"),
                ("alice", "a2@example.com"),
                ("bob", "b@example.com"),
            ]
        );
    }

    #[test]
    fn test_global_exporters_apply_to_every_user_once() {
        let yaml = r#"
users:
  - name: alice
  - name: bob
    exporters:
      - type: intervals
global_exporters:
  - type: garmin
    email: shared@example.com
    password: pw
    token_dir: ~/shared
"#;
        let records = extract(yaml, &[]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_name(), "alice");
        assert_eq!(records[1].user_name(), "bob");
        for record in &records {
            assert_eq!(record.email(), "shared@example.com");
            assert_eq!(record.password(), "pw");
            assert_eq!(record.token_dir(), Some("~/shared"));
        }
    }

    #[test]
    fn test_multiple_global_exporters_cross_users() {
        let yaml = r#"
users:
  - name: alice
  - name: bob
global_exporters:
  - type: garmin
    email: one@example.com
    password: pw
  - type: garmin
    email: two@example.com
    password: pw
"#;
        let records = extract(yaml, &[]);
        let pairs: Vec<_> = records.iter().map(|r| (r.user_name(), r.email())).collect();
        assert_eq!(
            pairs,
            vec![
                ("alice", "one@example.com"),
                ("bob", "one@example.com"),
                ("alice", "two@example.com"),
                ("bob", "two@example.com"),
            ]
        );
    }

    #[test]
    fn test_any_per_user_exporter_disables_global_fallback() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type: garmin
        email: alice@example.com
        password: pw
  - name: bob
global_exporters:
  - type: garmin
    email: shared@example.com
    password: pw
"#;
        let records = extract(yaml, &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_name(), "alice");
        assert!(records.iter().all(|r| r.user_name() != "bob"));
    }

    #[test]
    fn test_no_garmin_exporters_anywhere() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type: intervals
global_exporters:
  - type: strava
"#;
        assert!(extract(yaml, &[]).is_empty());
    }

    #[test]
    fn test_global_without_users_yields_nothing() {
        let yaml = r#"
global_exporters:
  - type: garmin
    email: shared@example.com
    password: pw
"#;
        assert!(extract(yaml, &[]).is_empty());
    }

    #[test]
    fn test_type_match_is_case_sensitive() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type: Garmin
        email: a@example.com
        password: pw
"#;
        assert!(extract(yaml, &[]).is_empty());
    }

    #[test]
    fn test_missing_and_non_string_credentials() {
        let yaml = r#"
users:
  - exporters:
      - type: garmin
        password: 123456
      - type: garmin
        email: [nested]
        password: true
        token_dir: ""
"#;
        let records = extract(yaml, &[]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_name(), "Unknown");
        assert_eq!(records[0].email(), "");
        assert_eq!(records[0].password(), "123456");
        assert_eq!(records[1].email(), "");
        assert_eq!(records[1].password(), "true");
        assert_eq!(records[1].token_dir(), None);
    }

    #[test]
    fn test_unresolved_placeholder_kept() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type: garmin
        email: "${NOT_SET}"
        password: pw
"#;
        let records = extract(yaml, &[]);
        assert_eq!(records[0].email(), "${NOT_SET}");
    }

    #[test]
    fn test_token_dir_taken_verbatim() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type: garmin
        email: a@example.com
        password: pw
        token_dir: "${DIR}/tokens"
"#;
        let records = extract(yaml, &[("DIR", "/srv")]);
        assert_eq!(records[0].token_dir(), Some("${DIR}/tokens"));
    }

    #[test]
    fn test_parse_empty_and_null_sections() {
        assert!(RootConfig::parse("").unwrap().users.is_empty());
        assert!(RootConfig::parse("   \n").unwrap().users.is_empty());

        let config = RootConfig::parse("users:\nglobal_exporters:\n").unwrap();
        assert!(config.users.is_empty());
        assert!(config.global_exporters.is_empty());

        let config = RootConfig::parse("scale:\n  mac: AA:BB\nusers:\n  - name: x\n    exporters:\n").unwrap();
        assert_eq!(config.users.len(), 1);
        assert!(config.users[0].exporters.is_empty());
    }

    #[test]
    fn test_null_user_name_becomes_unknown() {
        let yaml = r#"
users:
  - name:
    exporters:
      - type: garmin
        email: a@example.com
        password: pw
"#;
        let records = extract(yaml, &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_name(), "Unknown");
    }

    #[test]
    fn test_incomplete_other_exporter_does_not_block_garmin() {
        let yaml = r#"
users:
  - name: alice
    exporters:
      - type:
        url: x
      - type: [mqtt]
      - type: garmin
        email: a@example.com
        password: pw
global_exporters:
  - type:
"#;
        let config = RootConfig::parse(yaml).unwrap();
        assert_eq!(config.users[0].exporters[0].kind, "");
        assert!(!config.global_exporters[0].is_garmin());

        let records = CredentialExtractor::new(env(&[])).extract(&config);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_name(), "alice");
        assert_eq!(records[0].email(), "a@example.com");
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(RootConfig::parse("users: 5").is_err());
        assert!(RootConfig::parse("users: [").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        match RootConfig::load(&path) {
            Err(SetupError::ConfigNotFound(p)) => assert_eq!(p, path),
            other => panic!("expected ConfigNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "users: [unclosed").unwrap();
        let err = RootConfig::load(&path).unwrap_err();
        assert!(matches!(err, SetupError::ConfigParse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "users:\n  - name: alice\n    exporters:\n      - type: garmin\n        email: a@b.c\n        password: pw\n",
        )
        .unwrap();
        let config = RootConfig::load(&path).unwrap();
        assert_eq!(config.users[0].name, "alice");
        assert!(config.users[0].exporters[0].is_garmin());
    }
}
