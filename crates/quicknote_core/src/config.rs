//! Client configuration.
//!
//! # Responsibility
//! - Hold the settings shared by the core and the CLI front end.
//! - Layer sources: defaults, JSON file, environment, then caller overrides.
//!
//! # Invariants
//! - A validated config has a non-empty collection, a positive timeout and an
//!   `http`/`https` base URL.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_COLLECTION: &str = "notes";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const ENV_API_URL: &str = "QUICKNOTE_API_URL";
pub const ENV_COLLECTION: &str = "QUICKNOTE_COLLECTION";
pub const ENV_TIMEOUT_SECS: &str = "QUICKNOTE_TIMEOUT_SECS";
pub const ENV_DATA_DIR: &str = "QUICKNOTE_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "QUICKNOTE_LOG_LEVEL";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Invalid { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
            Self::Invalid { field, reason } => write!(f, "invalid `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid { .. } => None,
        }
    }
}

/// Settings for talking to the backend and for local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Store collection that holds the notes.
    pub collection: String,
    pub request_timeout_secs: u64,
    /// Directory for credentials, logs and the local database.
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            data_dir: None,
            log_level: default_log_level().to_string(),
        }
    }
}

impl ClientConfig {
    /// Reads a JSON config file; absent keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `QUICKNOTE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Blank values are ignored so an exported-but-empty variable does not
    /// wipe a file setting.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read(ENV_API_URL) {
            self.api_base_url = value.trim().to_string();
        }
        if let Some(value) = read(ENV_COLLECTION) {
            self.collection = value.trim().to_string();
        }
        if let Some(value) = read(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs =
                value
                    .trim()
                    .parse()
                    .map_err(|err| ConfigError::Invalid {
                        field: "request_timeout_secs",
                        reason: format!("`{value}` is not a number: {err}"),
                    })?;
        }
        if let Some(value) = read(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(value.trim()));
        }
        if let Some(value) = read(ENV_LOG_LEVEL) {
            self.log_level = value.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "api_base_url",
                reason: format!("`{url}` must start with http:// or https://"),
            });
        }
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "collection",
                reason: "cannot be empty".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, ConfigError, ENV_COLLECTION, ENV_TIMEOUT_SECS};
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.collection, "notes");
    }

    #[test]
    fn json_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quicknote.json");
        std::fs::write(&path, r#"{"api_base_url": "https://notes.example.com"}"#).unwrap();

        let config = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(config.api_base_url, "https://notes.example.com");
        assert_eq!(config.request_timeout_secs, 15);
    }

    #[test]
    fn overrides_replace_values_and_skip_blanks() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(ENV_COLLECTION, "journal"), (ENV_TIMEOUT_SECS, "  ")]);
        let mut config = ClientConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.collection, "journal");
        assert_eq!(config.request_timeout_secs, 15);
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        let mut config = ClientConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "request_timeout_secs",
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_bad_scheme_and_zero_timeout() {
        let mut config = ClientConfig {
            api_base_url: "ftp://example.com".to_string(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        config.api_base_url = "https://example.com".to_string();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
