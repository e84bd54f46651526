//! Client configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial (or
//! missing) file yields a usable configuration.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DATABASE_FILE: &str = "cloudnote.sqlite3";

/// Errors raised while loading or saving configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "config io error at `{}`: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "config parse error at `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Timing knobs for remote synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a title edit is persisted.
    pub title_debounce_ms: u64,
    /// Quiet period before a content edit is persisted.
    pub content_debounce_ms: u64,
    /// Upper bound for one gateway request.
    pub request_timeout_ms: u64,
    /// Total attempts per remote write, including the first one.
    pub max_attempts: u32,
    /// First retry delay; doubles on each further attempt.
    pub retry_base_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            title_debounce_ms: 500,
            content_debounce_ms: 1000,
            request_timeout_ms: 10_000,
            max_attempts: 3,
            retry_base_delay_ms: 200,
        }
    }
}

impl SyncConfig {
    pub fn title_debounce(&self) -> Duration {
        Duration::from_millis(self.title_debounce_ms)
    }

    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// SQLite file used by the local gateway.
    pub database_path: PathBuf,
    /// `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling logs; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            log_level: default_log_level().to_string(),
            log_dir: None,
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Writes configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| ConfigError::Invalid(format!("cannot serialize config: {err}")))?;
        fs::write(path, json).map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, ConfigError, SyncConfig};
    use std::time::Duration;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "sync": { "title_debounce_ms": 250 } }"#).unwrap();
        assert_eq!(config.sync.title_debounce(), Duration::from_millis(250));
        assert_eq!(config.sync.content_debounce(), Duration::from_millis(1000));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn retry_delay_doubles() {
        let sync = SyncConfig::default();
        assert_eq!(sync.retry_delay(1), Duration::from_millis(200));
        assert_eq!(sync.retry_delay(2), Duration::from_millis(400));
        assert_eq!(sync.retry_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let sync = SyncConfig {
            max_attempts: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(sync.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = ClientConfig::default();
        config.log_level = "warn".to_string();
        config.sync.max_attempts = 5;
        config.save(&path).unwrap();

        assert_eq!(ClientConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ClientConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, ClientConfig::default());
    }
}
