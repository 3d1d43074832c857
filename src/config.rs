//! Application-level configuration loading: token catalog, timings and storage backend choice.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::board::{CatalogError, TokenCatalog};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "FLAG_DUEL_BACK_CONFIG_PATH";
/// Environment variable selecting the storage backend.
const STORE_BACKEND_ENV: &str = "STORE_BACKEND";

const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(1_000);
const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RESOLVE_ATTEMPTS: u32 = 3;
const DEFAULT_FEED_CAPACITY: usize = 32;

/// Reasons a configuration file cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file is not valid JSON for [`RawConfig`].
    #[error("invalid configuration JSON")]
    Parse(#[from] serde_json::Error),
    /// The token catalog does not describe a valid board.
    #[error("invalid token catalog")]
    Catalog(#[from] CatalogError),
    /// A numeric setting is out of range.
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    catalog: TokenCatalog,
    reveal_delay: Duration,
    transition_timeout: Option<Duration>,
    resolve_attempts: u32,
    feed_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        pairs = app_config.catalog.pairs().len(),
                        reveal_delay_ms = app_config.reveal_delay.as_millis() as u64,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse the JSON configuration format.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        raw.try_into()
    }

    /// Tokens boards are generated from.
    pub fn catalog(&self) -> &TokenCatalog {
        &self.catalog
    }

    /// Pause between the second flip and the resolution of the pair.
    pub fn reveal_delay(&self) -> Duration {
        self.reveal_delay
    }

    /// Upper bound on a store write; `None` waits forever.
    pub fn transition_timeout(&self) -> Option<Duration> {
        self.transition_timeout
    }

    /// Number of times a failed resolution is attempted before giving up.
    pub fn resolve_attempts(&self) -> u32 {
        self.resolve_attempts
    }

    /// Buffered patches per session feed.
    pub fn feed_capacity(&self) -> usize {
        self.feed_capacity
    }

    /// Copy of this configuration with a different reveal delay.
    pub fn with_reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: TokenCatalog::default(),
            reveal_delay: DEFAULT_REVEAL_DELAY,
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
            resolve_attempts: DEFAULT_RESOLVE_ATTEMPTS,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    tokens: Option<RawTokens>,
    reveal_delay_ms: Option<u64>,
    /// `0` disables the timeout.
    transition_timeout_ms: Option<u64>,
    resolve_attempts: Option<u32>,
    feed_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawTokens {
    pairs: Vec<String>,
    singleton: String,
    neutral: String,
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(value: RawConfig) -> Result<Self, Self::Error> {
        let defaults = Self::default();

        let catalog = match value.tokens {
            Some(tokens) => TokenCatalog::new(tokens.pairs, tokens.singleton, tokens.neutral)?,
            None => defaults.catalog,
        };

        let transition_timeout = match value.transition_timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.transition_timeout,
        };

        let resolve_attempts = value.resolve_attempts.unwrap_or(defaults.resolve_attempts);
        if resolve_attempts == 0 {
            return Err(ConfigError::Zero("resolve_attempts"));
        }

        let feed_capacity = value.feed_capacity.unwrap_or(defaults.feed_capacity);
        if feed_capacity == 0 {
            return Err(ConfigError::Zero("feed_capacity"));
        }

        Ok(Self {
            catalog,
            reveal_delay: value
                .reveal_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reveal_delay),
            transition_timeout,
            resolve_attempts,
            feed_capacity,
        })
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Persistence backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store, lost on restart.
    Memory,
    /// MongoDB, configured through `MONGO_URI` and `MONGO_DB`.
    Mongo,
    /// CouchDB, configured through the `COUCH_*` variables.
    Couch,
}

impl StoreBackend {
    /// Read [`STORE_BACKEND_ENV`], defaulting to [`StoreBackend::Memory`].
    pub fn from_env() -> Self {
        match env::var(STORE_BACKEND_ENV) {
            Ok(value) => Self::parse(&value).unwrap_or_else(|| {
                warn!(value = %value, "unknown storage backend; using in-memory store");
                StoreBackend::Memory
            }),
            Err(_) => StoreBackend::Memory,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Some(StoreBackend::Memory),
            "mongo" | "mongodb" => Some(StoreBackend::Mongo),
            "couch" | "couchdb" => Some(StoreBackend::Couch),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = AppConfig::parse("{}").unwrap();
        assert_eq!(config.catalog(), &TokenCatalog::default());
        assert_eq!(config.reveal_delay(), DEFAULT_REVEAL_DELAY);
        assert_eq!(config.transition_timeout(), Some(DEFAULT_TRANSITION_TIMEOUT));
        assert_eq!(config.resolve_attempts(), DEFAULT_RESOLVE_ATTEMPTS);
    }

    #[test]
    fn timings_are_read_in_milliseconds() {
        let config = AppConfig::parse(
            r#"{"reveal_delay_ms": 250, "transition_timeout_ms": 0, "resolve_attempts": 5}"#,
        )
        .unwrap();
        assert_eq!(config.reveal_delay(), Duration::from_millis(250));
        assert_eq!(config.transition_timeout(), None);
        assert_eq!(config.resolve_attempts(), 5);
    }

    #[test]
    fn custom_catalog_is_validated() {
        let err = AppConfig::parse(
            r#"{"tokens": {"pairs": ["a", "b"], "singleton": "c", "neutral": "d"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Catalog(CatalogError::PairCount { .. })));

        let pairs: Vec<String> = (0..17).map(|i| format!("t{i}")).collect();
        let json = serde_json::json!({
            "tokens": { "pairs": pairs, "singleton": "odd", "neutral": "blank" }
        });
        let config = AppConfig::parse(&json.to_string()).unwrap();
        assert_eq!(config.catalog().singleton(), "odd");
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let err = AppConfig::parse(r#"{"resolve_attempts": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Zero("resolve_attempts")));
    }

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!(StoreBackend::parse("Mongo"), Some(StoreBackend::Mongo));
        assert_eq!(StoreBackend::parse("couchdb"), Some(StoreBackend::Couch));
        assert_eq!(StoreBackend::parse(" memory "), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("redis"), None);
    }
}
