//! Configuration management for Missive
//!
//! This module provides file- and environment-based configuration with
//! defaults and validation.

use crate::core_deletion::HardDeletePolicy;
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Message lifecycle policy
    pub engine: EngineConfig,

    /// Identity key registry
    pub keys: KeyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Message lifecycle policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long after creation the sender may edit; `None` disables the limit
    #[serde(with = "window")]
    pub edit_window: Option<Duration>,

    /// How long after creation the sender may delete for everyone.
    /// Moderators are not bound by it.
    #[serde(with = "window")]
    pub hard_delete_window: Option<Duration>,

    /// Maximum content length in characters
    pub max_content_length: usize,

    /// Maximum emoji length in bytes
    pub max_emoji_length: usize,

    /// Behaviour of a second hard delete
    pub hard_delete_policy: HardDeletePolicy,

    /// Lost compare-and-swap rounds tolerated per operation
    pub cas_retry_limit: usize,
}

/// Identity key registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Expected public key length in bytes
    pub public_key_length: usize,

    /// Historical key versions kept per identity; `None` keeps all
    pub max_retained_versions: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            edit_window: Some(Duration::from_secs(5 * 60)),
            hard_delete_window: Some(Duration::from_secs(24 * 60 * 60)),
            max_content_length: 10_000,
            max_emoji_length: 32,
            hard_delete_policy: HardDeletePolicy::Strict,
            cas_retry_limit: 64,
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            public_key_length: 32,
            max_retained_versions: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Optional windows as humantime strings, with `"off"` for no window.
///
/// A plain `Option` would vanish from the TOML output and read back as the
/// default window.
mod window {
    use humantime_serde::re::humantime::{format_duration, parse_duration};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn parse(raw: &str) -> Result<Option<Duration>, String> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("off") || raw.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        parse_duration(raw).map(Some).map_err(|e| e.to_string())
    }

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.collect_str(&format_duration(*duration)),
            None => serializer.serialize_str("off"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::Env {
            var: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

fn parse_window(name: &str) -> Result<Option<Option<Duration>>, ConfigError> {
    match env::var(name) {
        Ok(raw) => window::parse(&raw).map(Some).map_err(|reason| ConfigError::Env {
            var: name.to_string(),
            value: raw.clone(),
            reason,
        }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: MISSIVE_<SECTION>_<KEY>
    /// Example: MISSIVE_ENGINE_EDIT_WINDOW=15m
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Engine config
        if let Some(window) = parse_window("MISSIVE_ENGINE_EDIT_WINDOW")? {
            config.engine.edit_window = window;
        }
        if let Some(window) = parse_window("MISSIVE_ENGINE_HARD_DELETE_WINDOW")? {
            config.engine.hard_delete_window = window;
        }
        if let Some(len) = parse_var("MISSIVE_ENGINE_MAX_CONTENT_LENGTH")? {
            config.engine.max_content_length = len;
        }
        if let Some(len) = parse_var("MISSIVE_ENGINE_MAX_EMOJI_LENGTH")? {
            config.engine.max_emoji_length = len;
        }
        if let Some(policy) = parse_var("MISSIVE_ENGINE_HARD_DELETE_POLICY")? {
            config.engine.hard_delete_policy = policy;
        }
        if let Some(limit) = parse_var("MISSIVE_ENGINE_CAS_RETRY_LIMIT")? {
            config.engine.cas_retry_limit = limit;
        }

        // Key config
        if let Some(len) = parse_var("MISSIVE_KEYS_PUBLIC_KEY_LENGTH")? {
            config.keys.public_key_length = len;
        }
        if let Some(max) = parse_var::<usize>("MISSIVE_KEYS_MAX_RETAINED_VERSIONS")? {
            config.keys.max_retained_versions = Some(max);
        }

        // Logging config
        if let Ok(level) = env::var("MISSIVE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = parse_var("MISSIVE_LOG_JSON")? {
            config.logging.json_format = json;
        }

        // Metrics config
        if let Some(enabled) = parse_var("MISSIVE_METRICS_ENABLED")? {
            config.metrics.enabled = enabled;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("engine.max_content_length", self.engine.max_content_length),
            ("engine.max_emoji_length", self.engine.max_emoji_length),
            ("engine.cas_retry_limit", self.engine.cas_retry_limit),
            ("keys.public_key_length", self.keys.public_key_length),
        ];
        if let Some(&(field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::invalid(field, "must be greater than 0"));
        }

        if self.keys.max_retained_versions == Some(0) {
            return Err(ConfigError::invalid(
                "keys.max_retained_versions",
                "must keep at least the current key",
            ));
        }

        self.logging
            .level
            .parse::<LogLevel>()
            .map_err(|e| ConfigError::invalid("logging.level", e.to_string()))?;

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
