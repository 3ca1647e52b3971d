//! Configuration loading
//!
//! [`SafeCallConfig`] holds the settings a [`SafeCall`](crate::SafeCall) can
//! be created from: retry defaults and error ignore patterns.
//!
//! ## Loading Strategy
//! 1. Environment variables, when at least one of them is set
//! 2. The first config file found by [`probe_config_paths`]
//! 3. Built-in defaults
//!
//! ## Environment Variables
//! - `SAFECALL_RETRY_ATTEMPTS`: total attempts per retried call
//! - `SAFECALL_RETRY_DELAY_MS`: delay before the second attempt
//! - `SAFECALL_RETRY_BACKOFF`: delay multiplier
//! - `SAFECALL_IGNORE_PATTERNS`: comma-separated ignore patterns
//!
//! ## File Format
//! `.toml` and `.json` are supported, detected by extension. Durations are
//! milliseconds:
//!
//! ```toml
//! ignore_patterns = ["^ECONNRESET", "broken pipe"]
//!
//! [retry]
//! attempts = 5
//! initial_delay_ms = 250
//! backoff_multiplier = 1.5
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::resilience::RetryConfig;

pub const ENV_RETRY_ATTEMPTS: &str = "SAFECALL_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY_MS: &str = "SAFECALL_RETRY_DELAY_MS";
pub const ENV_RETRY_BACKOFF: &str = "SAFECALL_RETRY_BACKOFF";
pub const ENV_IGNORE_PATTERNS: &str = "SAFECALL_IGNORE_PATTERNS";

const CONFIG_FILE_NAMES: [&str; 2] = ["safecall.toml", "safecall.json"];

/// Serialize a Duration as milliseconds (u64)
pub mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Settings a `SafeCall` can be built from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeCallConfig {
    pub retry: RetryConfig,
    /// Regular expressions; matching failures are kept out of logs and handlers
    pub ignore_patterns: Vec<String>,
}

impl SafeCallConfig {
    /// Validate retry defaults and compile every pattern
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()?;
        for pattern in &self.ignore_patterns {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Build a configuration from variables returned by `lookup`.
    ///
    /// Returns `Ok(None)` when none of the `SAFECALL_*` variables is set.
    /// Unset variables keep their defaults.
    pub fn from_env_vars<L>(lookup: L) -> ConfigResult<Option<Self>>
    where
        L: Fn(&str) -> Option<String>,
    {
        let attempts = lookup(ENV_RETRY_ATTEMPTS);
        let delay_ms = lookup(ENV_RETRY_DELAY_MS);
        let backoff = lookup(ENV_RETRY_BACKOFF);
        let patterns = lookup(ENV_IGNORE_PATTERNS);

        if attempts.is_none() && delay_ms.is_none() && backoff.is_none() && patterns.is_none() {
            return Ok(None);
        }

        let mut config = Self::default();
        if let Some(value) = attempts {
            config.retry.attempts = parse_var(ENV_RETRY_ATTEMPTS, &value)?;
        }
        if let Some(value) = delay_ms {
            config.retry.initial_delay =
                std::time::Duration::from_millis(parse_var(ENV_RETRY_DELAY_MS, &value)?);
        }
        if let Some(value) = backoff {
            config.retry.backoff_multiplier = parse_var(ENV_RETRY_BACKOFF, &value)?;
        }
        if let Some(value) = patterns {
            config.ignore_patterns = value
                .split(',')
                .map(str::trim)
                .filter(|pattern| !pattern.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.validate()?;
        Ok(Some(config))
    }
}

fn parse_var<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(format!("{name}={value:?}: {e}")))
}

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns a `ConfigError` when a source exists but is invalid. Missing
/// sources fall through to the next one.
pub fn load() -> ConfigResult<SafeCallConfig> {
    if let Some(config) = load_from_env()? {
        info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    match probe_config_paths() {
        Some(path) => load_from_file(&path),
        None => {
            debug!("No configuration source found, using defaults");
            Ok(SafeCallConfig::default())
        }
    }
}

/// Load configuration from the process environment
pub fn load_from_env() -> ConfigResult<Option<SafeCallConfig>> {
    SafeCallConfig::from_env_vars(|name| std::env::var(name).ok())
}

/// Load configuration from a `.toml` or `.json` file
///
/// # Errors
/// Returns `ConfigError::NotFound` when the file does not exist and
/// `ConfigError::Parse` when it cannot be read or parsed.
pub fn load_from_file(path: &Path) -> ConfigResult<SafeCallConfig> {
    if !path.exists() {
        return Err(ConfigError::NotFound { path: path.display().to_string() });
    }

    info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        format: "file".to_string(),
        message: format!("failed to read {}: {e}", path.display()),
    })?;

    let config = parse_config(&contents, path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration, detecting the format from the file extension
pub fn parse_config(contents: &str, path: &Path) -> ConfigResult<SafeCallConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConfigError::Parse { format: "TOML".to_string(), message: e.to_string() }),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Parse { format: "JSON".to_string(), message: e.to_string() }),
        other => Err(ConfigError::Parse {
            format: other.to_string(),
            message: "unsupported config format".to_string(),
        }),
    }
}

/// First existing config file in the working directory
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    probe_in(&cwd)
}

/// First existing config file in `dir`
pub fn probe_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES.iter().map(|name| dir.join(name)).find(|candidate| candidate.is_file())
}
