//! Retry policy configuration loading
//!
//! [`RetrySettings`] is the serializable form of a [`RetryPolicy`]. Settings
//! come from a TOML or JSON file, or from environment variables, and are
//! turned into a validated policy with [`RetrySettings::into_policy`].
//!
//! ## File format
//!
//! ```toml
//! max_attempts = 3          # or "unbounded"
//! backoff = "exponential"   # fixed | linear | exponential | custom
//! base_amount_ms = 10
//! custom_schedule_ms = []   # one entry per attempt, custom backoff only
//! ```
//!
//! ## Environment Variables
//! - `RETRYLOOP_MAX_ATTEMPTS`: Attempt budget, an integer or `unbounded`
//! - `RETRYLOOP_BACKOFF`: Backoff kind
//! - `RETRYLOOP_BASE_AMOUNT_MS`: Base amount in milliseconds
//! - `RETRYLOOP_CUSTOM_SCHEDULE_MS`: Comma-separated delays in milliseconds
//!
//! Unset variables keep their default value.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::{Backoff, DEFAULT_BASE_AMOUNT};
use crate::error::ConfigError;
use crate::policy::{MaxAttempts, RetryPolicy};

const ENV_MAX_ATTEMPTS: &str = "RETRYLOOP_MAX_ATTEMPTS";
const ENV_BACKOFF: &str = "RETRYLOOP_BACKOFF";
const ENV_BASE_AMOUNT_MS: &str = "RETRYLOOP_BASE_AMOUNT_MS";
const ENV_CUSTOM_SCHEDULE_MS: &str = "RETRYLOOP_CUSTOM_SCHEDULE_MS";

const UNBOUNDED: &str = "unbounded";

/// Backoff strategy name as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Linear,
    Exponential,
    Custom,
}

impl FromStr for BackoffKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            "custom" => Ok(Self::Custom),
            other => Err(ConfigError::invalid(format!("unknown backoff kind '{other}'"))),
        }
    }
}

impl fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Serializable retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempt budget, an integer or `"unbounded"`
    #[serde(with = "max_attempts_repr")]
    pub max_attempts: MaxAttempts,
    pub backoff: BackoffKind,
    /// Base amount for fixed, linear and exponential backoff
    #[serde(rename = "base_amount_ms", with = "duration_millis")]
    pub base_amount: Duration,
    /// Delays for custom backoff, one per attempt
    pub custom_schedule_ms: Vec<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: MaxAttempts::default(),
            backoff: BackoffKind::default(),
            base_amount: DEFAULT_BASE_AMOUNT,
            custom_schedule_ms: Vec::new(),
        }
    }
}

impl RetrySettings {
    /// Build and validate the policy these settings describe
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] raised by policy validation.
    pub fn into_policy(self) -> Result<RetryPolicy, ConfigError> {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(self.base_amount),
            BackoffKind::Linear => Backoff::Linear(self.base_amount),
            BackoffKind::Exponential => Backoff::Exponential(self.base_amount),
            BackoffKind::Custom => Backoff::Custom(
                self.custom_schedule_ms.into_iter().map(Duration::from_millis).collect(),
            ),
        };

        RetryPolicy::builder().attempts(self.max_attempts).backoff(backoff).build()
    }
}

impl From<&RetryPolicy> for RetrySettings {
    fn from(policy: &RetryPolicy) -> Self {
        let (backoff, base_amount, custom_schedule_ms) = match policy.backoff() {
            Backoff::Fixed(base) => (BackoffKind::Fixed, *base, Vec::new()),
            Backoff::Linear(base) => (BackoffKind::Linear, *base, Vec::new()),
            Backoff::Exponential(base) => (BackoffKind::Exponential, *base, Vec::new()),
            Backoff::Custom(schedule) => (
                BackoffKind::Custom,
                DEFAULT_BASE_AMOUNT,
                schedule.iter().map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)).collect(),
            ),
        };

        Self { max_attempts: policy.max_attempts(), backoff, base_amount, custom_schedule_ms }
    }
}

/// Load settings from a TOML or JSON file
///
/// Format is detected by file extension; a file without one is read as JSON.
///
/// # Errors
/// Returns `ConfigError::Io` if the file cannot be read, `Parse` if its
/// contents are malformed and `UnsupportedFormat` for other extensions.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<RetrySettings, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading retry settings from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    parse_settings(&contents, extension)
}

/// Parse settings from `toml` or `json` content
///
/// # Errors
/// Returns `ConfigError::Parse` for malformed content and
/// `ConfigError::UnsupportedFormat` for any other format name.
pub fn parse_settings(contents: &str, format: &str) -> Result<RetrySettings, ConfigError> {
    match format {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConfigError::Parse { format: "TOML", message: e.to_string() }),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Parse { format: "JSON", message: e.to_string() }),
        other => Err(ConfigError::UnsupportedFormat { extension: other.to_string() }),
    }
}

/// Load settings from `RETRYLOOP_*` environment variables
///
/// # Errors
/// Returns `ConfigError::Env` naming the first variable with an invalid
/// value.
pub fn load_from_env() -> Result<RetrySettings, ConfigError> {
    settings_from_lookup(|key| std::env::var(key).ok())
}

/// Build settings from a variable lookup, starting from the defaults
fn settings_from_lookup<F>(lookup: F) -> Result<RetrySettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = RetrySettings::default();

    if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
        settings.max_attempts = parse_max_attempts(&value).map_err(|message| {
            ConfigError::Env { var: ENV_MAX_ATTEMPTS, message }
        })?;
    }

    if let Some(value) = lookup(ENV_BACKOFF) {
        settings.backoff = value
            .parse()
            .map_err(|e: ConfigError| ConfigError::Env { var: ENV_BACKOFF, message: e.to_string() })?;
    }

    if let Some(value) = lookup(ENV_BASE_AMOUNT_MS) {
        let millis = value.trim().parse::<u64>().map_err(|e| ConfigError::Env {
            var: ENV_BASE_AMOUNT_MS,
            message: format!("invalid milliseconds '{value}': {e}"),
        })?;
        settings.base_amount = Duration::from_millis(millis);
    }

    if let Some(value) = lookup(ENV_CUSTOM_SCHEDULE_MS) {
        settings.custom_schedule_ms = value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry.parse::<u64>().map_err(|e| ConfigError::Env {
                    var: ENV_CUSTOM_SCHEDULE_MS,
                    message: format!("invalid milliseconds '{entry}': {e}"),
                })
            })
            .collect::<Result<_, _>>()?;
    }

    Ok(settings)
}

fn parse_max_attempts(value: &str) -> Result<MaxAttempts, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case(UNBOUNDED) {
        return Ok(MaxAttempts::Unbounded);
    }
    value
        .parse::<u32>()
        .map(MaxAttempts::Limited)
        .map_err(|e| format!("expected an integer or '{UNBOUNDED}', got '{value}': {e}"))
}

/// `MaxAttempts` as an integer or the `"unbounded"` keyword
mod max_attempts_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{parse_max_attempts, MaxAttempts, UNBOUNDED};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Count(u32),
        Keyword(String),
    }

    pub fn serialize<S>(value: &MaxAttempts, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            MaxAttempts::Limited(max) => serializer.serialize_u32(*max),
            MaxAttempts::Unbounded => serializer.serialize_str(UNBOUNDED),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<MaxAttempts, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Count(max) => Ok(MaxAttempts::Limited(max)),
            Repr::Keyword(keyword) => parse_max_attempts(&keyword).map_err(D::Error::custom),
        }
    }
}

/// Serialize a `Duration` as milliseconds (u64)
mod duration_millis {
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
