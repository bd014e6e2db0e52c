//! Error taxonomy for the retry engine
//!
//! Every failure the engine reports is a [`RetryError`]: the native cause of
//! the failed attempt plus the attempt bookkeeping at the moment the error
//! was built. The [`RetryReason`] tag tells a per-attempt notification apart
//! from the three terminal outcomes that end a run.
//!
//! Configuration mistakes are a separate type, [`ConfigError`], reported when
//! a policy is built or loaded, never while a run is in progress.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error used as the currency for operation failures
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Reason string for a single failed attempt
pub const RETRY_FAILED_REASON: &str = "Retry failed";

/// Reason string for an exhausted attempt budget
pub const ALL_RETRIES_FAILED_REASON: &str = "All retries failed";

/// Reason string for a stop predicate veto
pub const EXIT_CONDITION_MET_REASON: &str = "Exit condition met";

/// Reason string for a manual stop
pub const MANUALLY_STOPPED_REASON: &str = "Retry process manually stopped";

/// Why a [`RetryError`] was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryReason {
    /// A single attempt failed and the run continues
    AttemptFailed,
    /// The attempt budget was consumed
    AllAttemptsExhausted,
    /// The stop predicate rejected the attempt's error
    ExitConditionMet,
    /// `stop()` interrupted the run
    ManuallyStopped,
}

impl RetryReason {
    /// The reason string attached to errors with this tag
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttemptFailed => RETRY_FAILED_REASON,
            Self::AllAttemptsExhausted => ALL_RETRIES_FAILED_REASON,
            Self::ExitConditionMet => EXIT_CONDITION_MET_REASON,
            Self::ManuallyStopped => MANUALLY_STOPPED_REASON,
        }
    }

    /// Whether this reason ends a run
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::AttemptFailed)
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The failure produced by the retried operation
///
/// Shared behind an `Arc` so a [`RetryError`] can be cloned into callbacks
/// without requiring the operation's error type to be `Clone`.
#[derive(Clone)]
pub struct NativeError(Arc<dyn StdError + Send + Sync>);

impl NativeError {
    /// Wrap an operation failure
    ///
    /// Anything convertible into a [`BoxError`] is accepted, so plain
    /// `String`/`&str` failures become structured errors here.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self(Arc::from(error.into()))
    }

    /// Attempt to view the cause as a concrete error type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Borrow the underlying error
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for NativeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Error reported by the retry engine
///
/// Immutable once constructed. `attempts_remaining` is `None` when the
/// attempt budget is unbounded.
#[derive(Debug, Clone, Error)]
#[error("{reason} after {attempts_made} attempts: {cause}")]
pub struct RetryError {
    #[source]
    cause: NativeError,
    reason: RetryReason,
    attempts_made: u32,
    attempts_remaining: Option<u32>,
}

impl RetryError {
    /// Build an error with an explicit reason
    pub fn new(
        cause: NativeError,
        reason: RetryReason,
        attempts_made: u32,
        attempts_remaining: Option<u32>,
    ) -> Self {
        Self { cause, reason, attempts_made, attempts_remaining }
    }

    /// Per-attempt notification, handed to the stop predicate and to the
    /// attempt-failure callback
    pub fn attempt_failed(
        cause: NativeError,
        attempts_made: u32,
        attempts_remaining: Option<u32>,
    ) -> Self {
        Self::new(cause, RetryReason::AttemptFailed, attempts_made, attempts_remaining)
    }

    /// Terminal error for an exhausted budget
    pub fn all_attempts_exhausted(
        cause: NativeError,
        attempts_made: u32,
        attempts_remaining: Option<u32>,
    ) -> Self {
        Self::new(cause, RetryReason::AllAttemptsExhausted, attempts_made, attempts_remaining)
    }

    /// Terminal error for a stop predicate veto
    pub fn exit_condition_met(
        cause: NativeError,
        attempts_made: u32,
        attempts_remaining: Option<u32>,
    ) -> Self {
        Self::new(cause, RetryReason::ExitConditionMet, attempts_made, attempts_remaining)
    }

    /// Terminal error for a manual stop
    pub fn manually_stopped(
        cause: NativeError,
        attempts_made: u32,
        attempts_remaining: Option<u32>,
    ) -> Self {
        Self::new(cause, RetryReason::ManuallyStopped, attempts_made, attempts_remaining)
    }

    /// The failure returned by the operation
    pub fn cause(&self) -> &NativeError {
        &self.cause
    }

    /// Why this error was produced
    pub fn reason(&self) -> RetryReason {
        self.reason
    }

    /// Attempts counted when the error was built
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Attempts left when the error was built, `None` if unbounded
    pub fn attempts_remaining(&self) -> Option<u32> {
        self.attempts_remaining
    }

    /// Whether this error ended the run
    pub fn is_terminal(&self) -> bool {
        self.reason.is_terminal()
    }

    /// Check if the attempt budget was exhausted
    pub fn is_all_attempts_exhausted(&self) -> bool {
        self.reason == RetryReason::AllAttemptsExhausted
    }

    /// Check if the stop predicate ended the run
    pub fn is_exit_condition_met(&self) -> bool {
        self.reason == RetryReason::ExitConditionMet
    }

    /// Check if the run was stopped manually
    pub fn is_manually_stopped(&self) -> bool {
        self.reason == RetryReason::ManuallyStopped
    }
}

/// Errors raised while building or loading a retry policy
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A finite attempt budget must allow at least one attempt
    #[error("max_attempts must be greater than 0")]
    ZeroAttempts,

    /// Fixed, linear and exponential backoff need a positive base amount
    #[error("backoff base amount must be greater than 0")]
    ZeroBaseAmount,

    /// Exponential backoff raises whole milliseconds, so the base needs one
    #[error("exponential backoff base must be at least 1ms, got {base:?}")]
    SubMillisecondExponentialBase { base: std::time::Duration },

    /// A custom schedule cannot back an unbounded attempt budget
    #[error("custom backoff schedule requires a finite max_attempts")]
    ScheduleRequiresFiniteAttempts,

    /// The custom schedule must hold exactly one delay per attempt
    #[error("custom backoff schedule has {actual} entries, expected {expected}")]
    ScheduleLengthMismatch { expected: u32, actual: usize },

    /// A configuration value could not be interpreted
    #[error("Invalid retry configuration: {message}")]
    Invalid { message: String },

    /// A configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be parsed
    #[error("Invalid {format} format: {message}")]
    Parse { format: &'static str, message: String },

    /// A configuration file extension is neither `toml` nor `json`
    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },

    /// An environment variable holds a value that cannot be interpreted
    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}
