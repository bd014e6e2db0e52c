//! Retry engine for fallible async operations.
//!
//! A [`RetryHandler`] re-invokes an operation until it succeeds, its
//! [`RetryPolicy`] budget is spent, a [`RetryCondition`] vetoes another
//! attempt, or the caller stops it. Between attempts the handler waits
//! according to a [`Backoff`] strategy; the wait can be paused, resumed
//! and cancelled from any task.
//!
//! Outcomes are delivered through callbacks: `on_success` with the value,
//! `on_attempt_failed` after each counted failure, and `on_process_failed`
//! with exactly one terminal [`RetryError`].
//!
//! # Features
//!
//! - `config` (default): [`RetrySettings`] and loaders for TOML/JSON files
//!   and `RETRYLOOP_*` environment variables

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod policy;
pub mod session;
pub mod wait;

#[cfg(feature = "config")]
pub mod config;

pub use backoff::{Backoff, DEFAULT_BASE_AMOUNT};
#[cfg(feature = "config")]
pub use config::{load_from_env, load_from_file, parse_settings, BackoffKind, RetrySettings};
pub use error::{BoxError, ConfigError, NativeError, RetryError, RetryReason};
pub use handler::{RetryHandler, RetryHandlerBuilder};
pub use hooks::{AlwaysRetry, NeverRetry, RetryCondition};
pub use policy::{MaxAttempts, RetryPolicy, RetryPolicyBuilder, DEFAULT_MAX_ATTEMPTS};
pub use session::SessionStatus;
pub use wait::{CancellableWait, WaitHandle, WaitOutcome};
