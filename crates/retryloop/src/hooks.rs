//! Stop predicate and lifecycle callbacks
//!
//! The execution loop consults a [`RetryCondition`] after every failed
//! attempt and reports progress through the callbacks held in [`Hooks`].
//! Callbacks run on the loop's task, one at a time, in attempt order.

use std::fmt;

use crate::error::RetryError;

/// Trait for deciding whether the run continues after a failed attempt
///
/// Returning `false` ends the run with an exit-condition error.
pub trait RetryCondition: Send + Sync {
    /// Inspect the attempt's error and decide whether to keep retrying
    fn should_retry(&self, error: &RetryError) -> bool;
}

impl<F> RetryCondition for F
where
    F: Fn(&RetryError) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &RetryError) -> bool {
        self(error)
    }
}

/// Always retry condition, the default
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryCondition for AlwaysRetry {
    fn should_retry(&self, _error: &RetryError) -> bool {
        true
    }
}

/// Never retry condition - the first failure ends the run
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryCondition for NeverRetry {
    fn should_retry(&self, _error: &RetryError) -> bool {
        false
    }
}

type SuccessFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type AttemptFailedFn = Box<dyn Fn(&RetryError, u32) + Send + Sync>;
type ProcessFailedFn = Box<dyn Fn(&RetryError) + Send + Sync>;

/// Callbacks and stop predicate for one handler
pub(crate) struct Hooks<T> {
    pub(crate) on_success: Option<SuccessFn<T>>,
    pub(crate) on_attempt_failed: Option<AttemptFailedFn>,
    pub(crate) on_process_failed: Option<ProcessFailedFn>,
    pub(crate) condition: Box<dyn RetryCondition>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_attempt_failed: None,
            on_process_failed: None,
            condition: Box::new(AlwaysRetry),
        }
    }
}

impl<T> Hooks<T> {
    pub(crate) fn success(&self, value: &T) {
        if let Some(on_success) = &self.on_success {
            on_success(value);
        }
    }

    pub(crate) fn attempt_failed(&self, error: &RetryError, attempts_made: u32) {
        if let Some(on_attempt_failed) = &self.on_attempt_failed {
            on_attempt_failed(error, attempts_made);
        }
    }

    pub(crate) fn process_failed(&self, error: &RetryError) {
        if let Some(on_process_failed) = &self.on_process_failed {
            on_process_failed(error);
        }
    }

    pub(crate) fn should_retry(&self, error: &RetryError) -> bool {
        self.condition.should_retry(error)
    }
}

impl<T> fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_success", &self.on_success.is_some())
            .field("on_attempt_failed", &self.on_attempt_failed.is_some())
            .field("on_process_failed", &self.on_process_failed.is_some())
            .finish_non_exhaustive()
    }
}
