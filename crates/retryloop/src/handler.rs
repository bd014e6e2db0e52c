//! Retry handler and execution loop
//!
//! A [`RetryHandler`] owns one fallible async operation together with its
//! [`RetryPolicy`] and callbacks. `start` spawns the execution loop on the
//! current tokio runtime; the control methods flip the shared session state
//! and interrupt whatever the loop is waiting on.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use retryloop::{RetryHandler, RetryPolicy};
//!
//! # async fn example() -> Result<(), retryloop::ConfigError> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .exponential_backoff(Duration::from_millis(10))
//!     .build()?;
//!
//! let handler = RetryHandler::builder(|| async { Err::<u32, _>("service unavailable") })
//!     .policy(policy)
//!     .on_attempt_failed(|err, made| eprintln!("attempt {made} failed: {err}"))
//!     .on_process_failed(|err| eprintln!("giving up: {err}"))
//!     .build();
//!
//! handler.start();
//! handler.stopped().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{BoxError, NativeError, RetryError};
use crate::hooks::{Hooks, RetryCondition};
use crate::policy::RetryPolicy;
use crate::session::{NextStep, RetrySession, SessionStatus, SharedSession};
use crate::wait::CancellableWait;

type Operation<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

/// State shared by every clone of a handler and its running loop
struct Inner<T> {
    operation: Operation<T>,
    policy: RetryPolicy,
    hooks: Hooks<T>,
    session: SharedSession,
}

/// Marks the session stopped when a run ends, even by unwinding
struct FinishGuard<'a> {
    session: &'a SharedSession,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.session.update(RetrySession::finish);
    }
}

/// Drives a fallible async operation until it succeeds or the run ends
///
/// Cloning is cheap; clones control the same session.
pub struct RetryHandler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RetryHandler<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> fmt::Debug for RetryHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandler")
            .field("policy", &self.inner.policy)
            .field("hooks", &self.inner.hooks)
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryHandler`] with fluent API
pub struct RetryHandlerBuilder<T> {
    operation: Operation<T>,
    policy: RetryPolicy,
    hooks: Hooks<T>,
}

impl<T: Send + 'static> RetryHandlerBuilder<T> {
    /// Set the retry policy (defaults to 5 attempts, fixed 1s backoff)
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Called once with the value of the first successful attempt
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.hooks.on_success = Some(Box::new(callback));
        self
    }

    /// Called after every counted failed attempt with the new attempt count
    pub fn on_attempt_failed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RetryError, u32) + Send + Sync + 'static,
    {
        self.hooks.on_attempt_failed = Some(Box::new(callback));
        self
    }

    /// Called once with the terminal error when the run ends without success
    pub fn on_process_failed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RetryError) + Send + Sync + 'static,
    {
        self.hooks.on_process_failed = Some(Box::new(callback));
        self
    }

    /// Stop predicate consulted after each failure; `false` ends the run
    pub fn should_retry_on_condition<C>(mut self, condition: C) -> Self
    where
        C: RetryCondition + 'static,
    {
        self.hooks.condition = Box::new(condition);
        self
    }

    pub fn build(self) -> RetryHandler<T> {
        RetryHandler {
            inner: Arc::new(Inner {
                operation: self.operation,
                policy: self.policy,
                hooks: self.hooks,
                session: SharedSession::new(),
            }),
        }
    }
}

impl<T: Send + 'static> RetryHandler<T> {
    /// Create a handler with the default policy and no callbacks
    pub fn new<F, Fut, E>(operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::builder(operation).build()
    }

    /// Create a handler builder for `operation`
    ///
    /// Failures of any error type convertible into [`BoxError`] are accepted,
    /// including plain strings.
    pub fn builder<F, Fut, E>(operation: F) -> RetryHandlerBuilder<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let operation: Operation<T> = Box::new(move || {
            let attempt = operation();
            async move { attempt.await.map_err(Into::into) }.boxed()
        });

        RetryHandlerBuilder { operation, policy: RetryPolicy::default(), hooks: Hooks::default() }
    }

    /// Begin a run
    ///
    /// Ignored with a warning while a run is already active. Starting a
    /// stopped handler resets the attempt count.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(&self) {
        if let Err(err) = self.inner.session.update(RetrySession::begin) {
            warn!(status = %self.status(), "{err}");
            return;
        }

        debug!(
            max_attempts = %self.inner.policy.max_attempts(),
            backoff = self.inner.policy.backoff().kind(),
            "Retry started"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run().await;
        });
    }

    /// Request a manual stop
    ///
    /// A pending or paused wait ends immediately. An attempt in flight runs
    /// to completion first; its outcome is still honoured.
    pub fn stop(&self) {
        match self.inner.session.update(RetrySession::request_stop) {
            Ok(()) => debug!("Retry stop requested"),
            Err(err) => warn!(status = %self.status(), "{err}"),
        }
    }

    /// Suspend the pending backoff wait
    ///
    /// Only legal while started with a wait outstanding.
    pub fn pause(&self) {
        match self.inner.session.update(|session| session.pause(Instant::now())) {
            Ok(remaining) => debug!(remaining_ms = remaining.as_millis(), "Retry paused"),
            Err(err) => warn!("{err}"),
        }
    }

    /// Continue a paused wait for its remaining time
    pub fn resume(&self) {
        match self.inner.session.update(RetrySession::resume) {
            Ok(remaining) => debug!(remaining_ms = remaining.as_millis(), "Retry resumed"),
            Err(err) => warn!("{err}"),
        }
    }

    /// Failed attempts counted in the current or last run
    pub fn attempts_made(&self) -> u32 {
        self.inner.session.read(RetrySession::attempts_made)
    }

    /// Attempts left in the budget, `None` when unbounded
    pub fn attempts_remaining(&self) -> Option<u32> {
        self.inner.policy.max_attempts().remaining(self.attempts_made())
    }

    /// Wait time captured by the last pause, until the loop re-arms it
    pub fn remaining_wait(&self) -> Option<Duration> {
        self.inner.session.read(RetrySession::remaining_wait)
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.session.read(RetrySession::status)
    }

    pub fn is_started(&self) -> bool {
        self.status() == SessionStatus::Started
    }

    pub fn is_paused(&self) -> bool {
        self.status() == SessionStatus::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.status() == SessionStatus::Stopped
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Resolve once the handler reports `Stopped`
    ///
    /// Callbacks of the finished run have already been invoked. Resolves
    /// immediately if the handler is already stopped, and never for a handler
    /// that is not started.
    pub async fn stopped(&self) {
        self.inner.session.stopped().await;
    }
}

impl<T: Send + 'static> Inner<T> {
    #[instrument(
        name = "retry_run",
        skip_all,
        fields(
            max_attempts = %self.policy.max_attempts(),
            backoff = self.policy.backoff().kind(),
        )
    )]
    async fn run(&self) {
        let _finish = FinishGuard { session: &self.session };

        match self.execute().await {
            Ok(value) => {
                let attempts_made = self.session.read(RetrySession::attempts_made);
                info!(attempts_made, "Retry succeeded");
                self.hooks.success(&value);
            }
            Err(error) => {
                info!(
                    reason = %error.reason(),
                    attempts_made = error.attempts_made(),
                    error = %error.cause(),
                    "Retry process ended"
                );
                self.hooks.process_failed(&error);
            }
        }
    }

    async fn execute(&self) -> Result<T, RetryError> {
        let max_attempts = self.policy.max_attempts();

        loop {
            let made = self.session.read(RetrySession::attempts_made);
            debug!(attempt = made + 1, "Invoking operation");

            let cause = match (self.operation)().await {
                Ok(value) => return Ok(value),
                Err(err) => NativeError::new(err),
            };

            let remaining = max_attempts.remaining(made);
            let notification = RetryError::attempt_failed(cause.clone(), made, remaining);
            if !self.hooks.should_retry(&notification) {
                return Err(RetryError::exit_condition_met(cause, made, remaining));
            }
            if remaining == Some(0) {
                return Err(RetryError::all_attempts_exhausted(cause, made, remaining));
            }

            let made = self.session.update(RetrySession::record_failed_attempt);
            let remaining = max_attempts.remaining(made);
            let notification = RetryError::attempt_failed(cause.clone(), made, remaining);
            warn!(
                attempts_made = made,
                attempts_remaining = ?remaining,
                error = %cause,
                "Attempt failed"
            );
            self.hooks.attempt_failed(&notification, made);

            if remaining == Some(0) {
                return Err(RetryError::all_attempts_exhausted(cause, made, remaining));
            }

            if !self.backoff(self.policy.delay_for(made)).await {
                return Err(RetryError::manually_stopped(cause, made, remaining));
            }
        }
    }

    /// Wait out the delay, honouring pause and stop; `false` means stopped
    async fn backoff(&self, delay: Duration) -> bool {
        let mut delay = delay;

        loop {
            let Some(interrupt) = self.session.update(|s| s.arm_wait(delay, Instant::now())) else {
                return false;
            };

            debug!(delay_ms = delay.as_millis(), "Waiting before next attempt");
            let outcome = CancellableWait::with_handle(delay, interrupt).wait().await;
            let mut step = self.session.update(|s| s.settle_wait(outcome));

            loop {
                match step {
                    NextStep::Proceed => return true,
                    NextStep::Stop => return false,
                    NextStep::Rearm(remaining) => {
                        delay = remaining;
                        break;
                    }
                    NextStep::Park(park) => {
                        debug!("Retry parked until resumed");
                        park.interrupted().await;
                        step = self.session.update(RetrySession::next_step);
                    }
                }
            }
        }
    }
}
