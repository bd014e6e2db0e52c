//! Cancellable backoff wait
//!
//! A one-shot timer that resolves either when its duration elapses or when
//! its [`WaitHandle`] is interrupted, whichever comes first.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// How a wait resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration passed
    Elapsed,
    /// The handle was interrupted first
    Interrupted,
}

/// A handle that can be used to interrupt a pending wait
#[derive(Debug, Clone, Default)]
pub struct WaitHandle {
    token: CancellationToken,
}

impl WaitHandle {
    /// Create a new, uninterrupted handle
    pub fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    /// Interrupt the wait
    ///
    /// Idempotent, and a no-op once the wait has already elapsed.
    pub fn interrupt(&self) {
        self.token.cancel();
    }

    /// Check if the handle has been interrupted
    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once the handle is interrupted
    pub async fn interrupted(&self) {
        self.token.cancelled().await;
    }
}

/// A one-shot wait with an interrupt handle
#[derive(Debug)]
pub struct CancellableWait {
    duration: Duration,
    handle: WaitHandle,
}

impl CancellableWait {
    /// Create a wait for `duration` with a fresh handle
    pub fn new(duration: Duration) -> Self {
        Self::with_handle(duration, WaitHandle::new())
    }

    /// Create a wait bound to an existing handle
    pub fn with_handle(duration: Duration, handle: WaitHandle) -> Self {
        Self { duration, handle }
    }

    /// Get a handle to interrupt the wait
    pub fn handle(&self) -> WaitHandle {
        self.handle.clone()
    }

    /// The armed duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Wait for the timer to fire or be interrupted
    ///
    /// The timer is dropped on both outcomes. A handle interrupted before
    /// the wait starts resolves immediately.
    pub async fn wait(self) -> WaitOutcome {
        if self.handle.is_interrupted() {
            return WaitOutcome::Interrupted;
        }

        tokio::select! {
            biased;
            () = self.handle.token.cancelled() => WaitOutcome::Interrupted,
            () = sleep(self.duration) => WaitOutcome::Elapsed,
        }
    }
}
