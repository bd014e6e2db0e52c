//! Retry session state machine
//!
//! Tracks the lifecycle status, attempt count and pending wait of one
//! handler. The state lives behind a mutex in [`SharedSession`] so the
//! control methods (`start`, `stop`, `pause`, `resume`) can be called from
//! any task; the lock is only ever held for synchronous bookkeeping.
//!
//! ```text
//! Idle ──start──▶ Started ──(run ends)──▶ Stopped ──start──▶ Started
//!                  │   ▲
//!             pause│   │resume
//!                  ▼   │
//!                 Paused
//! ```

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::wait::{WaitHandle, WaitOutcome};

/// Lifecycle status of a retry session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Created, never started
    Idle,
    /// A run is in progress
    Started,
    /// The run is suspended in its backoff wait
    Paused,
    /// The last run has finished
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Started => write!(f, "Started"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Rejected lifecycle call
///
/// These never reach the caller; the handler logs them and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum TransitionError {
    #[error("Retry is already running")]
    AlreadyRunning,
    #[error("Retry has not been started")]
    NotStarted,
    #[error("Nothing to stop")]
    AlreadyStopped,
    #[error("Cannot pause retry logic: status is {0}")]
    NotRunning(SessionStatus),
    #[error("Cannot pause retry logic: no backoff wait is pending")]
    NoPendingWait,
    #[error("Cannot resume retry logic: status is {0}")]
    NotPaused(SessionStatus),
}

/// The wait currently armed by the execution loop
#[derive(Debug)]
struct PendingWait {
    started_at: Instant,
    duration: Duration,
    interrupt: WaitHandle,
}

/// What the execution loop does after a wait or a pause resolves
#[derive(Debug)]
pub(crate) enum NextStep {
    /// Run the next attempt
    Proceed,
    /// Arm another wait for the remaining duration
    Rearm(Duration),
    /// Suspended until `resume` or `stop` interrupts the handle
    Park(WaitHandle),
    /// End the run as manually stopped
    Stop,
}

/// Mutable run state of one handler
#[derive(Debug)]
pub(crate) struct RetrySession {
    status: SessionStatus,
    attempts_made: u32,
    wait: Option<PendingWait>,
    remaining_wait: Option<Duration>,
    stop_requested: bool,
    park: Option<WaitHandle>,
}

impl RetrySession {
    pub(crate) fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            attempts_made: 0,
            wait: None,
            remaining_wait: None,
            stop_requested: false,
            park: None,
        }
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.status
    }

    pub(crate) fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub(crate) fn remaining_wait(&self) -> Option<Duration> {
        self.remaining_wait
    }

    #[cfg(test)]
    pub(crate) fn has_pending_wait(&self) -> bool {
        self.wait.is_some()
    }

    fn reset(&mut self) {
        self.attempts_made = 0;
        self.wait = None;
        self.remaining_wait = None;
        self.stop_requested = false;
        self.park = None;
    }

    /// Enter `Started`, resetting a stopped session first
    pub(crate) fn begin(&mut self) -> Result<(), TransitionError> {
        match self.status {
            SessionStatus::Started | SessionStatus::Paused => {
                return Err(TransitionError::AlreadyRunning);
            }
            SessionStatus::Stopped => self.reset(),
            SessionStatus::Idle => {}
        }
        self.status = SessionStatus::Started;
        Ok(())
    }

    /// Flag the run for a manual stop and interrupt whatever it waits on
    pub(crate) fn request_stop(&mut self) -> Result<(), TransitionError> {
        match self.status {
            SessionStatus::Idle => return Err(TransitionError::NotStarted),
            SessionStatus::Stopped => return Err(TransitionError::AlreadyStopped),
            SessionStatus::Started | SessionStatus::Paused => {}
        }

        self.stop_requested = true;
        if let Some(wait) = &self.wait {
            wait.interrupt.interrupt();
        }
        if let Some(park) = &self.park {
            park.interrupt();
        }
        Ok(())
    }

    /// Suspend the pending wait, returning the time it still had to run
    pub(crate) fn pause(&mut self, now: Instant) -> Result<Duration, TransitionError> {
        if self.status != SessionStatus::Started {
            return Err(TransitionError::NotRunning(self.status));
        }
        let wait = match &self.wait {
            Some(wait) if !wait.interrupt.is_interrupted() => wait,
            _ => return Err(TransitionError::NoPendingWait),
        };

        let elapsed = now.saturating_duration_since(wait.started_at);
        let remaining = wait.duration.saturating_sub(elapsed);
        wait.interrupt.interrupt();

        self.remaining_wait = Some(remaining);
        self.park = Some(WaitHandle::new());
        self.status = SessionStatus::Paused;
        Ok(remaining)
    }

    /// Leave `Paused` and wake the parked loop
    pub(crate) fn resume(&mut self) -> Result<Duration, TransitionError> {
        if self.status != SessionStatus::Paused {
            return Err(TransitionError::NotPaused(self.status));
        }

        self.status = SessionStatus::Started;
        if let Some(park) = &self.park {
            park.interrupt();
        }
        Ok(self.remaining_wait.unwrap_or(Duration::ZERO))
    }

    /// Count a failed attempt that will be retried or reported
    pub(crate) fn record_failed_attempt(&mut self) -> u32 {
        self.attempts_made = self.attempts_made.saturating_add(1);
        self.attempts_made
    }

    /// Register a wait, or `None` if a stop arrived while the attempt ran
    pub(crate) fn arm_wait(&mut self, duration: Duration, now: Instant) -> Option<WaitHandle> {
        if self.stop_requested {
            return None;
        }

        let interrupt = WaitHandle::new();
        self.wait = Some(PendingWait { started_at: now, duration, interrupt: interrupt.clone() });
        Some(interrupt)
    }

    /// Clear the finished wait and decide how the loop continues
    pub(crate) fn settle_wait(&mut self, outcome: WaitOutcome) -> NextStep {
        self.wait = None;
        if outcome == WaitOutcome::Elapsed && self.remaining_wait.is_none() && !self.stop_requested
        {
            return NextStep::Proceed;
        }
        self.next_step()
    }

    /// Decide how the loop continues after a wait or a park resolves
    pub(crate) fn next_step(&mut self) -> NextStep {
        if self.stop_requested {
            self.park = None;
            return NextStep::Stop;
        }

        match self.status {
            SessionStatus::Paused => match &self.park {
                Some(park) => NextStep::Park(park.clone()),
                None => {
                    let park = WaitHandle::new();
                    self.park = Some(park.clone());
                    NextStep::Park(park)
                }
            },
            _ => {
                self.park = None;
                match self.remaining_wait.take() {
                    Some(remaining) => NextStep::Rearm(remaining),
                    None => NextStep::Proceed,
                }
            }
        }
    }

    /// Mark the run as finished
    pub(crate) fn finish(&mut self) {
        self.status = SessionStatus::Stopped;
        self.wait = None;
        self.park = None;
    }
}

/// Session state shared between a handler and its running loop
#[derive(Debug)]
pub(crate) struct SharedSession {
    state: Mutex<RetrySession>,
    status_tx: watch::Sender<SessionStatus>,
}

impl SharedSession {
    pub(crate) fn new() -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        Self { state: Mutex::new(RetrySession::new()), status_tx }
    }

    /// Run `f` under the lock and publish the status if it changed
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut RetrySession) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        let status = state.status();

        // Published under the lock so the watch never lags a later update.
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        drop(state);
        result
    }

    /// Read the state under the lock
    pub(crate) fn read<R>(&self, f: impl FnOnce(&RetrySession) -> R) -> R {
        f(&*self.state.lock())
    }

    /// Resolve once the session reports `Stopped`
    pub(crate) async fn stopped(&self) {
        let mut rx = self.status_tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|status| *status == SessionStatus::Stopped).await;
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the session state machine
    //!
    //! Tests cover every legal and illegal transition, wait bookkeeping
    //! during pause/resume, and the reset performed on restart.

    use super::*;

    fn started() -> RetrySession {
        let mut session = RetrySession::new();
        session.begin().unwrap();
        session
    }

    /// Validates `RetrySession::begin` behavior for the start transitions.
    ///
    /// Assertions:
    /// - Confirms `Idle -> Started`.
    /// - Confirms a second `begin` is rejected with `AlreadyRunning`.
    #[test]
    fn test_begin_transitions() {
        let mut session = RetrySession::new();
        assert_eq!(session.status(), SessionStatus::Idle);

        assert!(session.begin().is_ok());
        assert_eq!(session.status(), SessionStatus::Started);
        assert_eq!(session.begin(), Err(TransitionError::AlreadyRunning));
    }

    /// Validates that restarting a stopped session resets its counters.
    ///
    /// Assertions:
    /// - Confirms `attempts_made` returns to `0`.
    /// - Ensures no stop request survives the restart.
    #[test]
    fn test_restart_resets_state() {
        let mut session = started();
        session.record_failed_attempt();
        session.record_failed_attempt();
        session.request_stop().unwrap();
        session.finish();

        assert_eq!(session.status(), SessionStatus::Stopped);
        assert_eq!(session.attempts_made(), 2);

        session.begin().unwrap();
        assert_eq!(session.attempts_made(), 0);
        assert!(session.arm_wait(Duration::from_millis(5), Instant::now()).is_some());
    }

    /// Validates `RetrySession::request_stop` rejection paths.
    ///
    /// Assertions:
    /// - Confirms stopping an idle session returns `NotStarted`.
    /// - Confirms stopping a stopped session returns `AlreadyStopped`.
    #[test]
    fn test_stop_rejections() {
        let mut session = RetrySession::new();
        assert_eq!(session.request_stop(), Err(TransitionError::NotStarted));

        session.begin().unwrap();
        session.finish();
        assert_eq!(session.request_stop(), Err(TransitionError::AlreadyStopped));
    }

    /// A stop interrupts the pending wait and wins over a late elapse
    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_wait() {
        let mut session = started();
        let handle = session.arm_wait(Duration::from_millis(500), Instant::now()).unwrap();

        session.request_stop().unwrap();
        assert!(handle.is_interrupted());
        assert!(matches!(session.settle_wait(WaitOutcome::Elapsed), NextStep::Stop));
        assert!(!session.has_pending_wait());
    }

    /// A stop requested while no wait is armed blocks the next one
    #[tokio::test(start_paused = true)]
    async fn test_stop_before_wait_is_armed() {
        let mut session = started();
        session.request_stop().unwrap();

        assert!(session.arm_wait(Duration::from_millis(500), Instant::now()).is_none());
    }

    /// Validates `RetrySession::pause` and `resume` wait bookkeeping.
    ///
    /// Assertions:
    /// - Confirms the remaining wait is `duration - elapsed`.
    /// - Confirms the loop parks while paused and re-arms after resume.
    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_bookkeeping() {
        let mut session = started();
        let armed_at = Instant::now();
        let handle = session.arm_wait(Duration::from_millis(500), armed_at).unwrap();

        let remaining = session.pause(armed_at + Duration::from_millis(200)).unwrap();
        assert_eq!(remaining, Duration::from_millis(300));
        assert_eq!(session.status(), SessionStatus::Paused);
        assert!(handle.is_interrupted());

        let park = match session.settle_wait(WaitOutcome::Interrupted) {
            NextStep::Park(park) => park,
            other => panic!("expected park, got {other:?}"),
        };
        assert!(!park.is_interrupted());

        assert_eq!(session.resume(), Ok(Duration::from_millis(300)));
        assert!(park.is_interrupted());
        assert!(matches!(session.next_step(), NextStep::Rearm(d) if d == Duration::from_millis(300)));
        assert_eq!(session.remaining_wait(), None);
    }

    /// Resume before the loop noticed the pause still honours the remainder
    #[tokio::test(start_paused = true)]
    async fn test_resume_before_loop_observes_pause() {
        let mut session = started();
        let armed_at = Instant::now();
        session.arm_wait(Duration::from_millis(400), armed_at).unwrap();

        session.pause(armed_at + Duration::from_millis(100)).unwrap();
        session.resume().unwrap();

        assert!(matches!(
            session.settle_wait(WaitOutcome::Interrupted),
            NextStep::Rearm(d) if d == Duration::from_millis(300)
        ));
    }

    /// Validates pause and resume rejection paths.
    ///
    /// Assertions:
    /// - Confirms pausing an idle session returns `NotRunning`.
    /// - Confirms pausing without a pending wait returns `NoPendingWait`.
    /// - Confirms resuming a started session returns `NotPaused`.
    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_rejections() {
        let mut session = RetrySession::new();
        assert_eq!(
            session.pause(Instant::now()),
            Err(TransitionError::NotRunning(SessionStatus::Idle))
        );

        session.begin().unwrap();
        assert_eq!(session.pause(Instant::now()), Err(TransitionError::NoPendingWait));
        assert_eq!(session.resume(), Err(TransitionError::NotPaused(SessionStatus::Started)));
    }

    /// Stop while paused wakes the parked loop and ends the run
    #[tokio::test(start_paused = true)]
    async fn test_stop_while_paused() {
        let mut session = started();
        session.arm_wait(Duration::from_millis(500), Instant::now()).unwrap();
        session.pause(Instant::now()).unwrap();

        let park = match session.settle_wait(WaitOutcome::Interrupted) {
            NextStep::Park(park) => park,
            other => panic!("expected park, got {other:?}"),
        };

        session.request_stop().unwrap();
        assert!(park.is_interrupted());
        assert!(matches!(session.next_step(), NextStep::Stop));
    }

    /// Status changes are published to subscribers
    #[tokio::test]
    async fn test_shared_session_publishes_status() {
        let shared = SharedSession::new();
        let rx = shared.status_tx.subscribe();

        shared.update(RetrySession::begin).unwrap();
        assert_eq!(*rx.borrow(), SessionStatus::Started);

        shared.update(RetrySession::finish);
        shared.stopped().await;
        assert_eq!(shared.read(RetrySession::status), SessionStatus::Stopped);
    }

    /// Validates that the published status tracks racing updates.
    ///
    /// Assertions:
    /// - Confirms that once every thread has joined, the watch value equals
    ///   the status held under the lock.
    #[test]
    fn test_published_status_matches_state_after_races() {
        let shared = SharedSession::new();

        for _ in 0..200 {
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = shared.update(RetrySession::begin);
                    shared.update(RetrySession::finish);
                });
                scope.spawn(|| {
                    let _ = shared.update(RetrySession::begin);
                });
            });

            let published = *shared.status_tx.borrow();
            assert_eq!(published, shared.read(RetrySession::status));
        }
    }
}
