//! Retry policy configuration
//!
//! A [`RetryPolicy`] pairs an attempt budget with a [`Backoff`] strategy. It
//! is validated once by [`RetryPolicyBuilder::build`] and immutable
//! afterwards, so the execution loop never has to re-check its shape.

use std::fmt;
use std::time::Duration;

use crate::backoff::Backoff;
use crate::error::ConfigError;

/// Default maximum number of attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Attempt budget for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAttempts {
    /// At most this many attempts
    Limited(u32),
    /// Retry until success, a predicate veto, or a manual stop
    Unbounded,
}

impl MaxAttempts {
    /// Attempts left after `attempts_made`, `None` when unbounded
    pub fn remaining(self, attempts_made: u32) -> Option<u32> {
        match self {
            Self::Limited(max) => Some(max.saturating_sub(attempts_made)),
            Self::Unbounded => None,
        }
    }

    /// Whether the budget is consumed after `attempts_made`
    pub fn is_exhausted(self, attempts_made: u32) -> bool {
        self.remaining(attempts_made) == Some(0)
    }
}

impl Default for MaxAttempts {
    fn default() -> Self {
        Self::Limited(DEFAULT_MAX_ATTEMPTS)
    }
}

impl fmt::Display for MaxAttempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Validated retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: MaxAttempts,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: MaxAttempts::default(), backoff: Backoff::default() }
    }
}

impl RetryPolicy {
    /// Create a policy builder starting from the defaults
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// The attempt budget
    pub fn max_attempts(&self) -> MaxAttempts {
        self.max_attempts
    }

    /// The backoff strategy
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Delay armed before the given retry
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.backoff.delay_for(attempt_index)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == MaxAttempts::Limited(0) {
            return Err(ConfigError::ZeroAttempts);
        }

        match (&self.backoff, self.max_attempts) {
            (Backoff::Custom(_), MaxAttempts::Unbounded) => {
                Err(ConfigError::ScheduleRequiresFiniteAttempts)
            }
            (Backoff::Custom(schedule), MaxAttempts::Limited(max))
                if schedule.len() != max as usize =>
            {
                Err(ConfigError::ScheduleLengthMismatch { expected: max, actual: schedule.len() })
            }
            (Backoff::Fixed(base) | Backoff::Linear(base) | Backoff::Exponential(base), _)
                if base.is_zero() =>
            {
                Err(ConfigError::ZeroBaseAmount)
            }
            (Backoff::Exponential(base), _) if *base < Duration::from_millis(1) => {
                Err(ConfigError::SubMillisecondExponentialBase { base: *base })
            }
            _ => Ok(()),
        }
    }
}

/// Builder for [`RetryPolicy`] with fluent API
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = MaxAttempts::Limited(attempts);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.policy.max_attempts = MaxAttempts::Unbounded;
        self
    }

    pub fn attempts(mut self, attempts: MaxAttempts) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, base: Duration) -> Self {
        self.policy.backoff = Backoff::Fixed(base);
        self
    }

    pub fn linear_backoff(mut self, base: Duration) -> Self {
        self.policy.backoff = Backoff::Linear(base);
        self
    }

    pub fn exponential_backoff(mut self, base: Duration) -> Self {
        self.policy.backoff = Backoff::Exponential(base);
        self
    }

    pub fn custom_backoff(mut self, schedule: Vec<Duration>) -> Self {
        self.policy.backoff = Backoff::Custom(schedule);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy.backoff = backoff;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, ConfigError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

impl From<RetryPolicy> for RetryPolicyBuilder {
    fn from(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `RetryPolicy::default` behavior for the policy default
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `policy.max_attempts()` equals `MaxAttempts::Limited(5)`.
    /// - Confirms `policy.backoff()` equals `Backoff::Fixed(1000ms)`.
    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts(), MaxAttempts::Limited(5));
        assert_eq!(policy.backoff(), &Backoff::Fixed(Duration::from_millis(1000)));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_builder_sets_fields() {
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .linear_backoff(Duration::from_millis(200))
            .build()
            .expect("Builder should create valid policy");

        assert_eq!(policy.max_attempts(), MaxAttempts::Limited(3));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    /// Validates `RetryPolicyBuilder::build` rejection paths.
    ///
    /// Assertions:
    /// - Ensures zero attempts fails with `ZeroAttempts`.
    /// - Ensures a zero base amount fails with `ZeroBaseAmount`.
    /// - Ensures an exponential base under 1ms fails instead of collapsing
    ///   every delay to zero.
    #[test]
    fn test_builder_validation_fails() {
        let result = RetryPolicy::builder().max_attempts(0).build();
        assert!(matches!(result, Err(ConfigError::ZeroAttempts)));

        let result = RetryPolicy::builder().exponential_backoff(Duration::ZERO).build();
        assert!(matches!(result, Err(ConfigError::ZeroBaseAmount)));

        let sub_ms = Duration::from_micros(500);
        let result = RetryPolicy::builder().exponential_backoff(sub_ms).build();
        assert!(matches!(
            result,
            Err(ConfigError::SubMillisecondExponentialBase { base }) if base == sub_ms
        ));

        let result = RetryPolicy::builder().linear_backoff(sub_ms).build();
        assert!(result.is_ok());
    }

    /// Validates custom schedule validation against the attempt budget.
    ///
    /// Assertions:
    /// - Ensures a matching schedule builds.
    /// - Ensures a length mismatch fails with `ScheduleLengthMismatch`.
    /// - Ensures an unbounded budget fails with
    ///   `ScheduleRequiresFiniteAttempts`.
    #[test]
    fn test_custom_schedule_validation() {
        let schedule = vec![Duration::from_millis(10), Duration::from_millis(20)];

        let ok = RetryPolicy::builder().max_attempts(2).custom_backoff(schedule.clone()).build();
        assert!(ok.is_ok());

        let mismatch =
            RetryPolicy::builder().max_attempts(3).custom_backoff(schedule.clone()).build();
        assert!(matches!(
            mismatch,
            Err(ConfigError::ScheduleLengthMismatch { expected: 3, actual: 2 })
        ));

        let unbounded = RetryPolicy::builder().unbounded().custom_backoff(schedule).build();
        assert!(matches!(unbounded, Err(ConfigError::ScheduleRequiresFiniteAttempts)));
    }

    /// `remaining + made == max` for every finite budget
    #[test]
    fn test_max_attempts_remaining() {
        let max = MaxAttempts::Limited(4);
        for made in 0..=4 {
            assert_eq!(max.remaining(made).map(|r| r + made), Some(4));
        }
        assert_eq!(max.remaining(9), Some(0));
        assert!(max.is_exhausted(4));
        assert!(!max.is_exhausted(3));

        assert_eq!(MaxAttempts::Unbounded.remaining(u32::MAX), None);
        assert!(!MaxAttempts::Unbounded.is_exhausted(u32::MAX));
        assert_eq!(MaxAttempts::Unbounded.to_string(), "unbounded");
    }
}
