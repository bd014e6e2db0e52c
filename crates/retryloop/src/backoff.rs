//! Backoff strategies
//!
//! Maps the index of a retry to the delay armed before it. Index 1 is the
//! wait after the first failed attempt.

use std::time::Duration;

/// Default base amount for fixed, linear and exponential backoff
pub const DEFAULT_BASE_AMOUNT: Duration = Duration::from_millis(1000);

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `base * attempt_index`
    Linear(Duration),
    /// `base_ms ^ attempt_index` milliseconds, sub-millisecond parts of the
    /// base are truncated
    Exponential(Duration),
    /// One explicit delay per attempt, `schedule[attempt_index - 1]`
    Custom(Vec<Duration>),
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed(DEFAULT_BASE_AMOUNT)
    }
}

impl Backoff {
    /// Calculate the delay before the given retry
    ///
    /// Pure and saturating: large indices clamp to `u64::MAX` milliseconds
    /// rather than overflowing. A custom schedule index outside the schedule
    /// yields `Duration::ZERO`; policies built through
    /// [`RetryPolicyBuilder`](crate::policy::RetryPolicyBuilder) never ask
    /// for one.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        match self {
            Self::Fixed(base) => *base,
            Self::Linear(base) => base.saturating_mul(attempt_index),
            Self::Exponential(base) => {
                let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_pow(attempt_index))
            }
            Self::Custom(schedule) => attempt_index
                .checked_sub(1)
                .and_then(|i| schedule.get(i as usize))
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }

    /// The base amount, `None` for a custom schedule
    pub fn base_amount(&self) -> Option<Duration> {
        match self {
            Self::Fixed(base) | Self::Linear(base) | Self::Exponential(base) => Some(*base),
            Self::Custom(_) => None,
        }
    }

    /// Short name used in logs and configuration
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Fixed(_) => "fixed",
            Self::Linear(_) => "linear",
            Self::Exponential(_) => "exponential",
            Self::Custom(_) => "custom",
        }
    }
}
