//! Reconnect policy and retry pacing.
//!
//! A policy is fixed when a session is created. It decides how often the
//! session may try to (re)open the device, how long each blocking device call
//! may take, and how many consecutive empty reads demote a live link.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Consecutive failed reads that declare the link lost.
pub const DEFAULT_MAX_FAILED_FRAMES: u32 = 5;

/// Minimum spacing between connect attempts (2 seconds).
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for opening a device and reading the verifying frame.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for a single frame read.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum delay cap for exponential backoff (30 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// How many connect attempts `start()` may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptBudget {
    /// Retry forever
    Unbounded,
    /// Give up after this many attempts
    Bounded(u32),
}

impl AttemptBudget {
    /// Map the conventional integer form: any value below 1 means unbounded.
    pub fn from_count(count: i64) -> Self {
        if count > 0 {
            AttemptBudget::Bounded(count.min(u32::MAX as i64) as u32)
        } else {
            AttemptBudget::Unbounded
        }
    }

    /// True once `attempts` failed attempts have used up the budget.
    pub fn is_exhausted(self, attempts: u32) -> bool {
        match self {
            AttemptBudget::Unbounded => false,
            AttemptBudget::Bounded(max) => attempts >= max,
        }
    }
}

/// Where the attempt budget applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetScope {
    /// Only the initial `start()` sequence is metered; reconnection from a
    /// lost link is limited by `reconnect_delay` alone.
    #[default]
    Startup,
    /// Consecutive failed reconnects after a lost link are metered too, and
    /// exhausting them moves the session to `Failed`.
    Always,
}

/// Delay between attempts inside `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Always wait `reconnect_delay`
    #[default]
    Fixed,
    /// `reconnect_delay * 2^n`, capped at `max`
    Exponential { max: Duration },
}

/// Policy fields of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub attempts: AttemptBudget,
    pub budget_scope: BudgetScope,
    pub backoff: Backoff,
    pub reconnect_delay: Duration,
    pub connection_timeout: Duration,
    pub frame_timeout: Duration,
    pub max_failed_frames: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: AttemptBudget::Unbounded,
            budget_scope: BudgetScope::Startup,
            backoff: Backoff::Fixed,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            max_failed_frames: DEFAULT_MAX_FAILED_FRAMES,
        }
    }
}

/// Rejected policy values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("max_failed_frames must be at least 1")]
    ZeroFailureThreshold,
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("bounded attempt budget must allow at least one attempt")]
    EmptyBudget,
}

impl ReconnectPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_failed_frames == 0 {
            return Err(PolicyError::ZeroFailureThreshold);
        }
        if self.connection_timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout("connection_timeout"));
        }
        if self.frame_timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout("frame_timeout"));
        }
        if self.attempts == AttemptBudget::Bounded(0) {
            return Err(PolicyError::EmptyBudget);
        }
        Ok(())
    }

    /// Delay to wait after the `failed`-th failed attempt (0-based) in `start()`.
    pub fn retry_delay(&self, failed: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.reconnect_delay,
            Backoff::Exponential { max } => calculate_backoff(failed, self.reconnect_delay, max),
        }
    }
}

/// Calculate exponential backoff delay.
///
/// Uses the formula: min(base * 2^attempt, max)
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(max)
}
