//! Bounded retry with a fixed delay
//!
//! Global invariants enforced:
//! - At most `max_retries + 1` attempts are made
//! - Exactly one delay separates consecutive attempts; none follows the last
//! - Cancellation is observed before every attempt and while waiting

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Longest uninterrupted sleep while waiting between attempts
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Source of time for retry delays and deadlines
///
/// Tests substitute a virtual clock so delays cost nothing.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`std::thread::sleep`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared cancellation flag with an optional deadline
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancellation that also triggers once `deadline` has passed
    pub fn with_deadline(deadline: Instant) -> Self {
        Cancellation {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, clock: &dyn Clock) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| clock.now() >= d)
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns `false` if the wait was cut short.
    fn sleep(&self, clock: &dyn Clock, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled(clock) {
                return false;
            }
            let mut slice = remaining.min(SLEEP_SLICE);
            if let Some(deadline) = self.deadline {
                slice = slice.min(deadline.saturating_duration_since(clock.now()));
            }
            clock.sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        true
    }
}

/// Result of running an operation under a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    /// Every allowed attempt failed
    Exhausted { error: E, attempts: u32 },
    /// An error the predicate refused to retry
    Rejected { error: E, attempts: u32 },
    /// Cancelled before success; `error` is the last failure, if any
    Cancelled { error: Option<E>, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Rejected { attempts, .. }
            | RetryOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Attempt limit and fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy { max_retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `operation` until it succeeds, fails for good, or is cancelled
    ///
    /// `operation` receives the 1-based attempt number. Errors for which
    /// `retryable` returns false end the run immediately.
    pub fn run<T, E, F, P>(
        &self,
        clock: &dyn Clock,
        cancellation: &Cancellation,
        retryable: P,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if cancellation.is_cancelled(clock) {
                return RetryOutcome::Cancelled {
                    error: last_error,
                    attempts: attempt - 1,
                };
            }

            let error = match operation(attempt) {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Err(error) => error,
            };

            warn!(attempt, max_attempts, error = %error, "attempt failed");

            if !retryable(&error) {
                return RetryOutcome::Rejected {
                    error,
                    attempts: attempt,
                };
            }
            if attempt == max_attempts {
                return RetryOutcome::Exhausted {
                    error,
                    attempts: attempt,
                };
            }
            if !cancellation.sleep(clock, self.delay) {
                return RetryOutcome::Cancelled {
                    error: Some(error),
                    attempts: attempt,
                };
            }
            last_error = Some(error);
        }

        // Only reachable when max_attempts is zero, which saturating_add rules out
        RetryOutcome::Cancelled {
            error: last_error,
            attempts: max_attempts,
        }
    }
}

/// Default predicate: every error is worth another attempt
pub fn always_retry<E>(_: &E) -> bool {
    true
}
