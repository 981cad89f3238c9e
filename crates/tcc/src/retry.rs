//! Exponential backoff retry policy for the Confirm and Cancel phases.
//!
//! [`RetryPolicy`] is plain configuration and is shared read-only by every
//! concurrent retry loop. Each loop asks it for its own [`Backoff`] cursor,
//! so concurrent retries never contend on shared mutable state.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BoxError;

/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);

/// Default growth factor applied to the delay after each failed attempt.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;

/// Default jitter: each delay is drawn from `interval * [0.5, 1.5]`.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Default upper bound for a single delay.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of attempts, counting the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Immutable description of a bounded exponential backoff schedule.
///
/// Deserialized values go through the same clamping as the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RetryPolicyFields")]
pub struct RetryPolicy {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
    max_attempts: u32,
}

/// Unchecked wire form of [`RetryPolicy`]; missing fields take the defaults.
#[derive(Deserialize)]
#[serde(default)]
struct RetryPolicyFields {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicyFields {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl From<RetryPolicyFields> for RetryPolicy {
    fn from(fields: RetryPolicyFields) -> Self {
        RetryPolicy::default()
            .with_initial_interval(fields.initial_interval)
            .with_multiplier(fields.multiplier)
            .with_randomization_factor(fields.randomization_factor)
            .with_max_interval(fields.max_interval)
            .with_max_attempts(fields.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that retries immediately, without sleeping.
    pub fn no_delay(max_attempts: u32) -> Self {
        Self::default()
            .with_initial_interval(Duration::ZERO)
            .with_randomization_factor(0.0)
            .with_max_attempts(max_attempts)
    }

    /// Sets the total number of attempts. Values below 1 are clamped to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the delay before the second attempt.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the growth factor. Non-finite values and values below 1 become 1.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    /// Sets the jitter fraction, clamped to `[0, 1]`. Zero disables jitter.
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Sets the cap applied to every delay.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn randomization_factor(&self) -> f64 {
        self.randomization_factor
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns a fresh cursor over this schedule.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            current_interval: self.initial_interval.min(self.max_interval),
            attempts: 0,
            policy: self.clone(),
        }
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    ///
    /// Sleeps between attempts according to a cursor owned by this call.
    /// On exhaustion the failure of the last attempt is returned.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let mut backoff = self.backoff();
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e.into(),
            };
            match backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(
                        attempt = backoff.attempts(),
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                None => {
                    return Err(RetryError {
                        attempts: backoff.attempts(),
                        last: err,
                    });
                }
            }
        }
    }
}

/// Mutable position within a [`RetryPolicy`] schedule.
///
/// Owned by exactly one retry loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    current_interval: Duration,
    attempts: u32,
}

impl Backoff {
    /// Records a failed attempt and returns the delay before the next one,
    /// or `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        let delay = self.jittered(self.current_interval);
        let grown = self.current_interval.as_secs_f64() * self.policy.multiplier;
        self.current_interval = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.policy.max_interval)
            .min(self.policy.max_interval);
        Some(delay)
    }

    /// Returns the number of failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the interval the next delay will be drawn around.
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    fn jittered(&self, interval: Duration) -> Duration {
        let factor = self.policy.randomization_factor;
        if factor == 0.0 || interval.is_zero() {
            return interval;
        }
        let base = interval.as_secs_f64();
        let (low, high) = (base * (1.0 - factor), base * (1.0 + factor));
        if !(low.is_finite() && high.is_finite() && low < high) {
            return interval;
        }
        let delay = rand::thread_rng().gen_range(low..=high);
        Duration::try_from_secs_f64(delay).unwrap_or(interval)
    }
}

/// Returned when every attempt allowed by the policy failed.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryError {
    attempts: u32,
    #[source]
    last: BoxError,
}

impl RetryError {
    /// Returns the number of attempts made.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the failure of the last attempt.
    pub fn last(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.last.as_ref()
    }

    /// Consumes the error, returning the failure of the last attempt.
    pub fn into_last(self) -> BoxError {
        self.last
    }
}
