#[cfg(test)]
mod tests;

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::sleep;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);
pub const DEFAULT_FACTOR: u32 = 2;
pub const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// How a failed call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transience {
    /// Retry once the limit resets
    RateLimited { reset_at: DateTime<Utc> },
    /// Retry after backing off
    Transient,
    Permanent,
}

/// Treats rate limits and server faults as retryable and everything else
/// as final.
pub fn classify_remote(error: &Error) -> Transience {
    match error {
        Error::RateLimited { reset_at } => Transience::RateLimited {
            reset_at: *reset_at,
        },
        Error::RemoteTransient { .. } => Transience::Transient,
        _ => Transience::Permanent,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: u32,
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            factor: DEFAULT_FACTOR,
            max_rate_limit_wait: DEFAULT_MAX_RATE_LIMIT_WAIT,
        }
    }
}

/// The last error of an operation that didn't succeed, and how many times
/// it was called.
#[derive(Debug, PartialEq)]
pub struct RetryFailure {
    pub error: Error,
    pub attempts: u32,
}

impl RetryFailure {
    pub fn into_object_creation_error<P: ToString>(self, path: P) -> Error {
        Error::ObjectCreation {
            path: path.to_string(),
            attempts: self.attempts,
            source: Box::new(self.error),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (starting at 0).
    pub fn backoff(&self, retry: u32) -> Duration {
        let multiplier = self.factor.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// How long to wait for a rate limit that resets at `reset_at`, or
    /// `None` if that is longer than this policy allows.
    pub fn rate_limit_wait(&self, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        let wait = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
        if wait > self.max_rate_limit_wait {
            None
        } else {
            Some(wait)
        }
    }

    /// Calls `operation` until it succeeds, fails permanently, or has been
    /// retried `max_retries` times. `on_retry` sees each retryable error,
    /// the number of the upcoming retry, and the wait before it.
    pub async fn run<T, F, Fut, C, R>(
        &self,
        mut operation: F,
        classify: C,
        mut on_retry: R,
    ) -> std::result::Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> Transience,
        R: FnMut(&Error, u32, Duration),
    {
        let mut retries = 0;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let attempts = retries + 1;
            if retries >= self.max_retries {
                return Err(RetryFailure { error, attempts });
            }

            let wait = match classify(&error) {
                Transience::Permanent => return Err(RetryFailure { error, attempts }),
                Transience::Transient => self.backoff(retries),
                Transience::RateLimited { reset_at } => {
                    match self.rate_limit_wait(reset_at, Utc::now()) {
                        Some(wait) => wait,
                        None => return Err(RetryFailure { error, attempts }),
                    }
                }
            };

            retries += 1;
            on_retry(&error, retries, wait);
            sleep(wait).await;
        }
    }
}
