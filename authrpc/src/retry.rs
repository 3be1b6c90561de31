use std::{fmt, ops::RangeInclusive, time::Duration};

/// An error that knows whether the operation that produced it is worth
/// attempting again.
pub trait RetryError {
    fn should_retry(&self) -> bool;
}

pub trait RetryStrategy<E>: Sync {
    /// Returns the delay before the next attempt, or `None` to give up.
    fn retry(&self, completed_attempts: usize, last_error: &E) -> Option<Duration>;
}

/// A jittered, optionally exponential retry policy.
#[derive(Clone, Debug, PartialEq)]
pub struct Retry {
    delay: RangeInclusive<Duration>,
    max_attempts: Option<usize>,
    factor: f64,
}

const MAX_FACTOR: f64 = 50.0;

impl Retry {
    pub const fn never() -> Retry {
        Retry {
            delay: Duration::ZERO..=Duration::ZERO,
            max_attempts: Some(1),
            factor: 1.0,
        }
    }

    pub const fn immediately() -> Retry {
        Retry {
            delay: Duration::ZERO..=Duration::ZERO,
            max_attempts: None,
            factor: 1.0,
        }
    }

    pub const fn fixed(dur: Duration) -> Retry {
        Retry {
            delay: dur..=dur,
            max_attempts: None,
            factor: 1.0,
        }
    }

    pub const fn jitter_millis(n: RangeInclusive<u64>) -> Retry {
        Retry {
            delay: Duration::from_millis(*n.start())..=Duration::from_millis(*n.end()),
            max_attempts: None,
            factor: 1.0,
        }
    }

    pub const fn with_max_attempts(self, n: usize) -> Retry {
        Retry {
            max_attempts: Some(n),
            ..self
        }
    }

    /// Multiply the delay by `factor` after every failed attempt.
    pub const fn with_backoff(self, factor: f64) -> Retry {
        Retry { factor, ..self }
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::never()
    }
}

impl<E: RetryError> RetryStrategy<E> for Retry {
    fn retry(&self, completed_attempts: usize, last_error: &E) -> Option<Duration> {
        let attempts_remaining = self
            .max_attempts
            .map(|x| completed_attempts < x)
            .unwrap_or(true);
        if !last_error.should_retry() || !attempts_remaining {
            return None;
        }

        let delay = rand::random_range(self.delay.clone());
        Some(scale(delay, self.factor, completed_attempts))
    }
}

/// `delay * factor^(attempts - 1)`, with the multiplier kept in
/// `1..=MAX_FACTOR` and the result saturating at `Duration::MAX`.
fn scale(delay: Duration, factor: f64, completed_attempts: usize) -> Duration {
    if !factor.is_finite() || factor <= 1.0 {
        return delay;
    }
    let exp = i32::try_from(completed_attempts.saturating_sub(1)).unwrap_or(i32::MAX);
    let f = factor.powi(exp).min(MAX_FACTOR);
    if f == 1.0 {
        return delay;
    }
    Duration::try_from_secs_f64(delay.as_secs_f64() * f).unwrap_or(Duration::MAX)
}

/// Run `op` until it succeeds or `retry` gives up.
pub async fn attempt<R, E, F, Fut, T>(retry: &R, op: F) -> Result<T, E>
where
    R: RetryStrategy<E>,
    E: RetryError + fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut completed = 0;
    loop {
        completed += 1;
        match op().await {
            Ok(x) => return Ok(x),
            Err(e) => match retry.retry(completed, &e) {
                Some(dur) => {
                    log::warn!("retry after {dur:?}: {e}");
                    tokio::time::sleep(dur).await;
                }
                None => {
                    log::error!("no retries: {e}");
                    return Err(e);
                }
            },
        }
    }
}
