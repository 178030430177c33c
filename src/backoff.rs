//! Bounded exponential retry around single store operations.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::error::CacheError;
use crate::utils::rand_simple;

/// Retry policy applied to every network-touching call.
///
/// Each call gets a fresh budget of `max_retries` retries on top of the first
/// attempt. Permanent errors (see [`CacheError::is_permanent`]) end the loop
/// immediately. There is no wall-clock cutoff; callers that need a deadline
/// should wrap the whole call in `tokio::time::timeout`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_interval: Duration,
    /// Growth factor applied to the delay after every retry.
    pub multiplier: f64,
    /// Jitter in `[0, 1]`; the delay is picked from `delay * (1 ± factor)`.
    pub randomization_factor: f64,
    /// Upper bound for a single delay.
    #[serde(with = "millis")]
    pub max_interval: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial_interval: Duration::from_millis(100),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

impl BackoffPolicy {
    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        BackoffPolicy {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Same policy without jitter, handy when delays must be predictable.
    pub fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(CacheError::Config(format!(
                "backoff multiplier must be >= 1, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(CacheError::Config(format!(
                "backoff randomization factor must be within [0, 1], got {}",
                self.randomization_factor
            )));
        }
        Ok(())
    }

    /// Nominal delay before retry number `retry` (starting at 0), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let nominal = self.initial_interval.as_secs_f64() * factor;
        let capped = nominal.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.randomization_factor;
        let low = delay.as_secs_f64() - spread;
        Duration::from_secs_f64((low + rand_simple() * 2.0 * spread).max(0.0))
    }

    /// Run `operation` until it succeeds, fails permanently or the budget is spent.
    ///
    /// `op` and `key` are only used for logging.
    pub async fn retry<T, F, Fut>(
        &self,
        op: &str,
        key: &str,
        mut operation: F,
    ) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut retries = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_permanent() => return Err(err),
                Err(err) => err,
            };

            if retries >= self.max_retries {
                tracing::warn!(
                    "Giving up after retries: op={}, key={}, attempts={}, error={}",
                    op,
                    key,
                    retries + 1,
                    err
                );
                return Err(err);
            }

            let delay = self.jittered(self.delay_for(retries));
            tracing::debug!(
                "Retrying store operation: op={}, key={}, retry={}, delay_ms={}, error={}",
                op,
                key,
                retries + 1,
                delay.as_millis(),
                err
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
