use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::warn;

use crate::error::{JiraError, Result};

/// Outcome of a single HTTP attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Worth retrying: rate limited, server error, or a dropped connection.
    Retry {
        status: Option<u16>,
        retry_after: Option<Duration>,
    },
    /// Permanent failure, returned as-is.
    Fail(JiraError),
}

/// Abstraction over waiting so backoff can be tested without real delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next try after `attempt` (1-based) failed.
    ///
    /// A server-provided `Retry-After` replaces the exponential schedule;
    /// both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after.unwrap_or_else(|| {
            let exponent = attempt.saturating_sub(1).min(16);
            self.base_delay.saturating_mul(1u32 << exponent)
        });
        delay.min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// `op` is called with the 1-based attempt number and must send the same
    /// request every time.
    pub async fn run<T, F, Fut>(&self, sleeper: &Arc<dyn Sleeper>, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Attempt<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry {
                    status,
                    retry_after,
                } => {
                    if attempt >= max_attempts {
                        return Err(JiraError::RateLimited {
                            attempts: attempt,
                            status,
                        });
                    }

                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        "{what}: transient failure (status {}), retrying in {:.1}s ({attempt}/{max_attempts})",
                        status.map_or_else(|| "none".to_string(), |s| s.to_string()),
                        delay.as_secs_f64(),
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Parses a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
