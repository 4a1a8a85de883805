use crate::error::GasSaverError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff for transient RPC failures: `base_delay × 2^attempt`
/// between attempts, `max_attempts` calls in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation`, retrying only errors that are transient. The final
    /// transient error reports how many attempts were made.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, GasSaverError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GasSaverError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        operation_name,
                        attempt + 1,
                        self.max_attempts,
                        err,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(GasSaverError::TransientRpc { message, .. }) => {
                    return Err(GasSaverError::TransientRpc {
                        message,
                        attempts: attempt + 1,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
