use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// total attempts, first one included
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 1,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

impl RetrySettings {
    /// `max_retries` extra attempts on top of the first one.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            attempts: max_retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Retry while the error is retryable; other errors return at once.
    pub async fn run_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;

        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    warn!("Attempt {attempt}/{attempts} failed: {e}");
                    sleep(Duration::from_millis(delay)).await;
                    delay = delay.saturating_mul(2).min(self.max_delay_ms);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!("all {attempt} attempts failed: {e}");
                    }
                    return Err(e);
                }
            }
        }
    }
}
