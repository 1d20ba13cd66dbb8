use std::future::Future;

use rand::Rng;
use tokio::time::{sleep, Duration};

use crate::exchange::FetchError;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter_factor: 0.3,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with jitter, clamped to `max_delay_ms`.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2.0_f64.powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        let jitter_range = clamped * self.jitter_factor;
        let jitter: f64 = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((clamped + jitter).max(0.0) as u64)
    }
}

/// Retry a fetch while it fails transiently. Permanent errors (unknown
/// symbol, malformed payload) return immediately; the caller decides what
/// skipping the tick means.
pub async fn retry_fetch<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_transient() || attempt >= config.max_retries {
                    return Err(err);
                }
                let delay = config.delay_for_attempt(attempt);
                log(
                    Level::Warn,
                    Domain::Market,
                    "fetch_retry",
                    obj(&[
                        ("op", v_str(operation_name)),
                        ("attempt", v_num((attempt + 1) as f64)),
                        ("delay_ms", v_num(delay.as_millis() as f64)),
                        ("error", v_str(&err.to_string())),
                    ]),
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

pub fn is_retryable_http_status(status: u16) -> bool {
    matches!(
        status,
        408 |   // Request Timeout
        429 |   // Too Many Requests
        500 |   // Internal Server Error
        502 |   // Bad Gateway
        503 |   // Service Unavailable
        504     // Gateway Timeout
    )
}
