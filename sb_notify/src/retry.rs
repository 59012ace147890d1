//! ABOUTME: Exponential backoff around any notifier
//! ABOUTME: Only transient failures are retried; configuration errors fail fast

use std::time::Duration;
use tracing::{debug, warn};

use crate::{Message, Notifier, NotifyError, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32)) as u64;
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[derive(Debug)]
pub struct RetryWrapper<T: Notifier> {
    inner: T,
    config: RetryConfig,
}

impl<T: Notifier> RetryWrapper<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    pub fn with_config(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<T: Notifier> Notifier for RetryWrapper<T> {
    async fn send(&self, msg: &Message) -> Result<()> {
        let mut attempt = 0;

        loop {
            match self.inner.send(msg).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(
                            message_id = %msg.id,
                            notifier = self.inner.name(),
                            attempt = attempt + 1,
                            "Delivered after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) if !e.is_transient() => {
                    warn!(
                        message_id = %msg.id,
                        notifier = self.inner.name(),
                        error = %e,
                        "Non-retryable delivery error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        warn!(
                            message_id = %msg.id,
                            notifier = self.inner.name(),
                            attempts = attempt,
                            error = %e,
                            "Delivery failed after all attempts"
                        );
                        return Err(NotifyError::RetryExhausted(format!(
                            "{} failed after {} attempts: {}",
                            self.inner.name(),
                            attempt,
                            e
                        )));
                    }

                    let delay = self.config.delay_for_attempt(attempt - 1);
                    debug!(
                        message_id = %msg.id,
                        notifier = self.inner.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Flaky {
        calls: Arc<AtomicU32>,
        fail_times: u32,
        status: u16,
    }

    #[async_trait::async_trait]
    impl Notifier for Flaky {
        async fn send(&self, _msg: &Message) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(NotifyError::Telegram {
                    status: self.status,
                    body: "nope".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(20), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let wrapper = RetryWrapper::with_config(
            Flaky {
                calls: calls.clone(),
                fail_times: 2,
                status: 503,
            },
            fast(),
        );
        wrapper.send(&Message::new("s", "b")).await.expect("eventually delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let wrapper = RetryWrapper::with_config(
            Flaky {
                calls: calls.clone(),
                fail_times: 10,
                status: 500,
            },
            fast(),
        );
        let err = wrapper.send(&Message::new("s", "b")).await.expect_err("fails");
        assert!(matches!(err, NotifyError::RetryExhausted(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let wrapper = RetryWrapper::with_config(
            Flaky {
                calls: calls.clone(),
                fail_times: 10,
                status: 400,
            },
            fast(),
        );
        let err = wrapper.send(&Message::new("s", "b")).await.expect_err("fails");
        assert!(matches!(err, NotifyError::Telegram { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
