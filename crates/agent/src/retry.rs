//! Attempt budgets for generation call sites
//!
//! Each call site (greeting, reply, classification) owns its own
//! [`RetryPolicy`] so attempt counts and pacing are explicit instead of being
//! buried in transport code.

use std::future::Future;
use std::time::Duration;

use outreach_config::{BackoffKind, ConversationConfig};

/// Delay shape between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// Delay grows by the base amount with each retry
    Linear(Duration),
}

impl Backoff {
    /// Delay before the given attempt (1-based); the first attempt never waits
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self {
            Backoff::Fixed(base) => *base,
            Backoff::Linear(base) => base.saturating_mul(attempt - 1),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_millis(
            outreach_config::constants::retry::BACKOFF_MS,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Backoff::Fixed(Duration::ZERO))
    }

    fn backoff_from(config: &ConversationConfig) -> Backoff {
        let base = Duration::from_millis(config.backoff_ms);
        match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Linear => Backoff::Linear(base),
        }
    }

    pub fn greeting(config: &ConversationConfig) -> Self {
        Self::new(config.greeting_attempts, Self::backoff_from(config))
    }

    pub fn reply(config: &ConversationConfig) -> Self {
        Self::new(config.generation_attempts, Self::backoff_from(config))
    }

    pub fn classification(config: &ConversationConfig) -> Self {
        Self::new(config.classification_attempts, Self::backoff_from(config))
    }

    /// Run `op` until it succeeds or the budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Returns the last error when
    /// every attempt fails.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            let delay = self.backoff.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        call_site = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        call_site = label,
                        attempts = attempt,
                        error = %e,
                        "Attempts exhausted"
                    );
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(outreach_config::constants::retry::REPLY_ATTEMPTS, Backoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_shapes() {
        let fixed = Backoff::Fixed(Duration::from_millis(500));
        assert_eq!(fixed.delay_before(1), Duration::ZERO);
        assert_eq!(fixed.delay_before(3), Duration::from_millis(500));

        let linear = Backoff::Linear(Duration::from_millis(500));
        assert_eq!(linear.delay_before(2), Duration::from_millis(500));
        assert_eq!(linear.delay_before(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_policies_from_config() {
        let config = ConversationConfig::default();
        assert_eq!(RetryPolicy::greeting(&config).max_attempts, 3);
        assert_eq!(RetryPolicy::reply(&config).max_attempts, 3);
        assert_eq!(RetryPolicy::classification(&config).max_attempts, 2);
        assert_eq!(
            RetryPolicy::reply(&config).backoff,
            Backoff::Fixed(Duration::from_millis(750))
        );
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_run_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = RetryPolicy::immediate(3)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("attempt {} failed", attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(2)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {}", attempt)) }
            })
            .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_between_attempts() {
        let started = tokio::time::Instant::now();
        let _: Result<(), &str> = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(750)))
            .run("test", |_| async { Err("nope") })
            .await;
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }
}
