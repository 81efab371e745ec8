//! Retry with exponential backoff for calls to dependent services.
//!
//! Object storage and the relational store may be briefly unavailable (cold
//! starts, bucket still being provisioned). [`RetryPolicy`] is the single place
//! that decides whether and when such a call is attempted again; the storage
//! and status-store adapters route every call through it.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Message fragments that identify a failure expected while a dependency warms up.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "timed out",
    "timeout",
    "broken pipe",
    "service unavailable",
    "nosuchbucket",
    "bucket does not exist",
    "bucket not found",
];

/// Default transient-error classifier: case-insensitive match on known markers.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Errors that know whether they are worth retrying.
pub trait Retryable {
    /// Returns true when the failure is expected to clear up on its own.
    fn is_transient(&self) -> bool;
}

/// Backoff parameters. Storage and database callers use distinct instances.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Defaults tuned for object storage.
    pub fn storage() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Defaults tuned for the relational store.
    pub fn database() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(8),
        }
    }

    /// Delay to wait after a failed attempt, given the delay used before it.
    ///
    /// Multipliers below 1.0 (or NaN) are treated as 1.0, so an unvalidated
    /// config never produces a negative delay.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0);
        let next = current.as_secs_f64() * multiplier;
        if !next.is_finite() || next >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(next)
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_attempts == 0 {
            anyhow::bail!("retry max_attempts must be at least 1");
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "retry backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            );
        }
        if self.max_delay < self.initial_delay {
            anyhow::bail!("retry max_delay must not be smaller than initial_delay");
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::storage()
    }
}

/// Observer invoked before each retry with the error and the failed attempt number.
pub type OnRetry = Arc<dyn Fn(&dyn Display, u32) + Send + Sync>;

/// Retry-with-exponential-backoff wrapper around a fallible async operation.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    on_retry: Option<OnRetry>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            on_retry: None,
        }
    }

    /// Attach an observability hook. It cannot influence whether a retry happens.
    pub fn with_on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn Display, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying errors the error type classifies as transient.
    pub async fn run<T, E, F, Fut>(&self, op_name: &str, operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(op_name, |e: &E| e.is_transient(), operation)
            .await
    }

    /// Run `operation`, retrying while `should_retry` accepts the error and
    /// attempts remain. Returns the last error once retries are exhausted, or
    /// the first error that `should_retry` rejects.
    pub async fn run_with<T, E, F, Fut, P>(
        &self,
        op_name: &str,
        should_retry: P,
        mut operation: F,
    ) -> Result<T, E>
    where
        E: Display,
        P: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = op_name,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= max_attempts || !should_retry(&e) {
                        if attempt > 1 {
                            tracing::warn!(
                                operation = op_name,
                                attempts = attempt,
                                error = %e,
                                "Giving up after retries"
                            );
                        }
                        return Err(e);
                    }

                    if let Some(hook) = &self.on_retry {
                        hook(&e, attempt);
                    }

                    tracing::warn!(
                        operation = op_name,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = self.config.next_delay(delay);
                    attempt += 1;
                }
            }
        }
    }
}
