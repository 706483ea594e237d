//! Per-call timeout and bounded retry with exponential backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, warn};

use cronsync_core::config::ReconcileConfig;

use crate::error::BackendError;
use crate::traits::{InvokeGrant, RuleRef, RuleSpec, ScheduleBackend, TargetSpec};

const BACKOFF_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1).
    pub max_attempts: u32,
    pub call_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &ReconcileConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            call_timeout: cfg.call_timeout(),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
        }
    }

    /// Backoff before attempt `attempt + 1` (attempts counted from 1), without jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = BACKOFF_FACTOR.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * exp) as u64;
        Duration::from_millis(millis).min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Each attempt is bounded by `call_timeout`. Only transient errors and
    /// timeouts are retried.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout {
                    op,
                    after: self.call_timeout,
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.backoff_for(attempt) + jitter();
                    warn!(
                        op,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(op, attempt, error = %e, "Backend call failed, giving up");
                    return Err(e);
                }
            }
        }
    }
}

/// Jitter in [0, 100) ms taken from the clock's sub-second nanos.
fn jitter() -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    Duration::from_millis(u64::from(nanos % 100))
}

/// Wraps an adapter so every call gets the policy's timeout and retries.
pub struct RetryingBackend {
    inner: Arc<dyn ScheduleBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn ScheduleBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ScheduleBackend for RetryingBackend {
    fn region(&self) -> &str {
        self.inner.region()
    }

    async fn upsert_rule(&self, spec: &RuleSpec) -> Result<RuleRef, BackendError> {
        self.policy
            .run("PutRule", || self.inner.upsert_rule(spec))
            .await
    }

    async fn grant_invoke(&self, grant: &InvokeGrant) -> Result<(), BackendError> {
        self.policy
            .run("AddPermission", || self.inner.grant_invoke(grant))
            .await
    }

    async fn put_target(&self, target: &TargetSpec) -> Result<(), BackendError> {
        self.policy
            .run("PutTargets", || self.inner.put_target(target))
            .await
    }
}
