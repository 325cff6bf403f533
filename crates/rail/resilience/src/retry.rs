//! Budget-bounded retries with exponential backoff.
//!
//! `max_retries` bounds the retries after the first attempt, so a task that
//! keeps failing runs `max_retries + 1` times. Only retriable failures are
//! retried; anything else propagates on the attempt that produced it. The
//! backoff sleep is the only suspension point besides the task itself and
//! both observe the caller's [`CancellationToken`].

use crate::config::RetryConfig;
use crate::error::{BudgetRetryExhaustedError, RetryAttemptRecord, RetryError};
use rail_types::{
    Budget, ClassifiedError, ImmunePayload, ImmuneSystem, JobContext, JobId, MetricsSink,
    NoopMetrics,
};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What a retry loop is working on, for logs and notifications
#[derive(Debug, Clone, Default)]
pub struct RetryScope {
    pub job_id: Option<JobId>,
    pub operation: String,
}

impl RetryScope {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            job_id: None,
            operation: operation.into(),
        }
    }

    pub fn for_job(ctx: &JobContext) -> Self {
        Self {
            job_id: Some(ctx.job_id.clone()),
            operation: ctx.job_type.clone(),
        }
    }
}

/// Executes tasks under a retry budget.
pub struct RetryHandler {
    config: RetryConfig,
    metrics: Arc<dyn MetricsSink>,
    immune: Option<Arc<dyn ImmuneSystem>>,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(NoopMetrics),
            immune: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Notify `immune` when exhaustion carries an alert.
    pub fn with_immune_system(mut self, immune: Arc<dyn ImmuneSystem>) -> Self {
        self.immune = Some(immune);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `attempt + 1`, without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms as f64;
        let max = self.config.max_delay_ms as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = base * self.config.exponential_base.powi(exponent);

        let capped = if raw.is_finite() { raw.min(max) } else { max };
        Duration::from_millis(capped.max(0.0).round() as u64)
    }

    /// Backoff delay with jitter applied when enabled.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if !self.config.jitter {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.5..=1.5);
        delay.mul_f64(factor)
    }

    /// Run `task` with the budget's `max_retries`.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        scope: &RetryScope,
        budget: &Budget,
        cancel: &CancellationToken,
        task: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        self.execute_with_retries(scope, budget.max_retries, cancel, task)
            .await
    }

    /// Run `task` with the configured default retry count.
    pub async fn execute<T, E, F, Fut>(
        &self,
        scope: &RetryScope,
        cancel: &CancellationToken,
        task: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        self.execute_with_retries(scope, self.config.default_max_retries, cancel, task)
            .await
    }

    pub async fn execute_with_retries<T, E, F, Fut>(
        &self,
        scope: &RetryScope,
        max_retries: u32,
        cancel: &CancellationToken,
        mut task: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        let started = Instant::now();
        let mut history: Vec<RetryAttemptRecord> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    history,
                });
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = task() => Some(result),
            };

            let err = match outcome {
                None => {
                    debug!(operation = %scope.operation, attempt, "Retry loop cancelled during attempt");
                    return Err(RetryError::Cancelled {
                        attempts: attempt + 1,
                        history,
                    });
                }
                Some(Ok(value)) => {
                    if attempt > 0 {
                        debug!(operation = %scope.operation, attempt, "Task succeeded after retry");
                    }
                    return Ok(value);
                }
                Some(Err(e)) => e,
            };

            if err.is_cancellation() {
                return Err(RetryError::Cancelled {
                    attempts: attempt + 1,
                    history,
                });
            }

            let retriable = err.is_retriable();
            history.push(RetryAttemptRecord {
                attempt,
                error: err.to_string(),
                error_type: err.error_type(),
                retriable,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });

            if !retriable {
                debug!(
                    operation = %scope.operation,
                    attempt,
                    error = %err,
                    "Non-retriable failure, not retrying"
                );
                return Err(RetryError::NonRetriable {
                    attempt,
                    source: err,
                    history,
                });
            }

            if attempt >= max_retries {
                return Err(self.exhausted(scope, max_retries, err, history).await);
            }

            let delay = self.compute_delay(attempt);
            self.metrics.record_retry(&err.error_type());
            warn!(
                operation = %scope.operation,
                job_id = ?scope.job_id,
                attempt = attempt + 1,
                max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retriable failure, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(operation = %scope.operation, attempt, "Retry loop cancelled during backoff");
                    return Err(RetryError::Cancelled {
                        attempts: attempt + 1,
                        history,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    async fn exhausted<E: ClassifiedError>(
        &self,
        scope: &RetryScope,
        max_retries: u32,
        last: E,
        history: Vec<RetryAttemptRecord>,
    ) -> RetryError<E> {
        let error = BudgetRetryExhaustedError {
            max_retries,
            attempts: history.len() as u32,
            last_error: last.to_string(),
            last_error_code: last.error_code(),
            history,
            immune_alert: last.should_alert_immune(),
        };

        error!(
            operation = %scope.operation,
            job_id = ?scope.job_id,
            attempts = error.attempts,
            last_error = %error.last_error,
            "Retry budget exhausted"
        );
        self.metrics.record_retry_exhausted();

        if error.immune_alert {
            if let Some(immune) = &self.immune {
                let mut payload = ImmunePayload::new(
                    error.to_string(),
                    last.severity(),
                    ImmunePayload::SOURCE_RETRY,
                )
                .with_details(serde_json::json!({
                    "operation": scope.operation,
                    "attempts": error.attempts,
                    "max_retries": max_retries,
                    "last_error_type": last.error_type(),
                }));
                if let Some(job_id) = &scope.job_id {
                    payload = payload.with_job(job_id.clone());
                }
                if let Err(e) = immune.notify("retry_exhausted", payload).await {
                    warn!(error = %e, "Failed to notify immune system of retry exhaustion");
                }
            }
        }

        RetryError::Exhausted { error, last }
    }
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl std::fmt::Debug for RetryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHandler")
            .field("config", &self.config)
            .field("immune", &self.immune.is_some())
            .finish()
    }
}
