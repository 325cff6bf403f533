//! Automated corrective actions against job lifecycles.
//!
//! Every action either takes effect or returns [`ReflexActionFailedError`];
//! a failed suspend or cancel is never absorbed. Audit and metrics
//! reporting happen after the lifecycle lock is released, and a failing
//! audit sink does not undo an action that took effect.

use crate::config::ReflexConfig;
use crate::error::{LifecycleError, ReflexActionFailedError, Result};
use crate::lifecycle::StateChange;
use crate::registry::LifecycleRegistry;
use chrono::Utc;
use rail_types::{
    AuditEvent, AuditRecord, AuditSink, ImmunePayload, ImmuneSystem, JobId, MetricsSink,
    NoopMetrics, ReflexActionKind, Severity,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Executes suspend, throttle, alert and cancel actions.
pub struct ReflexAction {
    config: ReflexConfig,
    registry: Arc<LifecycleRegistry>,
    audit: Arc<dyn AuditSink>,
    immune: Arc<dyn ImmuneSystem>,
    metrics: Arc<dyn MetricsSink>,
}

impl ReflexAction {
    pub fn new(
        config: ReflexConfig,
        registry: Arc<LifecycleRegistry>,
        audit: Arc<dyn AuditSink>,
        immune: Arc<dyn ImmuneSystem>,
    ) -> Self {
        Self {
            config,
            registry,
            audit,
            immune,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ReflexConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        &self.registry
    }

    /// Suspend a job until its cooldown expires.
    ///
    /// `cooldown` defaults to the configured suspend cooldown.
    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn suspend(
        &self,
        job_id: &JobId,
        reason: &str,
        cooldown: Option<Duration>,
    ) -> Result<StateChange> {
        let cooldown = cooldown.unwrap_or_else(|| self.config.suspend_cooldown());
        let now = Utc::now();
        let change = self
            .registry
            .update(job_id, |lc| lc.suspend_at(reason, cooldown, now))
            .map_err(|e| self.failed(ReflexActionKind::Suspend, job_id, e))?;

        info!(
            cooldown_secs = cooldown.as_secs(),
            reason,
            "Job suspended"
        );
        self.record(job_id, ReflexActionKind::Suspend, reason, None, Some(&change))
            .await;
        Ok(change)
    }

    /// Throttle a job for a rate-reduction window.
    ///
    /// `cooldown` defaults to the configured throttle window.
    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn throttle(
        &self,
        job_id: &JobId,
        reason: &str,
        cooldown: Option<Duration>,
    ) -> Result<StateChange> {
        let cooldown = cooldown.unwrap_or_else(|| self.config.throttle_cooldown());
        let rate_factor = self.config.throttle_rate_factor;
        let now = Utc::now();
        let change = self
            .registry
            .update(job_id, |lc| lc.throttle_at(reason, cooldown, rate_factor, now))
            .map_err(|e| self.failed(ReflexActionKind::Throttle, job_id, e))?;

        info!(
            cooldown_secs = cooldown.as_secs(),
            rate_factor,
            reason,
            "Job throttled"
        );
        self.record(job_id, ReflexActionKind::Throttle, reason, None, Some(&change))
            .await;
        Ok(change)
    }

    /// Raise an alert with the immune system. The lifecycle is not changed.
    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn alert(&self, job_id: &JobId, reason: &str, severity: Severity) -> Result<()> {
        let payload = ImmunePayload::new(reason, severity, ImmunePayload::SOURCE_REFLEX)
            .with_job(job_id.clone());

        if let Err(e) = self.immune.notify(reason, payload).await {
            error!(error = %e, "Immune system rejected alert");
            return Err(ReflexActionFailedError::new(
                ReflexActionKind::Alert,
                job_id.clone(),
                format!("immune system notification failed: {}", e),
            ));
        }

        warn!(%severity, reason, "Alert raised");
        self.record(job_id, ReflexActionKind::Alert, reason, Some(severity), None)
            .await;
        Ok(())
    }

    /// Cancel a job. CANCELLED is terminal.
    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn cancel(&self, job_id: &JobId, reason: &str) -> Result<StateChange> {
        let change = self
            .registry
            .update(job_id, |lc| lc.cancel(reason))
            .map_err(|e| self.failed(ReflexActionKind::Cancel, job_id, e))?;

        info!(reason, "Job cancelled");
        self.record(job_id, ReflexActionKind::Cancel, reason, None, Some(&change))
            .await;
        Ok(change)
    }

    fn failed(
        &self,
        action: ReflexActionKind,
        job_id: &JobId,
        cause: LifecycleError,
    ) -> ReflexActionFailedError {
        error!(action = %action, error = %cause, "Reflex action failed");
        ReflexActionFailedError::new(action, job_id.clone(), cause.to_string())
    }

    async fn record(
        &self,
        job_id: &JobId,
        action: ReflexActionKind,
        reason: &str,
        severity: Option<Severity>,
        change: Option<&StateChange>,
    ) {
        self.metrics.record_reflex_action(action);

        if let Some(change) = change {
            self.emit(AuditEvent::LifecycleTransition {
                job_id: job_id.clone(),
                from: change.from,
                to: change.to,
                reason: change.reason.clone(),
            })
            .await;
        }
        self.emit(AuditEvent::ReflexAction {
            job_id: job_id.clone(),
            action,
            reason: reason.to_string(),
            severity,
        })
        .await;
    }

    async fn emit(&self, event: AuditEvent) {
        let kind = event.kind();
        if let Err(e) = self.audit.emit(AuditRecord::new(event)).await {
            warn!(event = kind, error = %e, "Failed to emit audit event");
        }
    }
}

impl std::fmt::Debug for ReflexAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflexAction")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}
