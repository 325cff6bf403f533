//! Governance runtime
//!
//! Composes the decision engine, shadow evaluation and the enforcement
//! primitives into a job executor. For each job: decide against the active
//! manifest, feed the shadow engine, then run the job either directly or
//! under the decision's budget, its circuit breaker and the retry handler.
//! Enforcement outcomes drive reflex actions on the job's lifecycle.

use crate::audit::TracingAuditSink;
use crate::config::GovernanceConfig;
use crate::error::{AttemptError, ExecutionError, Result, RuntimeError};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rail_decision::DecisionEvaluator;
use rail_manifest::{Manifest, ManifestHistory};
use rail_reflex::{LifecycleRegistry, ReflexAction, StateChange};
use rail_resilience::{
    CancellationToken, CircuitBreaker, CircuitBreakerRegistry, CircuitError, RetryError,
    RetryHandler, RetryScope,
};
use rail_shadow::{ShadowReport, ShadowSnapshot, ShadowingEngine};
use rail_types::{
    AuditEvent, AuditRecord, AuditSink, ClassifiedError, Decision, ImmuneSystem, JobContext,
    JobId, JobState, MetricsSink, NoopImmuneSystem, NoopMetrics,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A job that ran to completion
#[derive(Debug, Clone)]
pub struct JobOutcome<T> {
    pub value: T,

    /// The decision the job ran under
    pub decision: Decision,
}

/// Builder for [`GovernanceRuntime`]
pub struct GovernanceRuntimeBuilder {
    config: GovernanceConfig,
    manifest: Option<Manifest>,
    audit: Option<Arc<dyn AuditSink>>,
    immune: Option<Arc<dyn ImmuneSystem>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl GovernanceRuntimeBuilder {
    /// Use `manifest` instead of the one named by the configuration
    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn immune_system(mut self, immune: Arc<dyn ImmuneSystem>) -> Self {
        self.immune = Some(immune);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<GovernanceRuntime> {
        let manifest = match self.manifest {
            Some(manifest) => manifest,
            None => self.config.load_manifest()?,
        };
        let manifest = Arc::new(manifest);

        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditSink) as Arc<dyn AuditSink>);
        let immune = self
            .immune
            .unwrap_or_else(|| Arc::new(NoopImmuneSystem) as Arc<dyn ImmuneSystem>);
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoopMetrics) as Arc<dyn MetricsSink>);

        let mut history = ManifestHistory::new(self.config.manifest.enforce_hash_chain);
        history.append(manifest.clone())?;

        let retry = RetryHandler::new(self.config.retry.clone())
            .with_metrics(metrics.clone())
            .with_immune_system(immune.clone());
        let breakers = CircuitBreakerRegistry::new(self.config.circuit_breaker.clone())
            .with_metrics(metrics.clone());
        let lifecycles = Arc::new(LifecycleRegistry::new());
        let reflex = ReflexAction::new(
            self.config.reflex.clone(),
            lifecycles.clone(),
            audit.clone(),
            immune,
        )
        .with_metrics(metrics.clone());

        info!(
            version = manifest.version(),
            hash = manifest.hash_self(),
            rules = manifest.rules().len(),
            "Governance runtime ready"
        );

        Ok(GovernanceRuntime {
            config: self.config,
            active: RwLock::new(Arc::new(DecisionEvaluator::new(manifest))),
            shadow: RwLock::new(None),
            history: Mutex::new(history),
            retry,
            breakers,
            lifecycles,
            reflex,
            audit,
            metrics,
        })
    }
}

/// Governed job executor.
pub struct GovernanceRuntime {
    config: GovernanceConfig,
    active: RwLock<Arc<DecisionEvaluator>>,
    shadow: RwLock<Option<Arc<ShadowingEngine>>>,
    history: Mutex<ManifestHistory>,
    retry: RetryHandler,
    breakers: CircuitBreakerRegistry,
    lifecycles: Arc<LifecycleRegistry>,
    reflex: ReflexAction,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<dyn MetricsSink>,
}

impl GovernanceRuntime {
    pub fn builder(config: GovernanceConfig) -> GovernanceRuntimeBuilder {
        GovernanceRuntimeBuilder {
            config,
            manifest: None,
            audit: None,
            immune: None,
            metrics: None,
        }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn active_manifest(&self) -> Arc<Manifest> {
        self.active.read().manifest().clone()
    }

    /// Every manifest activated so far, oldest first
    pub fn manifest_history(&self) -> Vec<Arc<Manifest>> {
        self.history.lock().entries().to_vec()
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn lifecycles(&self) -> &Arc<LifecycleRegistry> {
        &self.lifecycles
    }

    pub fn reflex(&self) -> &ReflexAction {
        &self.reflex
    }

    /// Evaluate a job against the active manifest.
    ///
    /// When a shadow run is in progress the candidate manifest sees the same
    /// context; its verdict never affects the returned decision.
    #[instrument(skip(self, ctx), fields(job_id = %ctx.job_id, job_type = %ctx.job_type))]
    pub async fn decide(&self, ctx: &JobContext) -> Decision {
        let evaluator = self.active.read().clone();
        let decision = evaluator.evaluate(ctx, false);
        self.metrics.record_decision(decision.mode, false);

        self.emit(AuditEvent::Decision {
            mission_id: ctx.mission_id.clone(),
            job_id: ctx.job_id.clone(),
            decision: decision.clone(),
        })
        .await;

        let shadow = self.shadow.read().clone();
        if let Some(engine) = shadow {
            let comparison = engine.observe(ctx, &decision);
            self.metrics.record_decision(comparison.shadow_mode, true);
            self.emit(AuditEvent::ShadowComparison { comparison }).await;
        }

        decision
    }

    /// Decide and run a job.
    ///
    /// `circuit_id` names the external dependency the job calls, if any.
    /// `task` is invoked once per attempt.
    #[instrument(skip(self, ctx, cancel, task), fields(job_id = %ctx.job_id, job_type = %ctx.job_type))]
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &JobContext,
        circuit_id: Option<&str>,
        cancel: &CancellationToken,
        mut task: F,
    ) -> std::result::Result<JobOutcome<T>, ExecutionError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: ClassifiedError,
    {
        let decision = self.decide(ctx).await;

        if !decision.is_governed() {
            debug!("Running job directly");
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExecutionError::Cancelled { attempts: 0 }),
                result = task() => result,
            };
            return match result {
                Ok(value) => Ok(JobOutcome { value, decision }),
                Err(e) if e.is_cancellation() => Err(ExecutionError::Cancelled { attempts: 1 }),
                Err(e) => Err(ExecutionError::Task(e)),
            };
        }

        self.admit(ctx, &decision).await?;

        let breaker = circuit_id.map(|id| self.breakers.get_or_create(id));
        let timeout_ms = decision.budget.timeout_ms;
        let scope = RetryScope::for_job(ctx);

        let task = Mutex::new(task);
        let (task, breaker_ref) = (&task, breaker.as_deref());
        let result = self
            .retry
            .execute_with_retry(&scope, &decision.budget, cancel, move || {
                run_attempt(task, breaker_ref, timeout_ms)
            })
            .await;

        let job_id = &ctx.job_id;
        match result {
            Ok(value) => {
                self.finish(job_id).await;
                Ok(JobOutcome { value, decision })
            }
            Err(RetryError::Cancelled { attempts, .. }) => {
                info!(attempts, "Job cancelled, lifecycle left in place");
                Err(ExecutionError::Cancelled { attempts })
            }
            Err(RetryError::Exhausted { error, last }) => {
                self.emit(AuditEvent::RetryExhausted {
                    job_id: job_id.clone(),
                    attempts: error.attempts,
                    max_retries: error.max_retries,
                    last_error: error.last_error.clone(),
                })
                .await;

                let reason = error.to_string();
                self.reflex
                    .suspend(job_id, &reason, None)
                    .await
                    .map_err(|source| ExecutionError::Reflex {
                        source,
                        cause: reason.clone(),
                    })?;
                Err(ExecutionError::RetryExhausted { error, last })
            }
            Err(RetryError::NonRetriable {
                source: AttemptError::CircuitOpen(open),
                ..
            }) => {
                self.emit(AuditEvent::CircuitRejected {
                    job_id: job_id.clone(),
                    circuit_id: open.circuit_id.clone(),
                    state: open.state,
                    failure_count: open.failure_count,
                })
                .await;

                let reason = open.to_string();
                self.reflex
                    .throttle(job_id, &reason, None)
                    .await
                    .map_err(|source| ExecutionError::Reflex {
                        source,
                        cause: reason.clone(),
                    })?;
                Err(ExecutionError::CircuitOpen(open))
            }
            Err(RetryError::NonRetriable { source, .. }) => {
                let reason = source.to_string();
                self.reflex
                    .cancel(job_id, &reason)
                    .await
                    .map_err(|e| ExecutionError::Reflex {
                        source: e,
                        cause: reason.clone(),
                    })?;

                if source.should_alert_immune() {
                    self.reflex
                        .alert(job_id, &reason, source.severity())
                        .await
                        .map_err(|e| ExecutionError::Reflex {
                            source: e,
                            cause: reason.clone(),
                        })?;
                }
                Err(source.into())
            }
        }
    }

    /// Make sure the job's lifecycle lets it run.
    async fn admit<E>(
        &self,
        ctx: &JobContext,
        decision: &Decision,
    ) -> std::result::Result<(), ExecutionError<E>> {
        let job_id = &ctx.job_id;
        let lifecycle = self.lifecycles.start(job_id);
        let needs_approval = decision.require_approval && !ctx.approval_granted;

        let (changes, suspended_until) = {
            let mut lc = lifecycle.lock();
            let mut changes: Vec<StateChange> = Vec::new();

            if let Some(change) = lc.resume_if_due(Utc::now()) {
                changes.push(change);
            }

            match lc.state() {
                JobState::Blocked if !needs_approval => {
                    if let Ok(change) = lc.resume("approval granted") {
                        changes.push(change);
                    }
                }
                JobState::Running | JobState::Throttled if needs_approval => {
                    if let Ok(change) = lc.block("approval required") {
                        changes.push(change);
                    }
                }
                JobState::Suspended if needs_approval => {
                    if let Ok(change) = lc.block("approval required") {
                        changes.push(change);
                    }
                }
                _ => {}
            }

            let suspended_until = match lc.state() {
                JobState::Suspended => lc.cooldown_until(),
                _ => None,
            };
            (changes, suspended_until)
        };

        for change in changes {
            self.emit(AuditEvent::LifecycleTransition {
                job_id: job_id.clone(),
                from: change.from,
                to: change.to,
                reason: change.reason,
            })
            .await;
        }

        if needs_approval {
            warn!(risk_class = ?decision.risk_class, "Job blocked pending approval");
            return Err(ExecutionError::ApprovalRequired {
                job_id: job_id.clone(),
                risk_class: decision.risk_class.clone(),
            });
        }
        if let Some(until) = suspended_until {
            debug!(%until, "Job still suspended");
            return Err(ExecutionError::Suspended {
                job_id: job_id.clone(),
                until,
            });
        }
        Ok(())
    }

    async fn finish(&self, job_id: &JobId) {
        match self.lifecycles.update(job_id, |lc| lc.complete()) {
            Ok(change) => {
                self.emit(AuditEvent::LifecycleTransition {
                    job_id: job_id.clone(),
                    from: change.from,
                    to: change.to,
                    reason: change.reason,
                })
                .await;
            }
            Err(e) => warn!(error = %e, "Could not complete job lifecycle"),
        }
    }

    /// Start evaluating `candidate` alongside the active manifest.
    ///
    /// Replaces any shadow run already in progress.
    pub fn start_shadow(&self, candidate: Manifest) -> Arc<ShadowingEngine> {
        let engine = Arc::new(
            ShadowingEngine::new(
                self.active_manifest(),
                Arc::new(candidate),
                self.config.shadow.clone(),
            )
            .with_metrics(self.metrics.clone()),
        );
        info!(
            version = engine.shadow_manifest().version(),
            hash = engine.shadow_manifest().hash_self(),
            "Shadow run started"
        );
        *self.shadow.write() = Some(engine.clone());
        engine
    }

    /// Stop the shadow run, returning its final report
    pub fn stop_shadow(&self) -> Option<ShadowReport> {
        self.shadow
            .write()
            .take()
            .map(|engine| engine.generate_report())
    }

    pub fn shadow_report(&self) -> Option<ShadowReport> {
        let engine = self.shadow.read().clone();
        engine.map(|engine| engine.generate_report())
    }

    /// Counters of the running shadow evaluation, without a gate check
    pub fn shadow_snapshot(&self) -> Option<ShadowSnapshot> {
        let engine = self.shadow.read().clone();
        engine.map(|engine| engine.snapshot())
    }

    /// Activate the shadow manifest if its report passes the activation gate.
    pub async fn promote_shadow(&self) -> Result<Arc<Manifest>> {
        let engine = self.shadow.read().clone().ok_or(RuntimeError::NoShadow)?;
        let report = engine.generate_report();
        if !report.safe_to_activate {
            info!(reason = %report.activation_gate_reason, "Shadow manifest not promoted");
            return Err(RuntimeError::GateNotPassed {
                reason: report.activation_gate_reason,
            });
        }

        let candidate = engine.shadow_manifest().clone();
        self.install(candidate.clone())?;

        self.emit(AuditEvent::ShadowPromoted {
            version: candidate.version().to_string(),
            hash_self: candidate.hash_self().to_string(),
            evaluation_count: report.evaluation_count,
        })
        .await;
        self.emit_activated(&candidate).await;
        Ok(candidate)
    }

    /// Make `manifest` the active policy without a shadow run.
    pub async fn activate(&self, manifest: Manifest) -> Result<Arc<Manifest>> {
        let manifest = Arc::new(manifest);
        self.install(manifest.clone())?;
        self.emit_activated(&manifest).await;
        Ok(manifest)
    }

    fn install(&self, manifest: Arc<Manifest>) -> Result<()> {
        self.history.lock().append(manifest.clone())?;
        *self.active.write() = Arc::new(DecisionEvaluator::new(manifest.clone()));

        if self.shadow.write().take().is_some() {
            debug!("Shadow run ended by activation");
        }
        info!(
            version = manifest.version(),
            hash = manifest.hash_self(),
            "Manifest activated"
        );
        Ok(())
    }

    async fn emit_activated(&self, manifest: &Manifest) {
        self.emit(AuditEvent::ManifestActivated {
            version: manifest.version().to_string(),
            hash_self: manifest.hash_self().to_string(),
            hash_prev: manifest.hash_prev().map(str::to_string),
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

impl std::fmt::Debug for GovernanceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.active_manifest();
        f.debug_struct("GovernanceRuntime")
            .field("active_version", &active.version())
            .field("shadow", &self.shadow.read().is_some())
            .field("breakers", &self.breakers.len())
            .field("lifecycles", &self.lifecycles.len())
            .finish()
    }
}

/// One attempt: the job under its timeout, through the breaker if any.
/// One attempt of a governed job.
///
/// `task` is only invoked once the breaker has admitted the call. The lock
/// is held while the closure builds its future, never across an await.
async fn run_attempt<T, E, F, Fut>(
    task: &Mutex<F>,
    breaker: Option<&CircuitBreaker>,
    timeout_ms: u64,
) -> std::result::Result<T, AttemptError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ClassifiedError,
{
    let start = || {
        let attempt = {
            let mut task = task.lock();
            (*task)()
        };
        with_timeout(attempt, timeout_ms)
    };
    match breaker {
        None => start().await,
        Some(breaker) => breaker
            .call(start)
            .await
            .map_err(|e| match e {
                CircuitError::Open(open) => AttemptError::CircuitOpen(open),
                CircuitError::Inner(inner) => inner,
            }),
    }
}

async fn with_timeout<T, E, Fut>(
    attempt: Fut,
    timeout_ms: u64,
) -> std::result::Result<T, AttemptError<E>>
where
    Fut: Future<Output = std::result::Result<T, E>>,
{
    if timeout_ms == 0 {
        return attempt.await.map_err(AttemptError::Task);
    }
    match tokio::time::timeout(Duration::from_millis(timeout_ms), attempt).await {
        Ok(result) => result.map_err(AttemptError::Task),
        Err(_) => Err(AttemptError::Timeout { timeout_ms }),
    }
}
