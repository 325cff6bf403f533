//! Shadowing engine
//!
//! Evaluates every context against both the active and a candidate
//! manifest. Production traffic is never affected: the active decision is
//! what the caller acts on, the shadow decision only feeds the statistics.
//! Counters live behind a single mutex because shadow evaluation runs on
//! the same hot path as every live decision.

use crate::gate::{ActivationGate, GateInput};
use crate::report::{rate, ShadowReport, ShadowSnapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rail_decision::DecisionEvaluator;
use rail_manifest::Manifest;
use rail_types::{
    Decision, ImpactAssessment, JobContext, MetricsSink, NoopMetrics, ShadowDecisionComparison,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Shadow engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub gate: ActivationGate,

    /// Number of comparisons kept as samples
    pub sample_capacity: usize,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            gate: ActivationGate::default(),
            sample_capacity: 100,
        }
    }
}

#[derive(Debug)]
struct ShadowState {
    started_at: DateTime<Utc>,
    evaluation_count: u64,
    mode_divergence_count: u64,
    budget_divergence_count: u64,
    would_have_blocked: u64,
    active_rule_trigger_counts: BTreeMap<String, u64>,
    shadow_rule_trigger_counts: BTreeMap<String, u64>,
    samples: Vec<ShadowDecisionComparison>,
}

impl ShadowState {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            evaluation_count: 0,
            mode_divergence_count: 0,
            budget_divergence_count: 0,
            would_have_blocked: 0,
            active_rule_trigger_counts: BTreeMap::new(),
            shadow_rule_trigger_counts: BTreeMap::new(),
            samples: Vec::new(),
        }
    }
}

/// Runs a candidate manifest alongside the active one
pub struct ShadowingEngine {
    active: DecisionEvaluator,
    shadow: DecisionEvaluator,
    config: ShadowConfig,
    state: Mutex<ShadowState>,
    metrics: Arc<dyn MetricsSink>,
}

impl ShadowingEngine {
    pub fn new(active: Arc<Manifest>, shadow: Arc<Manifest>, config: ShadowConfig) -> Self {
        Self::started_at(active, shadow, config, Utc::now())
    }

    /// Create an engine whose shadow period began at `started_at`.
    pub fn started_at(
        active: Arc<Manifest>,
        shadow: Arc<Manifest>,
        config: ShadowConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        info!(
            active = %active.version(),
            shadow = %shadow.version(),
            "Shadow evaluation started"
        );
        Self {
            active: DecisionEvaluator::new(active),
            shadow: DecisionEvaluator::new(shadow),
            config,
            state: Mutex::new(ShadowState::new(started_at)),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report divergence rates to a metrics sink on every report
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn active_manifest(&self) -> &Arc<Manifest> {
        self.active.manifest()
    }

    pub fn shadow_manifest(&self) -> &Arc<Manifest> {
        self.shadow.manifest()
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Evaluate a context against both manifests and record the comparison.
    pub fn evaluate_shadow(&self, ctx: &JobContext) -> ShadowDecisionComparison {
        let active = self.active.evaluate(ctx, false);
        self.observe(ctx, &active)
    }

    /// Record a comparison against an active decision the caller already
    /// holds, evaluating only the shadow manifest.
    pub fn observe(&self, ctx: &JobContext, active: &Decision) -> ShadowDecisionComparison {
        let shadow = self.shadow.evaluate(ctx, true);
        let comparison =
            ShadowDecisionComparison::between(ctx.job_id.clone(), &ctx.job_type, active, &shadow);

        if comparison.impact_assessment != ImpactAssessment::NoDifference {
            debug!(
                job_id = %ctx.job_id,
                job_type = %ctx.job_type,
                active_mode = %comparison.active_mode,
                shadow_mode = %comparison.shadow_mode,
                impact = %comparison.impact_assessment,
                "Shadow decision diverges"
            );
        }

        let mut state = self.state.lock();
        state.evaluation_count += 1;
        if comparison.mode_delta {
            state.mode_divergence_count += 1;
        }
        if comparison.budget_delta {
            state.budget_divergence_count += 1;
        }
        if comparison.would_have_blocked() {
            state.would_have_blocked += 1;
        }
        for rule_id in &active.triggered_rules {
            *state
                .active_rule_trigger_counts
                .entry(rule_id.clone())
                .or_insert(0) += 1;
        }
        for rule_id in &shadow.triggered_rules {
            *state
                .shadow_rule_trigger_counts
                .entry(rule_id.clone())
                .or_insert(0) += 1;
        }
        // First N are kept; later comparisons only update the counters
        if state.samples.len() < self.config.sample_capacity {
            state.samples.push(comparison.clone());
        }

        comparison
    }

    pub fn evaluation_count(&self) -> u64 {
        self.state.lock().evaluation_count
    }

    /// Current counters and rates.
    ///
    /// Unlike [`generate_report`](Self::generate_report) this skips the
    /// activation gate and records nothing to the metrics sink.
    pub fn snapshot(&self) -> ShadowSnapshot {
        let state = self.state.lock();
        ShadowSnapshot {
            started_at: state.started_at,
            evaluation_count: state.evaluation_count,
            mode_divergence_count: state.mode_divergence_count,
            mode_divergence_rate: rate(state.mode_divergence_count, state.evaluation_count),
            budget_divergence_count: state.budget_divergence_count,
            budget_divergence_rate: rate(state.budget_divergence_count, state.evaluation_count),
            would_have_blocked: state.would_have_blocked,
            explosion_rate: rate(state.would_have_blocked, state.evaluation_count),
            samples_kept: state.samples.len(),
        }
    }

    pub fn generate_report(&self) -> ShadowReport {
        self.generate_report_at(Utc::now())
    }

    /// Build the report as of `now`.
    pub fn generate_report_at(&self, now: DateTime<Utc>) -> ShadowReport {
        let state = self.state.lock();

        let elapsed_hours = (now - state.started_at).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let mode_divergence_rate = rate(state.mode_divergence_count, state.evaluation_count);
        let budget_divergence_rate = rate(state.budget_divergence_count, state.evaluation_count);
        let explosion_rate = rate(state.would_have_blocked, state.evaluation_count);

        let verdict = self.config.gate.check(&GateInput {
            evaluation_count: state.evaluation_count,
            elapsed_hours,
            mode_divergence_rate,
            explosion_rate,
        });

        let active = self.active.manifest();
        let shadow = self.shadow.manifest();
        let report = ShadowReport {
            active_version: active.version().to_string(),
            active_hash: active.hash_self().to_string(),
            shadow_version: shadow.version().to_string(),
            shadow_hash: shadow.hash_self().to_string(),
            started_at: state.started_at,
            generated_at: now,
            elapsed_hours,
            evaluation_count: state.evaluation_count,
            mode_divergence_count: state.mode_divergence_count,
            mode_divergence_rate,
            budget_divergence_count: state.budget_divergence_count,
            budget_divergence_rate,
            would_have_blocked: state.would_have_blocked,
            explosion_rate,
            rule_trigger_counts: state.shadow_rule_trigger_counts.clone(),
            active_rule_trigger_counts: state.active_rule_trigger_counts.clone(),
            safe_to_activate: verdict.safe_to_activate,
            activation_gate_reason: verdict.reason,
            samples: state.samples.clone(),
        };
        drop(state);

        self.metrics
            .record_shadow_rates(report.mode_divergence_rate, report.explosion_rate);
        info!(
            shadow = %report.shadow_version,
            evaluations = report.evaluation_count,
            safe_to_activate = report.safe_to_activate,
            reason = %report.activation_gate_reason,
            "Shadow report generated"
        );

        report
    }

    /// Discard every statistic and restart the shadow period now.
    pub fn reset(&self) {
        self.reset_at(Utc::now());
    }

    pub fn reset_at(&self, started_at: DateTime<Utc>) {
        *self.state.lock() = ShadowState::new(started_at);
        info!(shadow = %self.shadow.manifest().version(), "Shadow statistics reset");
    }
}

impl std::fmt::Debug for ShadowingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowingEngine")
            .field("active", &self.active.manifest().version())
            .field("shadow", &self.shadow.manifest().version())
            .field("config", &self.config)
            .finish()
    }
}
