//! Decision evaluator
//!
//! Rules are scanned in ascending priority (ties keep declaration order).
//! The first enabled rule whose condition matches decides the outcome;
//! every matching rule is still recorded in `triggered_rules`. When nothing
//! matches the job runs DIRECT with the manifest's default budget.

use crate::budget::{effective_risk_class, resolve_budget};
use rail_manifest::{Manifest, ManifestRule};
use rail_types::{Decision, ExecutionMode, JobContext};
use std::sync::Arc;
use tracing::debug;

/// Reason recorded when no rule matched
pub const FALLBACK_REASON: &str = "no rule matched; defaulting to DIRECT";

/// Evaluate a manifest against a job context.
///
/// Pure: identical inputs always produce identical decisions.
pub fn evaluate(manifest: &Manifest, ctx: &JobContext, shadow: bool) -> Decision {
    let risk_name = effective_risk_class(manifest, ctx);

    let mut selected: Option<&ManifestRule> = None;
    let mut triggered_rules = Vec::new();
    for rule in manifest.evaluation_order() {
        if rule.condition.matches(ctx, risk_name) {
            triggered_rules.push(rule.rule_id.clone());
            if selected.is_none() {
                selected = Some(rule);
            }
        }
    }

    let Some(rule) = selected else {
        return Decision {
            mode: ExecutionMode::Direct,
            budget: *manifest.budget_defaults(),
            triggered_rules,
            selected_rule: None,
            reason: FALLBACK_REASON.to_string(),
            risk_class: risk_name.map(str::to_string),
            recovery_strategy: None,
            require_approval: false,
            manifest_version: manifest.version().to_string(),
            manifest_hash: manifest.hash_self().to_string(),
            shadow,
        };
    };

    let risk_class = risk_name.and_then(|name| manifest.risk_class(name));
    let budget = resolve_budget(manifest, rule, risk_class, &ctx.job_type);

    Decision {
        mode: rule.mode,
        budget,
        triggered_rules,
        selected_rule: Some(rule.rule_id.clone()),
        reason: rule.reason.clone(),
        risk_class: risk_name.map(str::to_string),
        recovery_strategy: rule
            .recovery_strategy
            .clone()
            .or_else(|| risk_class.and_then(|c| c.recovery_strategy.clone())),
        require_approval: risk_class.map(|c| c.require_approval).unwrap_or(false),
        manifest_version: manifest.version().to_string(),
        manifest_hash: manifest.hash_self().to_string(),
        shadow,
    }
}

/// Evaluator bound to one manifest
#[derive(Debug, Clone)]
pub struct DecisionEvaluator {
    manifest: Arc<Manifest>,
}

impl DecisionEvaluator {
    pub fn new(manifest: Arc<Manifest>) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    /// Produce the decision for a context.
    pub fn evaluate(&self, ctx: &JobContext, shadow: bool) -> Decision {
        let decision = evaluate(&self.manifest, ctx, shadow);
        debug!(
            job_id = %ctx.job_id,
            job_type = %ctx.job_type,
            mode = %decision.mode,
            rule = ?decision.selected_rule,
            manifest = %decision.manifest_version,
            shadow,
            "Decision evaluated"
        );
        decision
    }
}

impl From<Manifest> for DecisionEvaluator {
    fn from(manifest: Manifest) -> Self {
        Self::new(Arc::new(manifest))
    }
}
