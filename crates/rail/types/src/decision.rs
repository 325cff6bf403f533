//! Governance decisions
//!
//! A [`Decision`] is the pure output of evaluating one manifest against one
//! job context. Shadow evaluation compares two decisions for the same
//! context and records the difference as a [`ShadowDecisionComparison`].

use crate::budget::Budget;
use crate::ids::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a job is allowed to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Runs without governance overhead
    #[serde(rename = "DIRECT")]
    Direct,

    /// Runs under budget, retry and circuit enforcement
    #[serde(rename = "RAIL")]
    Rail,
}

impl ExecutionMode {
    pub fn is_governed(&self) -> bool {
        matches!(self, ExecutionMode::Rail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Direct => "DIRECT",
            ExecutionMode::Rail => "RAIL",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved governance decision for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Execution mode
    pub mode: ExecutionMode,

    /// Budget after risk multiplier and job-type override
    pub budget: Budget,

    /// Every enabled rule whose condition matched, in evaluation order
    pub triggered_rules: Vec<String>,

    /// Rule that decided the outcome; `None` when the fallback applied
    pub selected_rule: Option<String>,

    /// Human-readable reason from the selected rule
    pub reason: String,

    /// Risk class the job was evaluated under
    pub risk_class: Option<String>,

    /// Recovery strategy to apply on failure
    pub recovery_strategy: Option<String>,

    /// Whether the risk class requires a human approval
    pub require_approval: bool,

    /// Version of the manifest that produced this decision
    pub manifest_version: String,

    /// Content hash of the manifest that produced this decision
    pub manifest_hash: String,

    /// Whether this decision came from a shadow evaluation
    pub shadow: bool,
}

impl Decision {
    pub fn is_governed(&self) -> bool {
        self.mode.is_governed()
    }

    /// Whether no rule matched and the fallback applied
    pub fn is_fallback(&self) -> bool {
        self.selected_rule.is_none()
    }
}

/// Classification of how a shadow decision differs from the active one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactAssessment {
    NoDifference,
    WouldEnforceGovernance,
    WouldSkipGovernance,
    BudgetLimitsWouldChange,
    MinorDifference,
}

impl ImpactAssessment {
    /// Classify the difference between an active and a shadow decision.
    pub fn classify(active: &Decision, shadow: &Decision) -> Self {
        match (active.mode, shadow.mode) {
            (ExecutionMode::Direct, ExecutionMode::Rail) => Self::WouldEnforceGovernance,
            (ExecutionMode::Rail, ExecutionMode::Direct) => Self::WouldSkipGovernance,
            _ if active.budget != shadow.budget => Self::BudgetLimitsWouldChange,
            _ if active.selected_rule != shadow.selected_rule
                || active.triggered_rules != shadow.triggered_rules =>
            {
                Self::MinorDifference
            }
            _ => Self::NoDifference,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::NoDifference => "no difference",
            Self::WouldEnforceGovernance => "shadow would enforce governance (currently direct)",
            Self::WouldSkipGovernance => "shadow would skip governance (currently enforced)",
            Self::BudgetLimitsWouldChange => "budget limits would change",
            Self::MinorDifference => "minor difference",
        }
    }
}

impl fmt::Display for ImpactAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Per-evaluation comparison between the active and the shadow manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowDecisionComparison {
    pub job_id: JobId,
    pub job_type: String,
    pub active_mode: ExecutionMode,
    pub shadow_mode: ExecutionMode,
    pub active_budget: Budget,
    pub shadow_budget: Budget,
    pub mode_delta: bool,
    pub budget_delta: bool,
    pub active_rules: Vec<String>,
    pub shadow_rules: Vec<String>,
    pub impact_assessment: ImpactAssessment,
}

impl ShadowDecisionComparison {
    /// Build the comparison record for one context.
    pub fn between(job_id: JobId, job_type: &str, active: &Decision, shadow: &Decision) -> Self {
        Self {
            job_id,
            job_type: job_type.to_string(),
            active_mode: active.mode,
            shadow_mode: shadow.mode,
            active_budget: active.budget,
            shadow_budget: shadow.budget,
            mode_delta: active.mode != shadow.mode,
            budget_delta: active.budget != shadow.budget,
            active_rules: active.triggered_rules.clone(),
            shadow_rules: shadow.triggered_rules.clone(),
            impact_assessment: ImpactAssessment::classify(active, shadow),
        }
    }

    /// Whether the shadow manifest would newly restrict an unrestricted job
    pub fn would_have_blocked(&self) -> bool {
        self.shadow_mode == ExecutionMode::Rail && self.active_mode == ExecutionMode::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(mode: ExecutionMode, rule: &str) -> Decision {
        Decision {
            mode,
            budget: Budget::default(),
            triggered_rules: vec![rule.to_string()],
            selected_rule: Some(rule.to_string()),
            reason: "test".into(),
            risk_class: None,
            recovery_strategy: None,
            require_approval: false,
            manifest_version: "1".into(),
            manifest_hash: "h".into(),
            shadow: false,
        }
    }

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&ExecutionMode::Rail).unwrap(),
            "\"RAIL\""
        );
        let mode: ExecutionMode = serde_json::from_str("\"DIRECT\"").unwrap();
        assert_eq!(mode, ExecutionMode::Direct);
    }

    #[test]
    fn test_impact_classification() {
        let direct = decision(ExecutionMode::Direct, "a");
        let rail = decision(ExecutionMode::Rail, "a");

        assert_eq!(
            ImpactAssessment::classify(&direct, &rail),
            ImpactAssessment::WouldEnforceGovernance
        );
        assert_eq!(
            ImpactAssessment::classify(&rail, &direct),
            ImpactAssessment::WouldSkipGovernance
        );
        assert_eq!(
            ImpactAssessment::classify(&direct, &direct.clone()),
            ImpactAssessment::NoDifference
        );

        let mut tighter = direct.clone();
        tighter.budget.timeout_ms = 1;
        assert_eq!(
            ImpactAssessment::classify(&direct, &tighter),
            ImpactAssessment::BudgetLimitsWouldChange
        );

        let other_rule = decision(ExecutionMode::Direct, "b");
        assert_eq!(
            ImpactAssessment::classify(&direct, &other_rule),
            ImpactAssessment::MinorDifference
        );
    }

    #[test]
    fn test_comparison_flags() {
        let active = decision(ExecutionMode::Direct, "a");
        let shadow = decision(ExecutionMode::Rail, "b");
        let cmp = ShadowDecisionComparison::between(JobId::new("j"), "llm_call", &active, &shadow);

        assert!(cmp.mode_delta);
        assert!(!cmp.budget_delta);
        assert!(cmp.would_have_blocked());
        assert_eq!(
            cmp.impact_assessment.to_string(),
            "shadow would enforce governance (currently direct)"
        );
    }
}
