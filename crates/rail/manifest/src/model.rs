//! Typed manifest model
//!
//! A [`Manifest`] is immutable once loaded. The only way to obtain one is
//! through the loader (or [`crate::create_default_manifest`]), which
//! validates the document and computes `hash_self`.

use crate::hash;
use chrono::{DateTime, Utc};
use rail_types::{Budget, BudgetPatch, ExecutionMode, JobContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition a job context must satisfy for a rule to match.
///
/// Unset fields are wildcards; an empty condition matches every context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_personal_data: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_class: Option<String>,

    /// Every listed attribute must be present on the context with an equal value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl RuleCondition {
    /// Catch-all condition
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check the condition against a context.
    ///
    /// `risk_class` is the job's effective risk class, which may come from a
    /// job-type override rather than the context itself.
    pub fn matches(&self, ctx: &JobContext, risk_class: Option<&str>) -> bool {
        if let Some(job_type) = &self.job_type {
            if *job_type != ctx.job_type {
                return false;
            }
        }
        if let Some(environment) = &self.environment {
            if *environment != ctx.environment {
                return false;
            }
        }
        if let Some(uses_personal_data) = self.uses_personal_data {
            if uses_personal_data != ctx.uses_personal_data {
                return false;
            }
        }
        if let Some(required) = &self.risk_class {
            if risk_class != Some(required.as_str()) {
                return false;
            }
        }
        self.attributes
            .iter()
            .all(|(key, value)| ctx.attribute(key) == Some(value.as_str()))
    }
}

fn default_enabled() -> bool {
    true
}

/// A prioritized governance rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestRule {
    pub rule_id: String,

    /// Lower value is evaluated earlier
    pub priority: i64,

    #[serde(default)]
    pub condition: RuleCondition,

    pub mode: ExecutionMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_override: Option<Budget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_strategy: Option<String>,

    #[serde(default)]
    pub reason: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_multiplier() -> f64 {
    1.0
}

/// Named multiplier and approval policy for elevated-risk jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskClass {
    /// Defaults to the key the class is declared under
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_strategy: Option<String>,

    #[serde(default)]
    pub require_approval: bool,

    #[serde(default = "default_multiplier")]
    pub budget_multiplier: f64,
}

/// Per-job-type override: a partial budget and an optional risk class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOverride {
    #[serde(flatten)]
    pub budget: BudgetPatch,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_class: Option<String>,
}

impl JobOverride {
    pub(crate) const FIELDS: &'static [&'static str] = &[
        "timeout_ms",
        "max_retries",
        "max_parallel_attempts",
        "max_global_parallel",
        "max_llm_tokens",
        "grace_period_ms",
        "risk_class",
    ];
}

/// Versioned, hashed governance policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,

    version: String,
    hash_prev: Option<String>,
    pub(crate) hash_self: String,
    rules: Vec<ManifestRule>,
    budget_defaults: Budget,
    risk_classes: BTreeMap<String, RiskClass>,
    job_overrides: BTreeMap<String, JobOverride>,
    shadow_mode: bool,

    /// Indices of enabled rules, stably sorted by priority
    #[serde(skip)]
    evaluation_order: Vec<usize>,
}

/// The hashed subset of a manifest
#[derive(Serialize)]
struct HashedContent<'a> {
    version: &'a str,
    hash_prev: Option<&'a str>,
    rules: &'a [ManifestRule],
    budget_defaults: &'a Budget,
    risk_classes: &'a BTreeMap<String, RiskClass>,
    job_overrides: &'a BTreeMap<String, JobOverride>,
    shadow_mode: bool,
}

/// Validated manifest content prior to hashing
pub(crate) struct ManifestParts {
    pub manifest_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub version: String,
    pub hash_prev: Option<String>,
    pub rules: Vec<ManifestRule>,
    pub budget_defaults: Budget,
    pub risk_classes: BTreeMap<String, RiskClass>,
    pub job_overrides: BTreeMap<String, JobOverride>,
    pub shadow_mode: bool,
}

impl Manifest {
    pub(crate) fn from_parts(parts: ManifestParts) -> Result<Self, serde_json::Error> {
        let mut manifest = Self::unhashed(parts);
        manifest.hash_self = manifest.compute_hash()?;
        Ok(manifest)
    }

    pub(crate) fn unhashed(parts: ManifestParts) -> Self {
        let mut evaluation_order: Vec<usize> = parts
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.enabled)
            .map(|(i, _)| i)
            .collect();
        // sort_by_key is stable: equal priorities keep declaration order
        evaluation_order.sort_by_key(|&i| parts.rules[i].priority);

        Self {
            manifest_id: parts.manifest_id,
            created_at: parts.created_at,
            version: parts.version,
            hash_prev: parts.hash_prev,
            hash_self: String::new(),
            rules: parts.rules,
            budget_defaults: parts.budget_defaults,
            risk_classes: parts.risk_classes,
            job_overrides: parts.job_overrides,
            shadow_mode: parts.shadow_mode,
            evaluation_order,
        }
    }

    /// Recompute the content hash from the manifest's fields.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        hash::content_hash(&HashedContent {
            version: &self.version,
            hash_prev: self.hash_prev.as_deref(),
            rules: &self.rules,
            budget_defaults: &self.budget_defaults,
            risk_classes: &self.risk_classes,
            job_overrides: &self.job_overrides,
            shadow_mode: self.shadow_mode,
        })
    }

    pub fn manifest_id(&self) -> Option<&str> {
        self.manifest_id.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn hash_prev(&self) -> Option<&str> {
        self.hash_prev.as_deref()
    }

    pub fn hash_self(&self) -> &str {
        &self.hash_self
    }

    /// Rules in declaration order, including disabled ones
    pub fn rules(&self) -> &[ManifestRule] {
        &self.rules
    }

    /// Enabled rules in evaluation order
    pub fn evaluation_order(&self) -> impl Iterator<Item = &ManifestRule> + '_ {
        self.evaluation_order.iter().map(move |&i| &self.rules[i])
    }

    pub fn rule(&self, rule_id: &str) -> Option<&ManifestRule> {
        self.rules.iter().find(|rule| rule.rule_id == rule_id)
    }

    pub fn budget_defaults(&self) -> &Budget {
        &self.budget_defaults
    }

    pub fn risk_classes(&self) -> &BTreeMap<String, RiskClass> {
        &self.risk_classes
    }

    pub fn risk_class(&self, name: &str) -> Option<&RiskClass> {
        self.risk_classes.get(name)
    }

    pub fn job_overrides(&self) -> &BTreeMap<String, JobOverride> {
        &self.job_overrides
    }

    pub fn job_override(&self, job_type: &str) -> Option<&JobOverride> {
        self.job_overrides.get(job_type)
    }

    pub fn shadow_mode(&self) -> bool {
        self.shadow_mode
    }

    /// Whether this manifest declares itself the successor of `prev`
    pub fn follows(&self, prev: &Manifest) -> bool {
        self.hash_prev.as_deref() == Some(prev.hash_self())
    }

    /// Serialize back into a document the loader accepts.
    ///
    /// Reloading the document yields the same `hash_self`.
    pub fn to_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
