//! Budget resolution
//!
//! Order matters: the base budget is scaled by the risk multiplier first,
//! then the job-type override replaces individual fields. An override
//! replaces, a multiplier scales.

use rail_manifest::{Manifest, ManifestRule, RiskClass};
use rail_types::{Budget, JobContext};

/// The risk class a job is evaluated under.
///
/// The context's own tag wins over one assigned by a job-type override.
pub fn effective_risk_class<'a>(manifest: &'a Manifest, ctx: &'a JobContext) -> Option<&'a str> {
    ctx.risk_class.as_deref().or_else(|| {
        manifest
            .job_override(&ctx.job_type)
            .and_then(|o| o.risk_class.as_deref())
    })
}

/// Resolve the budget for a selected rule.
pub fn resolve_budget(
    manifest: &Manifest,
    rule: &ManifestRule,
    risk_class: Option<&RiskClass>,
    job_type: &str,
) -> Budget {
    let base = rule
        .budget_override
        .unwrap_or(*manifest.budget_defaults());

    let scaled = match risk_class {
        Some(class) => base.scaled(class.budget_multiplier),
        None => base,
    };

    match manifest.job_override(job_type) {
        Some(job_override) => scaled.patched(&job_override.budget),
        None => scaled,
    }
}
