//! Execution budgets
//!
//! A [`Budget`] bounds what a governed job may consume. Manifests carry a
//! default budget, optional per-rule overrides and per-job-type patches.

use serde::{Deserialize, Serialize};

/// Resource ceiling for a governed job.
///
/// All fields are required when a budget appears in a manifest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Budget {
    /// Per-attempt timeout in milliseconds. Zero means unbounded.
    pub timeout_ms: u64,

    /// Additional attempts allowed after the first one.
    pub max_retries: u32,

    /// Concurrent attempts for a single job.
    pub max_parallel_attempts: u32,

    /// Concurrent governed jobs across the process.
    pub max_global_parallel: u32,

    /// LLM token allowance for the job.
    pub max_llm_tokens: u64,

    /// Grace period granted before a cancelled job is torn down.
    pub grace_period_ms: u64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            max_parallel_attempts: 1,
            max_global_parallel: 10,
            max_llm_tokens: 8_192,
            grace_period_ms: 5_000,
        }
    }
}

impl Budget {
    /// Scale the timeout and retry-sensitive fields by a risk multiplier.
    ///
    /// Scaled values are rounded to the nearest integer and saturate at the
    /// field's maximum. Non-finite or negative multipliers leave the budget
    /// unchanged.
    pub fn scaled(&self, multiplier: f64) -> Self {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return *self;
        }
        Self {
            timeout_ms: scale_u64(self.timeout_ms, multiplier),
            max_retries: scale_u32(self.max_retries, multiplier),
            grace_period_ms: scale_u64(self.grace_period_ms, multiplier),
            ..*self
        }
    }

    /// Apply a partial override: every field present in the patch replaces
    /// the current value.
    pub fn patched(&self, patch: &BudgetPatch) -> Self {
        Self {
            timeout_ms: patch.timeout_ms.unwrap_or(self.timeout_ms),
            max_retries: patch.max_retries.unwrap_or(self.max_retries),
            max_parallel_attempts: patch
                .max_parallel_attempts
                .unwrap_or(self.max_parallel_attempts),
            max_global_parallel: patch
                .max_global_parallel
                .unwrap_or(self.max_global_parallel),
            max_llm_tokens: patch.max_llm_tokens.unwrap_or(self.max_llm_tokens),
            grace_period_ms: patch.grace_period_ms.unwrap_or(self.grace_period_ms),
        }
    }
}

fn scale_u64(value: u64, multiplier: f64) -> u64 {
    let scaled = (value as f64 * multiplier).round();
    if scaled >= u64::MAX as f64 {
        u64::MAX
    } else {
        scaled as u64
    }
}

fn scale_u32(value: u32, multiplier: f64) -> u32 {
    let scaled = (f64::from(value) * multiplier).round();
    if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Field-by-field budget override. Absent fields keep the resolved value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_global_parallel: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_llm_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_ms: Option<u64>,
}

impl BudgetPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<Budget> for BudgetPatch {
    fn from(budget: Budget) -> Self {
        Self {
            timeout_ms: Some(budget.timeout_ms),
            max_retries: Some(budget.max_retries),
            max_parallel_attempts: Some(budget.max_parallel_attempts),
            max_global_parallel: Some(budget.max_global_parallel),
            max_llm_tokens: Some(budget.max_llm_tokens),
            grace_period_ms: Some(budget.grace_period_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_multiplies_timeout_and_retries() {
        let budget = Budget {
            timeout_ms: 30_000,
            max_retries: 3,
            grace_period_ms: 1_000,
            ..Budget::default()
        };

        let scaled = budget.scaled(2.0);
        assert_eq!(scaled.timeout_ms, 60_000);
        assert_eq!(scaled.max_retries, 6);
        assert_eq!(scaled.grace_period_ms, 2_000);
        // Concurrency limits are not risk-scaled
        assert_eq!(scaled.max_parallel_attempts, budget.max_parallel_attempts);
        assert_eq!(scaled.max_llm_tokens, budget.max_llm_tokens);
    }

    #[test]
    fn test_scaled_rounds_to_nearest() {
        let budget = Budget {
            max_retries: 3,
            ..Budget::default()
        };
        assert_eq!(budget.scaled(0.5).max_retries, 2);
        assert_eq!(budget.scaled(0.1).max_retries, 0);
    }

    #[test]
    fn test_scaled_ignores_invalid_multiplier() {
        let budget = Budget::default();
        assert_eq!(budget.scaled(f64::NAN), budget);
        assert_eq!(budget.scaled(-1.0), budget);
    }

    #[test]
    fn test_scaled_saturates() {
        let budget = Budget {
            timeout_ms: u64::MAX / 2,
            ..Budget::default()
        };
        assert_eq!(budget.scaled(4.0).timeout_ms, u64::MAX);
    }

    #[test]
    fn test_patch_replaces_present_fields_only() {
        let budget = Budget::default();
        let patch = BudgetPatch {
            timeout_ms: Some(5_000),
            ..BudgetPatch::default()
        };

        let patched = budget.patched(&patch);
        assert_eq!(patched.timeout_ms, 5_000);
        assert_eq!(patched.max_retries, budget.max_retries);
    }

    #[test]
    fn test_budget_requires_all_fields() {
        let err = serde_json::from_str::<Budget>(r#"{"timeout_ms": 10}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_full_budget_parses_as_patch() {
        let json = serde_json::to_string(&Budget::default()).unwrap();
        let patch: BudgetPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(Budget::default().patched(&patch), Budget::default());
    }
}
