//! Shadow evaluation report

use chrono::{DateTime, Utc};
use rail_types::ShadowDecisionComparison;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate over every shadow evaluation since the engine started or was
/// last reset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowReport {
    pub active_version: String,
    pub active_hash: String,
    pub shadow_version: String,
    pub shadow_hash: String,

    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub elapsed_hours: f64,

    pub evaluation_count: u64,
    pub mode_divergence_count: u64,
    pub mode_divergence_rate: f64,
    pub budget_divergence_count: u64,
    pub budget_divergence_rate: f64,

    /// Evaluations where the shadow manifest would newly restrict a job
    pub would_have_blocked: u64,
    pub explosion_rate: f64,

    /// How often each shadow-manifest rule matched
    pub rule_trigger_counts: BTreeMap<String, u64>,

    /// How often each active-manifest rule matched
    pub active_rule_trigger_counts: BTreeMap<String, u64>,

    pub safe_to_activate: bool,
    pub activation_gate_reason: String,

    /// The first comparisons recorded, oldest first
    pub samples: Vec<ShadowDecisionComparison>,
}

impl ShadowReport {
    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "{} evaluations over {:.2}h: mode divergence {:.2}%, explosion {:.2}%, {} ({})",
            self.evaluation_count,
            self.elapsed_hours,
            self.mode_divergence_rate * 100.0,
            self.explosion_rate * 100.0,
            if self.safe_to_activate {
                "safe to activate"
            } else {
                "not safe to activate"
            },
            self.activation_gate_reason
        )
    }
}

/// Live shadow counters, read without consulting the activation gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowSnapshot {
    pub started_at: DateTime<Utc>,
    pub evaluation_count: u64,
    pub mode_divergence_count: u64,
    pub mode_divergence_rate: f64,
    pub budget_divergence_count: u64,
    pub budget_divergence_rate: f64,
    pub would_have_blocked: u64,
    pub explosion_rate: f64,
    pub samples_kept: usize,
}

/// `count / total`, zero when nothing was evaluated
pub(crate) fn rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
