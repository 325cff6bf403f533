//! Activation gate
//!
//! Four conditions must all hold before a shadow manifest may be promoted.
//! They are checked in a fixed order and the first failure is reported.

use serde::{Deserialize, Serialize};

/// Reason reported when every condition holds
pub const GATE_PASSED: &str = "all activation gates passed";

/// Thresholds a shadow run must meet before promotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationGate {
    /// Minimum number of shadow evaluations
    pub min_evaluation_count: u64,

    /// Minimum wall-clock time spent in shadow mode
    pub shadow_duration_hours: f64,

    /// Maximum fraction of evaluations where the modes differ
    pub max_mode_divergence_rate: f64,

    /// Maximum fraction of evaluations that would newly restrict a job
    pub max_explosion_rate: f64,
}

impl Default for ActivationGate {
    fn default() -> Self {
        Self {
            min_evaluation_count: 1000,
            shadow_duration_hours: 24.0,
            max_mode_divergence_rate: 0.05,
            max_explosion_rate: 0.01,
        }
    }
}

/// Observed values the gate is checked against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateInput {
    pub evaluation_count: u64,
    pub elapsed_hours: f64,
    pub mode_divergence_rate: f64,
    pub explosion_rate: f64,
}

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub safe_to_activate: bool,
    pub reason: String,
}

impl GateVerdict {
    fn fail(reason: String) -> Self {
        Self {
            safe_to_activate: false,
            reason,
        }
    }
}

impl ActivationGate {
    /// Short-circuit check of the four conditions.
    pub fn check(&self, input: &GateInput) -> GateVerdict {
        if input.evaluation_count < self.min_evaluation_count {
            return GateVerdict::fail(format!(
                "insufficient evaluations: {} < {}",
                input.evaluation_count, self.min_evaluation_count
            ));
        }
        if input.elapsed_hours < self.shadow_duration_hours {
            return GateVerdict::fail(format!(
                "insufficient shadow duration: {:.2}h < {:.2}h",
                input.elapsed_hours, self.shadow_duration_hours
            ));
        }
        if input.mode_divergence_rate > self.max_mode_divergence_rate {
            return GateVerdict::fail(format!(
                "mode divergence rate {:.4} exceeds {:.4}",
                input.mode_divergence_rate, self.max_mode_divergence_rate
            ));
        }
        if input.explosion_rate > self.max_explosion_rate {
            return GateVerdict::fail(format!(
                "explosion rate {:.4} exceeds {:.4}",
                input.explosion_rate, self.max_explosion_rate
            ));
        }
        GateVerdict {
            safe_to_activate: true,
            reason: GATE_PASSED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing() -> GateInput {
        GateInput {
            evaluation_count: 5_000,
            elapsed_hours: 48.0,
            mode_divergence_rate: 0.01,
            explosion_rate: 0.0,
        }
    }

    #[test]
    fn test_all_conditions_hold() {
        let verdict = ActivationGate::default().check(&passing());
        assert!(verdict.safe_to_activate);
        assert_eq!(verdict.reason, GATE_PASSED);
    }

    #[test]
    fn test_low_count_fails_regardless_of_rates() {
        let input = GateInput {
            evaluation_count: 999,
            mode_divergence_rate: 0.0,
            explosion_rate: 0.0,
            ..passing()
        };
        let verdict = ActivationGate::default().check(&input);
        assert!(!verdict.safe_to_activate);
        assert!(verdict.reason.starts_with("insufficient evaluations"));
    }

    #[test]
    fn test_first_failure_reported() {
        let input = GateInput {
            elapsed_hours: 1.0,
            mode_divergence_rate: 0.9,
            explosion_rate: 0.9,
            ..passing()
        };
        let verdict = ActivationGate::default().check(&input);
        assert!(verdict.reason.starts_with("insufficient shadow duration"));

        let input = GateInput {
            mode_divergence_rate: 0.9,
            explosion_rate: 0.9,
            ..passing()
        };
        let verdict = ActivationGate::default().check(&input);
        assert!(verdict.reason.starts_with("mode divergence rate"));

        let input = GateInput {
            explosion_rate: 0.02,
            ..passing()
        };
        let verdict = ActivationGate::default().check(&input);
        assert!(verdict.reason.starts_with("explosion rate"));
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let gate = ActivationGate::default();
        let input = GateInput {
            evaluation_count: gate.min_evaluation_count,
            elapsed_hours: gate.shadow_duration_hours,
            mode_divergence_rate: gate.max_mode_divergence_rate,
            explosion_rate: gate.max_explosion_rate,
        };
        assert!(gate.check(&input).safe_to_activate);
    }
}
