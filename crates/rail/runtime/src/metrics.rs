//! Prometheus metrics sink

use crate::error::Result;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use rail_types::{ExecutionMode, MetricsSink, ReflexActionKind};
use tracing::warn;

/// Governance metrics registered in a Prometheus registry
pub struct PrometheusMetrics {
    registry: Registry,

    /// Decisions by mode and whether they came from a shadow manifest
    pub decisions_total: IntCounterVec,

    /// Retries by error type
    pub retries_total: IntCounterVec,

    /// Retry loops that ran out of budget
    pub retry_exhausted_total: IntCounter,

    /// Circuit openings by circuit id
    pub circuit_opened_total: IntCounterVec,

    /// Calls rejected by an open circuit, by circuit id
    pub circuit_rejected_total: IntCounterVec,

    /// Reflex actions by kind
    pub reflex_actions_total: IntCounterVec,

    /// Latest shadow mode divergence rate
    pub shadow_mode_divergence_rate: Gauge,

    /// Latest shadow explosion rate
    pub shadow_explosion_rate: Gauge,
}

impl PrometheusMetrics {
    /// Create metrics in a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create and register metrics in `registry`
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let decisions_total = IntCounterVec::new(
            Opts::new("rail_decisions_total", "Governance decisions produced"),
            &["mode", "shadow"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let retries_total = IntCounterVec::new(
            Opts::new("rail_retries_total", "Retries scheduled after a retriable failure"),
            &["error_type"],
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let retry_exhausted_total = IntCounter::new(
            "rail_retry_exhausted_total",
            "Retry loops that exhausted their budget",
        )?;
        registry.register(Box::new(retry_exhausted_total.clone()))?;

        let circuit_opened_total = IntCounterVec::new(
            Opts::new("rail_circuit_opened_total", "Circuit breaker openings"),
            &["circuit_id"],
        )?;
        registry.register(Box::new(circuit_opened_total.clone()))?;

        let circuit_rejected_total = IntCounterVec::new(
            Opts::new("rail_circuit_rejected_total", "Calls rejected by a circuit breaker"),
            &["circuit_id"],
        )?;
        registry.register(Box::new(circuit_rejected_total.clone()))?;

        let reflex_actions_total = IntCounterVec::new(
            Opts::new("rail_reflex_actions_total", "Reflex actions taken"),
            &["action"],
        )?;
        registry.register(Box::new(reflex_actions_total.clone()))?;

        let shadow_mode_divergence_rate = Gauge::new(
            "rail_shadow_mode_divergence_rate",
            "Fraction of shadow evaluations whose mode differs from the active manifest",
        )?;
        registry.register(Box::new(shadow_mode_divergence_rate.clone()))?;

        let shadow_explosion_rate = Gauge::new(
            "rail_shadow_explosion_rate",
            "Fraction of shadow evaluations that would newly restrict a job",
        )?;
        registry.register(Box::new(shadow_explosion_rate.clone()))?;

        Ok(Self {
            registry,
            decisions_total,
            retries_total,
            retry_exhausted_total,
            circuit_opened_total,
            circuit_rejected_total,
            reflex_actions_total,
            shadow_mode_divergence_rate,
            shadow_explosion_rate,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_decision(&self, mode: ExecutionMode, shadow: bool) {
        let shadow = if shadow { "true" } else { "false" };
        self.decisions_total
            .with_label_values(&[mode.as_str(), shadow])
            .inc();
    }

    fn record_retry(&self, error_type: &str) {
        self.retries_total.with_label_values(&[error_type]).inc();
    }

    fn record_retry_exhausted(&self) {
        self.retry_exhausted_total.inc();
    }

    fn record_circuit_opened(&self, circuit_id: &str) {
        self.circuit_opened_total
            .with_label_values(&[circuit_id])
            .inc();
    }

    fn record_circuit_rejected(&self, circuit_id: &str) {
        self.circuit_rejected_total
            .with_label_values(&[circuit_id])
            .inc();
    }

    fn record_reflex_action(&self, action: ReflexActionKind) {
        self.reflex_actions_total
            .with_label_values(&[&action.to_string()])
            .inc();
    }

    fn record_shadow_rates(&self, mode_divergence_rate: f64, explosion_rate: f64) {
        self.shadow_mode_divergence_rate.set(mode_divergence_rate);
        self.shadow_explosion_rate.set(explosion_rate);
    }
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_exports() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_decision(ExecutionMode::Rail, false);
        metrics.record_decision(ExecutionMode::Rail, false);
        metrics.record_retry("connection");
        metrics.record_circuit_opened("llm");
        metrics.record_reflex_action(ReflexActionKind::Suspend);
        metrics.record_shadow_rates(0.25, 0.0);

        assert_eq!(
            metrics
                .decisions_total
                .with_label_values(&["RAIL", "false"])
                .get(),
            2
        );

        let output = metrics.export();
        assert!(output.contains("rail_decisions_total"));
        assert!(output.contains("rail_circuit_opened_total{circuit_id=\"llm\"} 1"));
        assert!(output.contains("rail_shadow_mode_divergence_rate 0.25"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }
}
