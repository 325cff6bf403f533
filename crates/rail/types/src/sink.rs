//! Outbound collaborator interfaces
//!
//! The governance core never persists or delivers anything itself. It hands
//! audit records to an [`AuditSink`], anomalies to an [`ImmuneSystem`] and
//! counters to a [`MetricsSink`].

use crate::decision::ExecutionMode;
use crate::error::Severity;
use crate::events::{AuditEvent, AuditRecord};
use crate::ids::JobId;
use crate::state::ReflexActionKind;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("sink rejected record: {0}")]
    Rejected(String),
}

/// Trait for audit sinks
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist or forward an audit record
    async fn emit(&self, record: AuditRecord) -> Result<(), SinkError>;
}

/// Payload delivered to the immune system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmunePayload {
    pub job_id: Option<JobId>,
    pub reason: String,
    pub severity: Severity,
    pub source: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ImmunePayload {
    pub const SOURCE_REFLEX: &'static str = "reflex_system";
    pub const SOURCE_RETRY: &'static str = "retry_handler";

    pub fn new(reason: impl Into<String>, severity: Severity, source: impl Into<String>) -> Self {
        Self {
            job_id: None,
            reason: reason.into(),
            severity,
            source: source.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// External anomaly-alerting collaborator
#[async_trait]
pub trait ImmuneSystem: Send + Sync {
    async fn notify(&self, reason: &str, payload: ImmunePayload) -> Result<(), SinkError>;
}

/// Optional counters for an external observability pipeline.
///
/// Recording is infallible by signature; implementations swallow their own
/// failures.
pub trait MetricsSink: Send + Sync {
    fn record_decision(&self, _mode: ExecutionMode, _shadow: bool) {}
    fn record_retry(&self, _error_type: &str) {}
    fn record_retry_exhausted(&self) {}
    fn record_circuit_opened(&self, _circuit_id: &str) {}
    fn record_circuit_rejected(&self, _circuit_id: &str) {}
    fn record_reflex_action(&self, _action: ReflexActionKind) {}
    fn record_shadow_rates(&self, _mode_divergence_rate: f64, _explosion_rate: f64) {}
}

/// Metrics sink that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// In-memory audit sink for testing
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all records
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Get all events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.records.read().iter().map(|r| r.event.clone()).collect()
    }

    /// Number of events of the given kind
    pub fn count_of(&self, kind: &str) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.event.kind() == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn emit(&self, record: AuditRecord) -> Result<(), SinkError> {
        self.records.write().push(record);
        Ok(())
    }
}

/// Immune system that drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopImmuneSystem;

#[async_trait]
impl ImmuneSystem for NoopImmuneSystem {
    async fn notify(&self, _reason: &str, _payload: ImmunePayload) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Immune system that keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingImmuneSystem {
    notifications: RwLock<Vec<ImmunePayload>>,
    unavailable: bool,
}

impl RecordingImmuneSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// An immune system that rejects every notification
    pub fn unavailable() -> Self {
        Self {
            notifications: RwLock::new(Vec::new()),
            unavailable: true,
        }
    }

    pub fn notifications(&self) -> Vec<ImmunePayload> {
        self.notifications.read().clone()
    }

    pub fn len(&self) -> usize {
        self.notifications.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.read().is_empty()
    }
}

#[async_trait]
impl ImmuneSystem for RecordingImmuneSystem {
    async fn notify(&self, reason: &str, payload: ImmunePayload) -> Result<(), SinkError> {
        if self.unavailable {
            return Err(SinkError::Unavailable(format!(
                "immune system offline, dropped: {}",
                reason
            )));
        }
        self.notifications.write().push(payload);
        Ok(())
    }
}
