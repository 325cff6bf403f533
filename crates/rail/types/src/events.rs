//! Audit events emitted by the governance core

use crate::decision::{Decision, ShadowDecisionComparison};
use crate::error::Severity;
use crate::ids::{JobId, MissionId};
use crate::state::{CircuitState, JobState, ReflexActionKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Something the governance core did that an auditor may care about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A decision was produced for a job
    Decision {
        mission_id: MissionId,
        job_id: JobId,
        decision: Decision,
    },

    /// A shadow manifest was evaluated alongside the active one
    ShadowComparison { comparison: ShadowDecisionComparison },

    /// A job lifecycle changed state
    LifecycleTransition {
        job_id: JobId,
        from: JobState,
        to: JobState,
        reason: String,
    },

    /// A reflex action was applied to a job
    ReflexAction {
        job_id: JobId,
        action: ReflexActionKind,
        reason: String,
        severity: Option<Severity>,
    },

    /// A governed job ran out of retries
    RetryExhausted {
        job_id: JobId,
        attempts: u32,
        max_retries: u32,
        last_error: String,
    },

    /// A call was rejected without running because its circuit is open
    CircuitRejected {
        job_id: JobId,
        circuit_id: String,
        state: CircuitState,
        failure_count: u32,
    },

    /// A manifest became the active policy
    ManifestActivated {
        version: String,
        hash_self: String,
        hash_prev: Option<String>,
    },

    /// A shadow manifest passed its activation gate and was promoted
    ShadowPromoted {
        version: String,
        hash_self: String,
        evaluation_count: u64,
    },
}

impl AuditEvent {
    /// Job the event concerns, if any
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            AuditEvent::Decision { job_id, .. }
            | AuditEvent::LifecycleTransition { job_id, .. }
            | AuditEvent::ReflexAction { job_id, .. }
            | AuditEvent::RetryExhausted { job_id, .. }
            | AuditEvent::CircuitRejected { job_id, .. } => Some(job_id),
            AuditEvent::ShadowComparison { comparison } => Some(&comparison.job_id),
            AuditEvent::ManifestActivated { .. } | AuditEvent::ShadowPromoted { .. } => None,
        }
    }

    /// Stable name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Decision { .. } => "decision",
            AuditEvent::ShadowComparison { .. } => "shadow_comparison",
            AuditEvent::LifecycleTransition { .. } => "lifecycle_transition",
            AuditEvent::ReflexAction { .. } => "reflex_action",
            AuditEvent::RetryExhausted { .. } => "retry_exhausted",
            AuditEvent::CircuitRejected { .. } => "circuit_rejected",
            AuditEvent::ManifestActivated { .. } => "manifest_activated",
            AuditEvent::ShadowPromoted { .. } => "shadow_promoted",
        }
    }
}

/// Envelope for an audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

impl From<AuditEvent> for AuditRecord {
    fn from(event: AuditEvent) -> Self {
        Self::new(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = AuditEvent::LifecycleTransition {
            job_id: JobId::new("j-1"),
            from: JobState::Running,
            to: JobState::Suspended,
            reason: "retry budget exhausted".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "lifecycle_transition");
        assert_eq!(json["to"], "SUSPENDED");
        assert_eq!(event.kind(), "lifecycle_transition");
        assert_eq!(event.job_id().map(JobId::as_str), Some("j-1"));
    }

    #[test]
    fn test_manifest_events_have_no_job() {
        let event = AuditEvent::ManifestActivated {
            version: "2".into(),
            hash_self: "abc".into(),
            hash_prev: None,
        };
        assert!(event.job_id().is_none());
    }
}
