//! Error types for rail-reflex.

use rail_types::{ClassifiedError, ErrorCode, JobId, JobState, ReflexActionKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A lifecycle refused a state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("no lifecycle registered for job {0}")]
    UnknownJob(JobId),
}

/// A corrective action did not take effect.
///
/// The job is left in whatever state it was in before the action, which the
/// caller must treat as unresolved risk.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("reflex action {action_type} failed for job {job_id}: {reason}")]
pub struct ReflexActionFailedError {
    pub action_type: ReflexActionKind,
    pub reason: String,
    pub job_id: JobId,
}

impl ReflexActionFailedError {
    pub fn new(action_type: ReflexActionKind, job_id: JobId, reason: impl Into<String>) -> Self {
        Self {
            action_type,
            reason: reason.into(),
            job_id,
        }
    }
}

impl ClassifiedError for ReflexActionFailedError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(ErrorCode::ReflexActionFailed)
    }
}

pub type Result<T> = std::result::Result<T, ReflexActionFailedError>;
