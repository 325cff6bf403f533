//! State vocabularies shared between the enforcement crates and the audit trail

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a governed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Executing normally (initial state)
    Running,

    /// Paused until a cooldown expires
    Suspended,

    /// Executing at a reduced rate
    Throttled,

    /// Halted pending external action (e.g. approval)
    Blocked,

    /// Finished successfully (terminal)
    Completed,

    /// Stopped for good (terminal)
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Throttled => "THROTTLED",
            JobState::Blocked => "BLOCKED",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,

    /// Circuit is open, requests are blocked.
    Open,

    /// Circuit is testing if the dependency has recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Automated corrective actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflexActionKind {
    Suspend,
    Throttle,
    Alert,
    Cancel,
}

impl fmt::Display for ReflexActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReflexActionKind::Suspend => write!(f, "suspend"),
            ReflexActionKind::Throttle => write!(f, "throttle"),
            ReflexActionKind::Alert => write!(f, "alert"),
            ReflexActionKind::Cancel => write!(f, "cancel"),
        }
    }
}
