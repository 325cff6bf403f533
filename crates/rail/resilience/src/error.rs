//! Error types for rail-resilience.
//!
//! Retry exhaustion and circuit rejection are distinct types so callers
//! never mistake a fail-fast rejection for a real execution failure.

use rail_types::{CircuitState, ClassifiedError, ErrorCode, FailureKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One failed attempt inside a single retry loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttemptRecord {
    /// Zero-based attempt number
    pub attempt: u32,
    pub error: String,
    pub error_type: String,
    pub retriable: bool,
    pub elapsed_ms: u64,
}

/// A task kept failing with retriable errors until the budget ran out.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("retry budget exhausted after {attempts} attempts (max_retries={max_retries}): {last_error}")]
pub struct BudgetRetryExhaustedError {
    pub max_retries: u32,

    /// Total attempts made, including the first
    pub attempts: u32,

    pub last_error: String,
    pub last_error_code: Option<ErrorCode>,

    /// Every failed attempt, oldest first
    pub history: Vec<RetryAttemptRecord>,

    /// Whether the immune system must be told
    pub immune_alert: bool,
}

impl ClassifiedError for BudgetRetryExhaustedError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(ErrorCode::BudgetRetryExhausted)
    }
}

/// A call was rejected without running because its circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("circuit {circuit_id} is {state} ({failure_count} failures); call rejected")]
pub struct ReflexCircuitOpenError {
    pub circuit_id: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

impl ClassifiedError for ReflexCircuitOpenError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(ErrorCode::ReflexCircuitOpen)
    }
}

/// Outcome of a call through a circuit breaker
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Rejected without invoking the wrapped function
    #[error(transparent)]
    Open(ReflexCircuitOpenError),

    /// The wrapped function ran and failed
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            CircuitError::Open(_) => None,
        }
    }
}

impl<E: ClassifiedError> ClassifiedError for CircuitError<E> {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            CircuitError::Open(e) => e.error_code(),
            CircuitError::Inner(e) => e.error_code(),
        }
    }

    fn failure_kind(&self) -> FailureKind {
        match self {
            CircuitError::Open(_) => FailureKind::Other,
            CircuitError::Inner(e) => e.failure_kind(),
        }
    }
}

/// Outcome of a retry loop
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Failed with an error that must not be retried
    #[error("non-retriable failure on attempt {attempt}: {source}")]
    NonRetriable {
        attempt: u32,
        #[source]
        source: E,
        history: Vec<RetryAttemptRecord>,
    },

    /// Every allowed attempt failed
    #[error("{error}")]
    Exhausted {
        #[source]
        error: BudgetRetryExhaustedError,
        last: E,
    },

    /// The caller cancelled before the loop finished
    #[error("retry loop cancelled after {attempts} attempts")]
    Cancelled {
        attempts: u32,
        history: Vec<RetryAttemptRecord>,
    },
}

impl<E> RetryError<E> {
    /// Attempt history collected before the loop ended
    pub fn history(&self) -> &[RetryAttemptRecord] {
        match self {
            RetryError::NonRetriable { history, .. } | RetryError::Cancelled { history, .. } => {
                history
            }
            RetryError::Exhausted { error, .. } => &error.history,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The last error the task itself produced
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::NonRetriable { source, .. } => Some(source),
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl<E: ClassifiedError> ClassifiedError for RetryError<E> {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            RetryError::NonRetriable { source, .. } => source.error_code(),
            RetryError::Exhausted { error, .. } => error.error_code(),
            RetryError::Cancelled { .. } => Some(ErrorCode::Cancelled),
        }
    }

    fn failure_kind(&self) -> FailureKind {
        match self {
            RetryError::NonRetriable { source, .. } => source.failure_kind(),
            RetryError::Exhausted { .. } => FailureKind::Other,
            RetryError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    fn should_alert_immune(&self) -> bool {
        match self {
            RetryError::Exhausted { error, .. } => error.immune_alert,
            other => other
                .error_code()
                .map(|code| code.metadata().should_alert_immune)
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rail_types::TaskError;

    #[test]
    fn test_circuit_open_is_not_retriable() {
        let err: CircuitError<TaskError> = CircuitError::Open(ReflexCircuitOpenError {
            circuit_id: "llm".into(),
            state: CircuitState::Open,
            failure_count: 5,
        });
        assert!(err.is_open());
        assert!(!err.is_retriable());
        assert_eq!(err.error_code(), Some(ErrorCode::ReflexCircuitOpen));
        assert_eq!(
            err.to_string(),
            "circuit llm is OPEN (5 failures); call rejected"
        );
    }

    #[test]
    fn test_inner_error_keeps_classification() {
        let err: CircuitError<TaskError> = CircuitError::Inner(TaskError::connection("reset"));
        assert!(err.is_retriable());
        assert!(err.into_inner().is_some());
    }

    #[test]
    fn test_exhausted_uses_recorded_alert_flag() {
        let err = RetryError::Exhausted {
            error: BudgetRetryExhaustedError {
                max_retries: 1,
                attempts: 2,
                last_error: "reset".into(),
                last_error_code: None,
                history: vec![],
                immune_alert: false,
            },
            last: TaskError::connection("reset"),
        };
        assert!(!err.should_alert_immune());
        assert!(!err.is_retriable());
        assert_eq!(err.error_code(), Some(ErrorCode::BudgetRetryExhausted));
    }
}
