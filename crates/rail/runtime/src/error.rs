//! Error types for rail-runtime.

use rail_manifest::ManifestError;
use rail_reflex::ReflexActionFailedError;
use rail_resilience::{BudgetRetryExhaustedError, ReflexCircuitOpenError};
use rail_types::{ClassifiedError, ErrorCode, FailureKind, JobId};
use thiserror::Error;

/// Errors from setting up or reconfiguring the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to initialize tracing: {0}")]
    Telemetry(String),

    #[error("no shadow manifest is being evaluated")]
    NoShadow,

    #[error("shadow manifest not promoted: {reason}")]
    GateNotPassed { reason: String },
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failure of a single attempt of a governed job
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    /// The job itself failed
    #[error(transparent)]
    Task(E),

    /// The attempt ran past the budget's timeout
    #[error("attempt exceeded timeout of {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The dependency's circuit rejected the attempt
    #[error(transparent)]
    CircuitOpen(ReflexCircuitOpenError),
}

impl<E: ClassifiedError> ClassifiedError for AttemptError<E> {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            AttemptError::Task(e) => e.error_code(),
            AttemptError::Timeout { .. } => Some(ErrorCode::BudgetTimeout),
            AttemptError::CircuitOpen(e) => e.error_code(),
        }
    }

    fn failure_kind(&self) -> FailureKind {
        match self {
            AttemptError::Task(e) => e.failure_kind(),
            AttemptError::Timeout { .. } => FailureKind::Timeout,
            AttemptError::CircuitOpen(_) => FailureKind::Other,
        }
    }
}

/// Why a job did not produce a value.
///
/// Enforcement failures are per-job outcomes; none of them is fatal to the
/// runtime.
#[derive(Debug, Error)]
pub enum ExecutionError<E> {
    /// The job's risk class requires an approval the context lacks
    #[error("job {job_id} requires approval before it may run")]
    ApprovalRequired {
        job_id: JobId,
        risk_class: Option<String>,
    },

    /// The job is suspended and its cooldown has not expired
    #[error("job {job_id} is suspended until {until}")]
    Suspended {
        job_id: JobId,
        until: chrono::DateTime<chrono::Utc>,
    },

    /// The job failed with a non-retriable error
    #[error(transparent)]
    Task(E),

    /// The last attempt ran out of time
    #[error("attempt exceeded timeout of {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Every allowed attempt failed
    #[error("{error}")]
    RetryExhausted {
        #[source]
        error: BudgetRetryExhaustedError,
        last: AttemptError<E>,
    },

    /// The dependency's circuit is open
    #[error(transparent)]
    CircuitOpen(ReflexCircuitOpenError),

    /// The caller cancelled the job
    #[error("job cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    /// A corrective action for the failure did not take effect
    #[error("{source} (while handling: {cause})")]
    Reflex {
        #[source]
        source: ReflexActionFailedError,
        cause: String,
    },
}

impl<E> From<AttemptError<E>> for ExecutionError<E> {
    fn from(err: AttemptError<E>) -> Self {
        match err {
            AttemptError::Task(e) => ExecutionError::Task(e),
            AttemptError::Timeout { timeout_ms } => ExecutionError::Timeout { timeout_ms },
            AttemptError::CircuitOpen(e) => ExecutionError::CircuitOpen(e),
        }
    }
}

impl<E: ClassifiedError> ClassifiedError for ExecutionError<E> {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ExecutionError::ApprovalRequired { .. } => Some(ErrorCode::ApprovalRequired),
            ExecutionError::Suspended { .. } => None,
            ExecutionError::Task(e) => e.error_code(),
            ExecutionError::Timeout { .. } => Some(ErrorCode::BudgetTimeout),
            ExecutionError::RetryExhausted { error, .. } => error.error_code(),
            ExecutionError::CircuitOpen(e) => e.error_code(),
            ExecutionError::Cancelled { .. } => Some(ErrorCode::Cancelled),
            ExecutionError::Reflex { source, .. } => source.error_code(),
        }
    }

    fn failure_kind(&self) -> FailureKind {
        match self {
            ExecutionError::Task(e) => e.failure_kind(),
            ExecutionError::Timeout { .. } => FailureKind::Timeout,
            ExecutionError::Cancelled { .. } => FailureKind::Cancelled,
            _ => FailureKind::Other,
        }
    }
}
