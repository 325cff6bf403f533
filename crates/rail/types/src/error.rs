//! Error taxonomy shared by the governance core
//!
//! Every error raised by the core carries an optional [`ErrorCode`]. The
//! code's [`ErrorMetadata`] decides whether a failure may be retried and
//! whether the immune system must hear about it. Errors without a code fall
//! back to their [`FailureKind`]: connection problems and timeouts are
//! transient, everything else is fatal.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Warning
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Structured error codes understood by the enforcement layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ManifestInvalidSchema,
    BudgetRetryExhausted,
    BudgetTimeout,
    ReflexCircuitOpen,
    ReflexActionFailed,
    ConnectionFailed,
    DependencyUnavailable,
    RateLimited,
    LlmProviderError,
    InvalidInput,
    PermissionDenied,
    ApprovalRequired,
    Cancelled,
    Internal,
}

/// Static policy attached to an [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorMetadata {
    pub retriable: bool,
    pub should_alert_immune: bool,
    pub severity: Severity,
}

impl ErrorMetadata {
    const fn new(retriable: bool, should_alert_immune: bool, severity: Severity) -> Self {
        Self {
            retriable,
            should_alert_immune,
            severity,
        }
    }
}

impl ErrorCode {
    /// The error metadata table.
    pub const fn metadata(&self) -> ErrorMetadata {
        match self {
            ErrorCode::ManifestInvalidSchema => ErrorMetadata::new(false, false, Severity::Error),
            ErrorCode::BudgetRetryExhausted => ErrorMetadata::new(false, true, Severity::Error),
            ErrorCode::BudgetTimeout => ErrorMetadata::new(true, false, Severity::Warning),
            ErrorCode::ReflexCircuitOpen => ErrorMetadata::new(false, false, Severity::Warning),
            ErrorCode::ReflexActionFailed => ErrorMetadata::new(false, true, Severity::Critical),
            ErrorCode::ConnectionFailed => ErrorMetadata::new(true, false, Severity::Warning),
            ErrorCode::DependencyUnavailable => ErrorMetadata::new(true, false, Severity::Warning),
            ErrorCode::RateLimited => ErrorMetadata::new(true, false, Severity::Warning),
            ErrorCode::LlmProviderError => ErrorMetadata::new(true, true, Severity::Warning),
            ErrorCode::InvalidInput => ErrorMetadata::new(false, false, Severity::Error),
            ErrorCode::PermissionDenied => ErrorMetadata::new(false, true, Severity::Error),
            ErrorCode::ApprovalRequired => ErrorMetadata::new(false, false, Severity::Info),
            ErrorCode::Cancelled => ErrorMetadata::new(false, false, Severity::Info),
            ErrorCode::Internal => ErrorMetadata::new(false, true, Severity::Critical),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ManifestInvalidSchema => "MANIFEST_INVALID_SCHEMA",
            ErrorCode::BudgetRetryExhausted => "BUDGET_RETRY_EXHAUSTED",
            ErrorCode::BudgetTimeout => "BUDGET_TIMEOUT",
            ErrorCode::ReflexCircuitOpen => "REFLEX_CIRCUIT_OPEN",
            ErrorCode::ReflexActionFailed => "REFLEX_ACTION_FAILED",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::LlmProviderError => "LLM_PROVIDER_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::ApprovalRequired => "APPROVAL_REQUIRED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure category used when an error carries no code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Timeout,
    Cancelled,
    Other,
}

impl FailureKind {
    /// Kinds on the retry allowlist
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Connection | FailureKind::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connection => write!(f, "connection"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Other => write!(f, "other"),
        }
    }
}

/// An error the enforcement layer knows how to classify.
pub trait ClassifiedError: std::error::Error + Send + Sync + 'static {
    /// Structured code, when the error has one
    fn error_code(&self) -> Option<ErrorCode> {
        None
    }

    /// Fallback category for errors without a code
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Other
    }

    fn is_retriable(&self) -> bool {
        match self.error_code() {
            Some(code) => code.metadata().retriable,
            None => self.failure_kind().is_transient(),
        }
    }

    fn should_alert_immune(&self) -> bool {
        self.error_code()
            .map(|code| code.metadata().should_alert_immune)
            .unwrap_or(false)
    }

    fn severity(&self) -> Severity {
        self.error_code()
            .map(|code| code.metadata().severity)
            .unwrap_or_default()
    }

    /// A cancelled operation is never counted as a failure
    fn is_cancellation(&self) -> bool {
        self.error_code() == Some(ErrorCode::Cancelled)
            || self.failure_kind() == FailureKind::Cancelled
    }

    /// Short label recorded in retry history
    fn error_type(&self) -> String {
        match self.error_code() {
            Some(code) => code.to_string(),
            None => self.failure_kind().to_string(),
        }
    }
}

impl ClassifiedError for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::AddrNotAvailable => FailureKind::Connection,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FailureKind::Timeout,
            ErrorKind::Interrupted => FailureKind::Cancelled,
            _ => FailureKind::Other,
        }
    }
}

impl ClassifiedError for tokio::time::error::Elapsed {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(ErrorCode::BudgetTimeout)
    }

    fn failure_kind(&self) -> FailureKind {
        FailureKind::Timeout
    }
}

/// General-purpose classified error for job closures
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskError {
    pub code: Option<ErrorCode>,
    pub kind: FailureKind,
    pub message: String,
}

impl TaskError {
    /// Unclassified failure; not retried
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            code: None,
            kind: FailureKind::Connection,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            code: None,
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            code: Some(ErrorCode::Cancelled),
            kind: FailureKind::Cancelled,
            message: "operation cancelled".into(),
        }
    }
}

impl ClassifiedError for TaskError {
    fn error_code(&self) -> Option<ErrorCode> {
        self.code
    }

    fn failure_kind(&self) -> FailureKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_table() {
        assert!(ErrorCode::ConnectionFailed.metadata().retriable);
        assert!(ErrorCode::BudgetTimeout.metadata().retriable);
        assert!(!ErrorCode::InvalidInput.metadata().retriable);
        assert!(!ErrorCode::ReflexCircuitOpen.metadata().retriable);
        assert!(ErrorCode::BudgetRetryExhausted.metadata().should_alert_immune);
        assert_eq!(
            ErrorCode::ReflexActionFailed.metadata().severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_code_serde_matches_display() {
        let json = serde_json::to_string(&ErrorCode::ReflexCircuitOpen).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorCode::ReflexCircuitOpen));
    }

    #[test]
    fn test_code_takes_precedence_over_kind() {
        let err = TaskError {
            code: Some(ErrorCode::InvalidInput),
            kind: FailureKind::Connection,
            message: "bad".into(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_kind_fallback() {
        assert!(TaskError::connection("refused").is_retriable());
        assert!(TaskError::timeout("slow").is_retriable());
        assert!(!TaskError::new("boom").is_retriable());
        assert!(TaskError::cancelled().is_cancellation());
    }

    #[test]
    fn test_io_error_classification() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(refused.is_retriable());
        assert_eq!(refused.error_type(), "connection");

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(!missing.is_retriable());
    }

    #[test]
    fn test_alert_policy() {
        let err = TaskError::with_code(ErrorCode::Internal, "corrupt state");
        assert!(err.should_alert_immune());
        assert_eq!(err.severity(), Severity::Critical);
        assert!(!TaskError::new("plain").should_alert_immune());
    }
}
