//! Error types for rail-manifest.

use rail_types::{ClassifiedError, ErrorCode};
use std::path::PathBuf;
use thiserror::Error;

/// A manifest document failed parsing or validation.
///
/// Carries every problem found, not just the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid manifest schema: {}", .validation_errors.join("; "))]
pub struct ManifestInvalidSchemaError {
    pub validation_errors: Vec<String>,
}

impl ManifestInvalidSchemaError {
    pub fn new(validation_errors: Vec<String>) -> Self {
        Self { validation_errors }
    }

    pub fn single(error: impl Into<String>) -> Self {
        Self {
            validation_errors: vec![error.into()],
        }
    }
}

impl ClassifiedError for ManifestInvalidSchemaError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(ErrorCode::ManifestInvalidSchema)
    }
}

/// Errors that can occur while loading or activating manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Document is not a valid manifest.
    #[error(transparent)]
    InvalidSchema(#[from] ManifestInvalidSchemaError),

    /// Manifest file could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Successor does not link to the manifest it supersedes.
    #[error(
        "hash chain broken at version {version}: expected hash_prev {expected}, found {}",
        .found.as_deref().unwrap_or("none")
    )]
    ChainBroken {
        version: String,
        expected: String,
        found: Option<String>,
    },
}

impl ClassifiedError for ManifestError {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ManifestError::InvalidSchema(_) | ManifestError::ChainBroken { .. } => {
                Some(ErrorCode::ManifestInvalidSchema)
            }
            ManifestError::Io { .. } => Some(ErrorCode::InvalidInput),
        }
    }
}

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;
