//! Error types for the policy workspace.
//!
//! Every fallible operation returns `ZtnaResult<T>`. Variants carry enough
//! context for an editor or operator to act on them.

use thiserror::Error;

use crate::validation::ValidationReport;

/// The unified error type.
#[derive(Debug, Error)]
pub enum ZtnaError {
    /// A policy document could not be decoded: bad JSON, unknown
    /// condition type or operator, or a node that is both leaf and branch.
    #[error("malformed policy document: {reason}")]
    MalformedPolicy { reason: String },

    /// A decoded policy broke structural, value or targeting rules.
    #[error("policy '{subject}' failed validation: {}", .report.summary())]
    ValidationFailed {
        subject: String,
        report: ValidationReport,
    },

    /// A save carried a stale version. Reload and reapply the edit.
    #[error("version conflict on policy '{id}': expected version {expected}, stored version is {actual}")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    #[error("policy '{id}' not found")]
    PolicyNotFound { id: String },

    #[error("application '{id}' not found")]
    ApplicationNotFound { id: String },

    /// The persistence collaborator failed. Nothing was written.
    #[error("policy store error: {reason}")]
    StoreError { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// Access policies could not be compiled into gateway rules.
    #[error("gateway compilation failed: {reason}")]
    CompileError { reason: String },
}

/// Convenience alias used throughout the workspace.
pub type ZtnaResult<T> = Result<T, ZtnaError>;
