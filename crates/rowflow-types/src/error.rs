//! Structured error model for step operations.
//!
//! [`StepError`] carries classification and recoverability metadata.
//! Construct via the code-specific factory methods; the engine decides
//! routing (divert vs. abort) from the `recoverable` flag alone.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compact classification of a row or step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Invalid or unprocessable row content.
    Data,
    /// A value could not be converted to the required kind.
    Conversion,
    /// A referenced key or row was not found.
    Lookup,
    /// A required external resource failed or disappeared.
    Resource,
    /// Invalid step configuration.
    Config,
    /// Internal step error.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Data => "data",
            Self::Conversion => "conversion",
            Self::Lookup => "lookup",
            Self::Resource => "resource",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Structured error returned by a step's `init` or `process` call.
///
/// A `recoverable` error concerns a single row and may be diverted to
/// an error sink; a non-recoverable one aborts the whole graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct StepError {
    pub code: ErrorCode,
    pub message: String,
    /// Offending column, when the failure is attributable to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub recoverable: bool,
}

impl StepError {
    fn new(code: ErrorCode, recoverable: bool, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            recoverable,
        }
    }

    /// Invalid row content (recoverable).
    #[must_use]
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Data, true, message)
    }

    /// Failed value conversion (recoverable).
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conversion, true, message)
    }

    /// Missing lookup target (recoverable).
    #[must_use]
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Lookup, true, message)
    }

    /// Lost or failing external resource (fatal).
    #[must_use]
    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Resource, false, message)
    }

    /// Invalid step configuration (fatal).
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, false, message)
    }

    /// Internal step error (fatal).
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, false, message)
    }

    /// Attach the offending column name.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Diagnostic payload accompanying a row diverted to an error sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDiagnostic {
    /// Sequence number of the row within the owning step copy (1-based
    /// read position).
    pub row_number: u64,
    /// Offending column, if attributable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Error classification.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl RowDiagnostic {
    /// Build a diagnostic from a recoverable [`StepError`] and the row's
    /// read sequence number.
    #[must_use]
    pub fn from_error(row_number: u64, error: &StepError) -> Self {
        Self {
            row_number,
            field: error.field.clone(),
            code: error.code,
            message: error.message.clone(),
        }
    }
}
