//! Structured error model for pipeline steps.
//!
//! [`EtlError`] is the closed taxonomy every step reports through. None of
//! the variants is retried internally; retry policy belongs to whatever
//! invokes the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad classification of a pipeline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Storage or network access failure unrelated to data content.
    TransientIo,
    /// Source bytes could not be turned into a dataset.
    Parse,
    /// Data failed an integrity rule.
    Validation,
    /// Existing destination table is incompatible with the data.
    SchemaConflict,
    /// Warehouse write failed or was interrupted.
    Load,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TransientIo => "transient_io",
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::SchemaConflict => "schema_conflict",
            Self::Load => "load",
        };
        f.write_str(s)
    }
}

/// Integrity rule that rejected a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// Two source columns normalize to the same name.
    #[error("columns {originals:?} all normalize to '{normalized}'")]
    NamingConflict {
        normalized: String,
        originals: Vec<String>,
    },
    /// A column name is empty after normalization.
    #[error("column at position {position} has an empty name")]
    EmptyColumnName { position: usize },
    /// At least one record is missing a value.
    #[error("column '{column}' has {missing} missing value(s), first at row {first_row}")]
    MissingValues {
        column: String,
        missing: usize,
        first_row: usize,
    },
}

/// Error raised by any pipeline step.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("[transient_io] {context}: {source}")]
    TransientIo {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("[parse] {0}")]
    Parse(String),

    #[error("[validation] {0}")]
    Validation(#[from] ValidationFailure),

    #[error("[schema_conflict] table {table}: {}", .mismatches.join("; "))]
    SchemaConflict {
        table: String,
        mismatches: Vec<String>,
    },

    #[error("[load] {0}")]
    Load(String),
}

impl EtlError {
    /// Wrap a storage/network failure with a short description of the operation.
    pub fn transient_io(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::TransientIo {
            context: context.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientIo { .. } => ErrorCategory::TransientIo,
            Self::Parse(_) => ErrorCategory::Parse,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::SchemaConflict { .. } => ErrorCategory::SchemaConflict,
            Self::Load(_) => ErrorCategory::Load,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_matches_variant() {
        let io = EtlError::transient_io(
            "get source",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
        );
        assert_eq!(io.category(), ErrorCategory::TransientIo);
        assert_eq!(EtlError::Parse("x".into()).category(), ErrorCategory::Parse);
        assert_eq!(EtlError::Load("x".into()).category(), ErrorCategory::Load);
    }

    #[test]
    fn transient_io_display_includes_context_and_source() {
        let err = EtlError::transient_io("read checkpoint", "connection reset");
        let msg = err.to_string();
        assert!(msg.contains("transient_io"), "got: {msg}");
        assert!(msg.contains("read checkpoint"), "got: {msg}");
        assert!(msg.contains("connection reset"), "got: {msg}");
    }

    #[test]
    fn validation_display() {
        let err: EtlError = ValidationFailure::MissingValues {
            column: "age".into(),
            missing: 2,
            first_row: 4,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "[validation] column 'age' has 2 missing value(s), first at row 4"
        );
    }

    #[test]
    fn schema_conflict_lists_all_mismatches() {
        let err = EtlError::SchemaConflict {
            table: "public.t".into(),
            mismatches: vec!["missing column 'a'".into(), "unexpected column 'b'".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("missing column 'a'; unexpected column 'b'"), "got: {msg}");
    }

    #[test]
    fn validation_failure_serde_is_tagged() {
        let failure = ValidationFailure::EmptyColumnName { position: 3 };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["rule"], "empty_column_name");
        assert_eq!(json["position"], 3);
    }

    #[test]
    fn category_display_is_snake_case() {
        assert_eq!(ErrorCategory::SchemaConflict.to_string(), "schema_conflict");
    }
}
