//! Pipeline run error model.

use std::fmt;

use lakeload_types::error::{ErrorCategory, EtlError};
use serde::Serialize;

/// Stage of a pipeline run that can fail, in execution order.
///
/// Incremental filtering is infallible and has no step of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    Start,
    Extract,
    CleanValidate,
    WriteCleaned,
    EnsureSchema,
    Load,
    AdvanceCheckpoint,
}

impl RunStep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Extract => "extract",
            Self::CleanValidate => "clean_validate",
            Self::WriteCleaned => "write_cleaned",
            Self::EnsureSchema => "ensure_schema",
            Self::Load => "load",
            Self::AdvanceCheckpoint => "advance_checkpoint",
        }
    }
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a pipeline run.
///
/// `Step` carries the typed [`EtlError`] raised by a run step along with
/// where it happened and how many records had reached that step.
///
/// `Infrastructure` wraps setup failures (config, store construction,
/// warehouse connection) that happen before a run starts.
#[derive(Debug)]
pub enum PipelineError {
    Step {
        step: RunStep,
        records_processed: usize,
        source: EtlError,
    },
    Infrastructure(anyhow::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step {
                step,
                records_processed,
                source,
            } => write!(
                f,
                "step '{step}' failed after {records_processed} record(s): {source}"
            ),
            Self::Infrastructure(e) => write!(f, "{e:#}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Step { source, .. } => Some(source),
            Self::Infrastructure(e) => Some(&**e),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl PipelineError {
    #[must_use]
    pub fn step(&self) -> Option<RunStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            Self::Infrastructure(_) => None,
        }
    }

    /// Returns the typed step error if this is a `Step` variant.
    #[must_use]
    pub fn as_etl_error(&self) -> Option<&EtlError> {
        match self {
            Self::Step { source, .. } => Some(source),
            Self::Infrastructure(_) => None,
        }
    }

    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        self.as_etl_error().map(EtlError::category)
    }
}
