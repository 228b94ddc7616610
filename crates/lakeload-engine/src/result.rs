//! Pipeline run and check result types.

use lakeload_types::checkpoint::Checkpoint;
use lakeload_types::schema::TableSchema;
use serde::Serialize;

/// Record counts for one run, in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub records_extracted: usize,
    pub malformed_rows_skipped: usize,
    pub records_selected: usize,
    /// Excluded by the incremental filter for lacking a cursor timestamp.
    pub excluded_untimestamped: usize,
    /// Excluded by the incremental filter as not newer than the checkpoint.
    pub excluded_not_newer: usize,
    pub duplicates_removed: usize,
    pub records_cleaned: usize,
    pub rows_written: u64,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub table: String,
    pub dry_run: bool,
    pub counts: RunCounts,
    pub binary_columns: Vec<String>,
    pub table_created: bool,
    pub previous_checkpoint: Option<Checkpoint>,
    /// `None` for dry runs, which never advance the checkpoint.
    pub new_checkpoint: Option<Checkpoint>,
    /// Synthesized schema, populated for dry runs.
    pub schema: Option<TableSchema>,
    pub duration_secs: f64,
}

impl RunReport {
    /// Whether the run started without a checkpoint and processed the full snapshot.
    #[must_use]
    pub fn is_full_load(&self) -> bool {
        self.previous_checkpoint.is_none()
    }
}

/// Outcome of one connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Ok(String),
    Failed(String),
}

impl CheckStatus {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok(detail) => write!(f, "OK ({detail})"),
            Self::Failed(reason) => write!(f, "FAILED\n  {reason}"),
        }
    }
}

/// Result of a pipeline check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub source: CheckStatus,
    pub state: CheckStatus,
    pub warehouse: CheckStatus,
}

impl CheckResult {
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.source.is_ok() && self.state.is_ok() && self.warehouse.is_ok()
    }
}
