//! Execution mode types for pipeline runs.

/// Runtime execution options (not part of pipeline YAML config).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionOptions {
    /// Extract, clean, and synthesize the schema, then stop. The warehouse,
    /// checkpoint, and cleaned output are left untouched.
    pub dry_run: bool,
}
