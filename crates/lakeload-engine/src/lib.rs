//! Incremental object-storage to warehouse ETL engine.
//!
//! A [`Pipeline`] moves one delimited-text snapshot into a warehouse table:
//! it selects the records newer than the stored checkpoint, cleans and
//! validates them, creates the table if needed, appends the rows, and only
//! then advances the checkpoint.

pub mod clean;
pub mod config;
pub mod errors;
pub mod execution;
pub mod extract;
pub mod loader;
pub mod orchestrator;
pub mod resolve;
pub mod result;
pub mod schema;
pub mod storage;

// Re-export public API for convenience
pub use errors::{PipelineError, RunStep};
pub use execution::ExecutionOptions;
pub use orchestrator::{check_pipeline, Pipeline};
pub use resolve::build_pipeline;
pub use result::{CheckResult, RunReport};
