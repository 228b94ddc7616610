//! Component resolution: checkpoint store, source and output objects,
//! warehouse, and the assembled pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use lakeload_state::{CheckpointStore, ObjectStoreCheckpointStore, SqliteCheckpointStore};

use crate::config::types::{PipelineConfig, StateBackendKind};
use crate::errors::{PipelineError, RunStep};
use crate::extract::{CsvOptions, Extractor};
use crate::execution::ExecutionOptions;
use crate::loader::{DetachedWarehouse, PostgresWarehouse, Warehouse};
use crate::orchestrator::Pipeline;
use crate::storage::{create_read_store, create_write_store, Location, ObjectRef};

fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lakeload").join("state.db")
}

/// Open the checkpoint store selected by `state.backend`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or its location is invalid.
pub fn create_checkpoint_store(config: &PipelineConfig) -> Result<Arc<dyn CheckpointStore>> {
    match config.state.backend {
        StateBackendKind::Sqlite => {
            let path = config.state.path.clone().unwrap_or_else(default_state_path);
            let store = SqliteCheckpointStore::open(&path)
                .with_context(|| format!("Failed to open state DB {}", path.display()))?;
            Ok(Arc::new(store) as Arc<dyn CheckpointStore>)
        }
        StateBackendKind::ObjectStore => {
            let raw = config
                .state
                .location
                .as_deref()
                .context("state.location is required for the object_store backend")?;
            let location = Location::parse(raw)?;
            let store = create_write_store(&location, config.state.region.as_deref())?;
            Ok(Arc::new(ObjectStoreCheckpointStore::new(store)) as Arc<dyn CheckpointStore>)
        }
    }
}

/// Resolve the source snapshot object.
///
/// # Errors
///
/// Returns an error if the location is invalid or its store cannot be created.
pub fn source_object(config: &PipelineConfig) -> Result<ObjectRef> {
    let location = Location::parse(&config.source.location)?;
    let store = create_read_store(&location, config.source.region.as_deref())?;
    Ok(ObjectRef::new(store, location.object_path().clone()))
}

/// Resolve the cleaned-output object, if configured.
///
/// # Errors
///
/// Returns an error if the location is invalid or its store cannot be created.
pub fn cleaned_output_object(config: &PipelineConfig) -> Result<Option<ObjectRef>> {
    let Some(output) = &config.cleaned_output else {
        return Ok(None);
    };
    let location = Location::parse(&output.location)?;
    let store = create_write_store(&location, output.region.as_deref())?;
    Ok(Some(ObjectRef::new(store, location.object_path().clone())))
}

/// Assemble a pipeline from config around an already-connected warehouse.
///
/// # Errors
///
/// Returns an error if the source, output, or checkpoint store cannot be resolved.
pub fn build_pipeline_with_warehouse(
    config: &PipelineConfig,
    warehouse: Arc<dyn Warehouse>,
) -> Result<Pipeline> {
    let extractor = Extractor::new(source_object(config)?, CsvOptions::from_source(&config.source));
    let checkpoints = create_checkpoint_store(config)?;

    let mut pipeline = Pipeline::new(
        &config.pipeline,
        extractor,
        checkpoints,
        config.checkpoint_key(),
        warehouse,
        config.destination.table_name(),
    )
    .with_cursor_field(config.source.cursor_field());

    if let Some(output) = cleaned_output_object(config)? {
        pipeline = pipeline.with_cleaned_output(output);
    }
    Ok(pipeline)
}

/// Assemble a pipeline from config, connecting to the configured warehouse.
///
/// Dry runs never connect: the pipeline gets a [`DetachedWarehouse`].
///
/// # Errors
///
/// A warehouse connection failure is reported as a failed `start` step so
/// its transient category is preserved; other resolution failures are
/// [`PipelineError::Infrastructure`].
pub async fn build_pipeline(
    config: &PipelineConfig,
    options: &ExecutionOptions,
) -> Result<Pipeline, PipelineError> {
    let warehouse: Arc<dyn Warehouse> = if options.dry_run {
        let dest = &config.destination;
        Arc::new(DetachedWarehouse::new(format!(
            "{}:{}/{}",
            dest.host, dest.port, dest.database
        )))
    } else {
        let connected = PostgresWarehouse::connect(&config.destination)
            .await
            .map_err(|source| PipelineError::Step {
                step: RunStep::Start,
                records_processed: 0,
                source,
            })?;
        Arc::new(connected)
    };
    build_pipeline_with_warehouse(config, warehouse).map_err(PipelineError::Infrastructure)
}
