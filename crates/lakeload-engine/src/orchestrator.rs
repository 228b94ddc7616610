//! Pipeline orchestrator: runs one snapshot through extract, filter,
//! clean, schema, load, and checkpoint advance.
//!
//! The checkpoint is read at the start of a run and written only after
//! the load succeeded. Any failure aborts the run with the checkpoint
//! untouched, so the next run reprocesses the same records.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use lakeload_state::CheckpointStore;
use lakeload_types::checkpoint::{Checkpoint, CheckpointKey};
use lakeload_types::error::EtlError;
use lakeload_types::schema::TableName;

use crate::clean::{clean, write_csv};
use crate::config::types::{PipelineConfig, DEFAULT_CURSOR_FIELD};
use crate::errors::{PipelineError, RunStep};
use crate::execution::ExecutionOptions;
use crate::extract::{filter_by_checkpoint, Extractor};
use crate::loader::{PostgresWarehouse, Warehouse};
use crate::resolve::{create_checkpoint_store, source_object};
use crate::result::{CheckResult, CheckStatus, RunCounts, RunReport};
use crate::schema::synthesize;
use crate::storage::ObjectRef;

/// Source of the run start time.
pub type Clock = Arc<dyn Fn() -> Checkpoint + Send + Sync>;

/// One configured (source, destination) pipeline.
pub struct Pipeline {
    name: String,
    extractor: Extractor,
    cursor_field: String,
    cleaned_output: Option<ObjectRef>,
    checkpoints: Arc<dyn CheckpointStore>,
    checkpoint_key: CheckpointKey,
    warehouse: Arc<dyn Warehouse>,
    table: TableName,
    clock: Clock,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        extractor: Extractor,
        checkpoints: Arc<dyn CheckpointStore>,
        checkpoint_key: CheckpointKey,
        warehouse: Arc<dyn Warehouse>,
        table: TableName,
    ) -> Self {
        Self {
            name: name.into(),
            extractor,
            cursor_field: DEFAULT_CURSOR_FIELD.to_string(),
            cleaned_output: None,
            checkpoints,
            checkpoint_key,
            warehouse,
            table,
            clock: Arc::new(Checkpoint::now),
        }
    }

    #[must_use]
    pub fn with_cursor_field(mut self, cursor_field: impl Into<String>) -> Self {
        self.cursor_field = cursor_field.into();
        self
    }

    /// Also write the cleaned dataset to `output` on every run.
    #[must_use]
    pub fn with_cleaned_output(mut self, output: ObjectRef) -> Self {
        self.cleaned_output = Some(output);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn checkpoint_key(&self) -> &CheckpointKey {
        &self.checkpoint_key
    }

    #[must_use]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    fn fail(&self, step: RunStep, records_processed: usize, source: EtlError) -> PipelineError {
        tracing::error!(
            pipeline = self.name,
            step = %step,
            category = %source.category(),
            records_processed,
            error = %source,
            "Pipeline run failed"
        );
        PipelineError::Step {
            step,
            records_processed,
            source,
        }
    }

    /// Execute one run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Step`] naming the failed step. The
    /// checkpoint is unchanged whenever an error is returned.
    pub async fn run(&self, options: &ExecutionOptions) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let run_start = (self.clock)();
        let mut counts = RunCounts::default();

        tracing::info!(
            pipeline = self.name,
            table = %self.table,
            source = %self.extractor.source(),
            checkpoint_key = %self.checkpoint_key,
            dry_run = options.dry_run,
            "Starting pipeline run"
        );

        // START
        let previous = self
            .checkpoints
            .get_checkpoint(&self.checkpoint_key)
            .await
            .map_err(|e| self.fail(RunStep::Start, 0, e.into()))?;
        match previous {
            Some(cp) => tracing::info!(checkpoint = %cp, "Incremental load from checkpoint"),
            None => tracing::info!("No checkpoint found, performing full load"),
        }

        // EXTRACT
        let decoded = self
            .extractor
            .extract()
            .await
            .map_err(|e| self.fail(RunStep::Extract, 0, e))?;
        counts.records_extracted = decoded.dataset.num_rows();
        counts.malformed_rows_skipped = decoded.malformed_rows;

        // FILTER
        let filtered = filter_by_checkpoint(decoded.dataset, previous, &self.cursor_field);
        counts.records_selected = filtered.dataset.num_rows();
        counts.excluded_untimestamped = filtered.excluded_untimestamped;
        counts.excluded_not_newer = filtered.excluded_not_newer;
        tracing::info!(
            extracted = counts.records_extracted,
            selected = counts.records_selected,
            excluded_untimestamped = counts.excluded_untimestamped,
            "Records selected"
        );

        // CLEAN_VALIDATE
        let cleaned = clean(filtered.dataset)
            .map_err(|e| self.fail(RunStep::CleanValidate, counts.records_selected, e))?;
        counts.duplicates_removed = cleaned.duplicates_removed;
        counts.records_cleaned = cleaned.dataset.num_rows();
        let binary_columns: Vec<String> = cleaned.binary_columns.iter().cloned().collect();

        let schema = synthesize(&cleaned.dataset, &cleaned.binary_columns);

        if options.dry_run {
            tracing::info!(
                columns = schema.columns.len(),
                rows = counts.records_cleaned,
                "Dry run complete, warehouse and checkpoint untouched"
            );
            return Ok(RunReport {
                pipeline: self.name.clone(),
                table: self.table.to_string(),
                dry_run: true,
                counts,
                binary_columns,
                table_created: false,
                previous_checkpoint: previous,
                new_checkpoint: None,
                schema: Some(schema),
                duration_secs: started.elapsed().as_secs_f64(),
            });
        }

        if let Some(output) = &self.cleaned_output {
            let body = write_csv(&cleaned.dataset)
                .map_err(|e| self.fail(RunStep::WriteCleaned, counts.records_cleaned, e))?;
            output
                .put(Bytes::from(body))
                .await
                .map_err(|e| self.fail(RunStep::WriteCleaned, counts.records_cleaned, e))?;
            tracing::info!(output = %output, "Wrote cleaned dataset");
        }

        // ENSURE_SCHEMA
        let ensured = self
            .warehouse
            .ensure_table(&self.table, &schema)
            .await
            .map_err(|e| self.fail(RunStep::EnsureSchema, counts.records_cleaned, e))?;

        // LOAD
        counts.rows_written = self
            .warehouse
            .write(&self.table, &cleaned.dataset, &ensured)
            .await
            .map_err(|e| self.fail(RunStep::Load, counts.records_cleaned, e))?;

        // ADVANCE_CHECKPOINT
        let new_checkpoint = previous.map_or(run_start, |p| p.max(run_start));
        self.checkpoints
            .set_checkpoint(&self.checkpoint_key, new_checkpoint)
            .await
            .map_err(|e| self.fail(RunStep::AdvanceCheckpoint, counts.records_cleaned, e.into()))?;

        let duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            pipeline = self.name,
            table = %self.table,
            rows_written = counts.rows_written,
            table_created = ensured.created,
            checkpoint = %new_checkpoint,
            duration_secs,
            "Pipeline run completed"
        );

        Ok(RunReport {
            pipeline: self.name.clone(),
            table: self.table.to_string(),
            dry_run: false,
            counts,
            binary_columns,
            table_created: ensured.created,
            previous_checkpoint: previous,
            new_checkpoint: Some(new_checkpoint),
            schema: None,
            duration_secs,
        })
    }
}

/// Check a pipeline without running it: the source object is readable,
/// the checkpoint can be read, and the warehouse answers.
///
/// # Errors
///
/// Returns an error only if the configuration itself cannot be resolved;
/// probe failures are reported in the [`CheckResult`].
pub async fn check_pipeline(config: &PipelineConfig) -> anyhow::Result<CheckResult> {
    let warehouse = PostgresWarehouse::connect(&config.destination)
        .await
        .map(|wh| Arc::new(wh) as Arc<dyn Warehouse>);
    check_pipeline_with(config, warehouse).await
}

/// [`check_pipeline`] against an already-resolved warehouse connection.
///
/// # Errors
///
/// Returns an error only if the configuration itself cannot be resolved.
pub async fn check_pipeline_with(
    config: &PipelineConfig,
    warehouse: Result<Arc<dyn Warehouse>, EtlError>,
) -> anyhow::Result<CheckResult> {
    tracing::info!(pipeline = config.pipeline, "Checking pipeline configuration");

    let source = match source_object(config) {
        Ok(object) => match object.probe().await {
            Ok(size) => CheckStatus::Ok(format!("{object}, {size} bytes")),
            Err(e) => CheckStatus::Failed(e.to_string()),
        },
        Err(e) => CheckStatus::Failed(format!("{e:#}")),
    };

    let key = config.checkpoint_key();
    let state = match create_checkpoint_store(config) {
        Ok(store) => match store.get_checkpoint(&key).await {
            Ok(Some(cp)) => CheckStatus::Ok(format!("{}, checkpoint {cp}", store.describe())),
            Ok(None) => CheckStatus::Ok(format!("{}, no checkpoint yet", store.describe())),
            Err(e) => CheckStatus::Failed(EtlError::from(e).to_string()),
        },
        Err(e) => CheckStatus::Failed(format!("{e:#}")),
    };

    let warehouse = match warehouse {
        Ok(wh) => match wh.ping().await {
            Ok(()) => CheckStatus::Ok(wh.describe()),
            Err(e) => CheckStatus::Failed(e.to_string()),
        },
        Err(e) => CheckStatus::Failed(e.to_string()),
    };

    let result = CheckResult {
        source,
        state,
        warehouse,
    };
    if result.all_ok() {
        tracing::info!(pipeline = config.pipeline, "Pipeline check passed");
    } else {
        tracing::warn!(pipeline = config.pipeline, "Pipeline check found problems");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use lakeload_state::SqliteCheckpointStore;
    use lakeload_types::error::ErrorCategory;
    use object_store::memory::InMemory;
    use object_store::path::Path;

    use super::*;
    use crate::extract::CsvOptions;
    use crate::loader::MemoryWarehouse;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use lakeload_state::StateError;

    /// Checkpoint store whose reads or writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        stored: Mutex<Option<Checkpoint>>,
        fail_get: bool,
        fail_set: bool,
    }

    impl FlakyStore {
        fn current(&self) -> Option<Checkpoint> {
            *self.stored.lock().unwrap()
        }
    }

    #[async_trait]
    impl CheckpointStore for FlakyStore {
        async fn get_checkpoint(
            &self,
            key: &CheckpointKey,
        ) -> lakeload_state::error::Result<Option<Checkpoint>> {
            if self.fail_get {
                return Err(StateError::Corrupt {
                    key: key.to_string(),
                    reason: "not a timestamp".into(),
                });
            }
            Ok(self.current())
        }

        async fn set_checkpoint(
            &self,
            _key: &CheckpointKey,
            checkpoint: Checkpoint,
        ) -> lakeload_state::error::Result<()> {
            if self.fail_set {
                return Err(StateError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only bucket",
                )));
            }
            *self.stored.lock().unwrap() = Some(checkpoint);
            Ok(())
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    async fn pipeline_with_store(
        csv: &'static str,
        store: Arc<FlakyStore>,
    ) -> (Pipeline, Arc<MemoryWarehouse>) {
        let source = ObjectRef::new(Arc::new(InMemory::new()), Path::from("raw.csv"));
        source.put(Bytes::from_static(csv.as_bytes())).await.unwrap();
        let warehouse = Arc::new(MemoryWarehouse::new());
        let pipeline = Pipeline::new(
            "test",
            Extractor::new(source, CsvOptions::default()),
            store,
            CheckpointKey::new("test"),
            warehouse.clone(),
            TableName::new("public", "t"),
        )
        .with_clock(Arc::new(|| at(12)));
        (pipeline, warehouse)
    }

    fn at(hour: u32) -> Checkpoint {
        Checkpoint::new(
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    async fn fixture(csv: &'static str) -> (Pipeline, Arc<SqliteCheckpointStore>, Arc<MemoryWarehouse>) {
        let source = ObjectRef::new(Arc::new(InMemory::new()), Path::from("raw.csv"));
        source.put(Bytes::from_static(csv.as_bytes())).await.unwrap();
        let store = Arc::new(SqliteCheckpointStore::in_memory().unwrap());
        let warehouse = Arc::new(MemoryWarehouse::new());
        let pipeline = Pipeline::new(
            "test",
            Extractor::new(source, CsvOptions::default()),
            store.clone(),
            CheckpointKey::new("test"),
            warehouse.clone(),
            TableName::new("public", "t"),
        )
        .with_clock(Arc::new(|| at(12)));
        (pipeline, store, warehouse)
    }

    #[tokio::test]
    async fn test_checkpoint_never_moves_backwards() {
        let (pipeline, store, _) = fixture("id,last_modified\n1,2030-01-01 00:00:00\n").await;
        store
            .set_checkpoint(&CheckpointKey::new("test"), at(18))
            .await
            .unwrap();

        let report = pipeline.run(&ExecutionOptions::default()).await.unwrap();
        assert_eq!(report.new_checkpoint, Some(at(18)));
        assert_eq!(report.counts.rows_written, 1);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let (pipeline, store, warehouse) = fixture("id,smoker\n1,Yes\n2,No\n").await;
        let report = pipeline
            .run(&ExecutionOptions { dry_run: true })
            .await
            .unwrap();

        assert!(report.dry_run);
        assert!(report.new_checkpoint.is_none());
        assert_eq!(report.schema.unwrap().columns.len(), 2);
        assert_eq!(warehouse.call_counts(), (0, 0));
        assert!(store
            .get_checkpoint(&CheckpointKey::new("test"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failed_load_reports_step_and_count() {
        let (pipeline, store, warehouse) = fixture("id\n1\n2\n3\n").await;
        warehouse.fail_writes_after(2);

        let err = pipeline.run(&ExecutionOptions::default()).await.unwrap_err();
        assert_eq!(err.step(), Some(RunStep::Load));
        assert_eq!(err.category(), Some(ErrorCategory::Load));
        assert!(matches!(err, PipelineError::Step { records_processed: 3, .. }));
        assert!(store
            .get_checkpoint(&CheckpointKey::new("test"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cleaned_output_is_written() {
        let (pipeline, _, _) = fixture("name,smoker\nA,Yes\nA,Yes\n").await;
        let out = ObjectRef::new(Arc::new(InMemory::new()), Path::from("clean/out.csv"));
        let pipeline = pipeline.with_cleaned_output(out.clone());

        pipeline.run(&ExecutionOptions::default()).await.unwrap();
        let body = out.fetch().await.unwrap();
        assert_eq!(&body[..], b"name,smoker\nA,1\n");
    }

    #[tokio::test]
    async fn test_check_reports_each_component() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("heart.csv"), "id\n1\n").unwrap();
        let yaml = format!(
            "version: \"1.0\"\npipeline: heart\nsource:\n  location: {}\n\
             destination:\n  host: localhost\n  database: db\n  user: u\n  table: t\n\
             state:\n  backend: sqlite\n  path: {}\n",
            dir.path().join("heart.csv").display(),
            dir.path().join("state.db").display(),
        );
        let config = crate::config::parser::parse_pipeline_str(&yaml).unwrap();

        let ok = check_pipeline_with(&config, Ok(Arc::new(MemoryWarehouse::new())))
            .await
            .unwrap();
        assert!(ok.all_ok(), "{ok:?}");
        assert!(matches!(&ok.state, CheckStatus::Ok(s) if s.contains("no checkpoint yet")));

        let down = check_pipeline_with(
            &config,
            Err(EtlError::transient_io("connect", "connection refused")),
        )
        .await
        .unwrap();
        assert!(down.source.is_ok());
        assert!(!down.warehouse.is_ok());
    }

    #[tokio::test]
    async fn test_unreadable_checkpoint_aborts_at_start() {
        let store = Arc::new(FlakyStore {
            stored: Mutex::new(Some(at(6))),
            fail_get: true,
            ..FlakyStore::default()
        });
        let (pipeline, warehouse) =
            pipeline_with_store("id,last_modified\n1,2030-01-01 00:00:00\n", store.clone()).await;

        let err = pipeline.run(&ExecutionOptions::default()).await.unwrap_err();
        assert_eq!(err.step(), Some(RunStep::Start));
        assert_eq!(err.category(), Some(ErrorCategory::Parse));
        assert!(matches!(err, PipelineError::Step { records_processed: 0, .. }));
        assert_eq!(warehouse.call_counts(), (0, 0));
        assert_eq!(store.current(), Some(at(6)));
    }

    #[tokio::test]
    async fn test_failed_checkpoint_write_fails_the_run() {
        let store = Arc::new(FlakyStore {
            stored: Mutex::new(Some(at(6))),
            fail_set: true,
            ..FlakyStore::default()
        });
        let (pipeline, warehouse) =
            pipeline_with_store("id,last_modified\n1,2030-01-01 00:00:00\n", store.clone()).await;

        let err = pipeline.run(&ExecutionOptions::default()).await.unwrap_err();
        assert_eq!(err.step(), Some(RunStep::AdvanceCheckpoint));
        assert_eq!(err.category(), Some(ErrorCategory::TransientIo));
        // The rows landed; the next run reprocesses them from the old checkpoint.
        assert_eq!(warehouse.call_counts(), (1, 1));
        assert_eq!(store.current(), Some(at(6)));
    }
}
