//! Pipeline YAML configuration types.
//!
//! The field set is closed: unknown keys are rejected at parse time so a
//! misspelled option never silently falls back to a default.

use std::path::PathBuf;

use lakeload_types::checkpoint::CheckpointKey;
use lakeload_types::schema::TableName;
use serde::{Deserialize, Serialize};

use crate::storage::Location;

/// Cursor column consulted by the incremental filter when none is configured.
pub const DEFAULT_CURSOR_FIELD: &str = "last_modified";

/// Default warehouse port (Redshift).
pub const DEFAULT_WAREHOUSE_PORT: u16 = 5439;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub version: String,
    pub pipeline: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub cleaned_output: Option<OutputConfig>,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub state: StateConfig,
}

impl PipelineConfig {
    /// Identity the checkpoint for this pipeline is stored under.
    ///
    /// An explicit `state.key` wins. Otherwise the `object_store` backend
    /// uses the object path of `state.location`, and `sqlite` uses
    /// `<pipeline>/<schema>.<table>`.
    #[must_use]
    pub fn checkpoint_key(&self) -> CheckpointKey {
        if let Some(key) = &self.state.key {
            return CheckpointKey::new(key.clone());
        }
        match (self.state.backend, self.state.location.as_deref()) {
            (StateBackendKind::ObjectStore, Some(location)) => {
                if let Ok(parsed) = Location::parse(location) {
                    return CheckpointKey::new(parsed.object_path().to_string());
                }
                CheckpointKey::new(location)
            }
            _ => CheckpointKey::new(format!(
                "{}/{}",
                self.pipeline,
                self.destination.table_name()
            )),
        }
    }
}

/// Where the raw snapshot is read from and how to decode it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// `s3://bucket/key`, `file:///path`, or a bare filesystem path.
    pub location: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Single-character field delimiter. Sniffed from the header when unset.
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Cell values decoded as missing. Defaults to the common NA sentinels.
    #[serde(default)]
    pub null_values: Option<Vec<String>>,
    #[serde(default)]
    pub cursor_field: Option<String>,
}

impl SourceConfig {
    #[must_use]
    pub fn cursor_field(&self) -> &str {
        self.cursor_field.as_deref().unwrap_or(DEFAULT_CURSOR_FIELD)
    }
}

/// Optional drop location for the cleaned dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub location: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
}

impl DestinationConfig {
    #[must_use]
    pub fn table_name(&self) -> TableName {
        TableName::new(&self.schema, &self.table)
    }
}

fn default_port() -> u16 {
    DEFAULT_WAREHOUSE_PORT
}

fn default_schema() -> String {
    "public".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackendKind {
    /// Checkpoint stored as a single object (S3 or local filesystem).
    #[default]
    ObjectStore,
    /// Checkpoint stored in a local `SQLite` database.
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    /// Object location of the checkpoint (`object_store` backend).
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Database file (`sqlite` backend). Defaults to `~/.lakeload/state.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<String>,
}
