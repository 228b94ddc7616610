//! In-process warehouse with the same contract as the Postgres one.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lakeload_types::dataset::{Dataset, Value};
use lakeload_types::error::EtlError;
use lakeload_types::schema::{TableName, TableSchema};

use super::{check_compatibility, coerce_value, type_map, EnsuredTable, ExistingColumn, Warehouse};

/// A table held by [`MemoryWarehouse`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<ExistingColumn>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<(String, String), MemoryTable>,
    /// Fail any write after this many rows have been staged.
    fail_writes_after: Option<usize>,
    ensure_calls: usize,
    write_calls: usize,
}

/// Warehouse backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<MemoryState>,
}

fn key(table: &TableName) -> (String, String) {
    (table.schema.clone(), table.name.clone())
}

impl MemoryWarehouse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, EtlError> {
        self.state
            .lock()
            .map_err(|_| EtlError::Load("memory warehouse lock poisoned".to_string()))
    }

    /// Pre-create a table with the given catalog columns.
    pub fn create_table(&self, table: &TableName, columns: &[(&str, &str)]) {
        let columns = columns
            .iter()
            .map(|(name, data_type)| ExistingColumn {
                name: (*name).to_string(),
                data_type: (*data_type).to_string(),
                nullable: true,
            })
            .collect();
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .insert(
                key(table),
                MemoryTable {
                    columns,
                    rows: Vec::new(),
                },
            );
    }

    /// Make every subsequent write fail once `rows` rows have been staged.
    pub fn fail_writes_after(&self, rows: usize) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).fail_writes_after = Some(rows);
    }

    /// Snapshot of a table, if it exists.
    #[must_use]
    pub fn table(&self, table: &TableName) -> Option<MemoryTable> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .get(&key(table))
            .cloned()
    }

    /// Number of `(ensure_table, write)` calls received.
    #[must_use]
    pub fn call_counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.ensure_calls, state.write_calls)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_table(
        &self,
        table: &TableName,
        schema: &TableSchema,
    ) -> Result<EnsuredTable, EtlError> {
        let mut state = self.lock()?;
        state.ensure_calls += 1;
        if let Some(existing) = state.tables.get(&key(table)) {
            return check_compatibility(table, schema, &existing.columns);
        }

        let columns = schema
            .columns
            .iter()
            .map(|c| ExistingColumn {
                name: c.name.clone(),
                data_type: type_map::ddl_type(c.column_type).to_lowercase(),
                nullable: c.nullable,
            })
            .collect();
        state.tables.insert(
            key(table),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
        tracing::info!(table = %table, "Created in-memory table");
        Ok(EnsuredTable::created_from(schema))
    }

    async fn write(
        &self,
        table: &TableName,
        dataset: &Dataset,
        target: &EnsuredTable,
    ) -> Result<u64, EtlError> {
        let mut state = self.lock()?;
        state.write_calls += 1;
        if dataset.is_empty() {
            return Ok(0);
        }
        let fail_after = state.fail_writes_after;
        let Some(stored) = state.tables.get_mut(&key(table)) else {
            return Err(EtlError::Load(format!("table {table} does not exist")));
        };
        let targets = target.targets_for(table, dataset)?;

        // Stage every row first so a failure leaves the table untouched.
        let mut staged = Vec::with_capacity(dataset.num_rows());
        for (index, row) in dataset.rows().iter().enumerate() {
            if fail_after.is_some_and(|limit| index >= limit) {
                return Err(EtlError::Load(format!(
                    "insert into {table} failed after {index} row(s), rolled back"
                )));
            }
            let mut by_name: BTreeMap<&str, Value> = BTreeMap::new();
            for (value, t) in row.iter().zip(&targets) {
                let coerced = coerce_value(value, t.column_type).map_err(|e| {
                    EtlError::Load(format!("insert into {table} column '{}': {e}", t.name))
                })?;
                by_name.insert(t.name.as_str(), coerced);
            }
            // Store in table column order.
            staged.push(
                stored
                    .columns
                    .iter()
                    .map(|c| by_name.remove(c.name.as_str()).unwrap_or(Value::Null))
                    .collect::<Vec<_>>(),
            );
        }

        let written = staged.len() as u64;
        stored.rows.extend(staged);
        Ok(written)
    }

    async fn ping(&self) -> Result<(), EtlError> {
        self.lock().map(|_| ())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeload_types::error::ErrorCategory;
    use lakeload_types::schema::{ColumnDescriptor, ColumnType};

    fn heart() -> TableName {
        TableName::new("public", "heart")
    }

    fn cleaned() -> (Dataset, TableSchema) {
        let ds = Dataset::from_rows(
            vec!["name".into(), "smoker".into()],
            vec![
                vec!["A".into(), Value::Int(1)],
                vec!["B".into(), Value::Int(0)],
            ],
        )
        .unwrap();
        let schema = TableSchema {
            columns: vec![
                ColumnDescriptor::new("name", ColumnType::String, false),
                ColumnDescriptor::new("smoker", ColumnType::Boolean, false),
            ],
            rows_observed: 2,
        };
        (ds, schema)
    }

    #[tokio::test]
    async fn creates_then_appends() {
        let wh = MemoryWarehouse::new();
        let (ds, schema) = cleaned();

        let ensured = wh.ensure_table(&heart(), &schema).await.unwrap();
        assert!(ensured.created);
        assert_eq!(wh.write(&heart(), &ds, &ensured).await.unwrap(), 2);

        let again = wh.ensure_table(&heart(), &schema).await.unwrap();
        assert!(!again.created);
        wh.write(&heart(), &ds, &again).await.unwrap();

        let table = wh.table(&heart()).unwrap();
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[0], vec![Value::from("A"), Value::Bool(true)]);
        assert_eq!(table.columns[1].data_type, "boolean");
    }

    #[tokio::test]
    async fn failed_write_leaves_table_unchanged() {
        let wh = MemoryWarehouse::new();
        let (ds, schema) = cleaned();
        let ensured = wh.ensure_table(&heart(), &schema).await.unwrap();
        wh.fail_writes_after(1);

        let err = wh.write(&heart(), &ds, &ensured).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Load);
        assert!(wh.table(&heart()).unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn existing_incompatible_table_conflicts() {
        let wh = MemoryWarehouse::new();
        wh.create_table(&heart(), &[("name", "text"), ("smoker", "timestamp")]);
        let (_, schema) = cleaned();

        let err = wh.ensure_table(&heart(), &schema).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::SchemaConflict);
    }

    #[tokio::test]
    async fn integer_column_receives_binary_encoding() {
        let wh = MemoryWarehouse::new();
        wh.create_table(&heart(), &[("smoker", "bigint"), ("name", "text")]);
        let (ds, schema) = cleaned();

        let ensured = wh.ensure_table(&heart(), &schema).await.unwrap();
        wh.write(&heart(), &ds, &ensured).await.unwrap();
        let table = wh.table(&heart()).unwrap();
        assert_eq!(table.rows[1], vec![Value::Int(0), Value::from("B")]);
    }

    #[tokio::test]
    async fn empty_write_is_noop() {
        let wh = MemoryWarehouse::new();
        let (ds, schema) = cleaned();
        let ensured = wh.ensure_table(&heart(), &schema).await.unwrap();
        let written = wh.write(&heart(), &ds.emptied(), &ensured).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(wh.call_counts(), (1, 1));
    }
}
