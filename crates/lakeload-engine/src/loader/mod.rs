//! Warehouse loading: table creation, compatibility checks, and
//! all-or-nothing appends.

pub mod memory;
pub mod postgres;
pub mod type_map;

use std::collections::HashSet;

use async_trait::async_trait;
use lakeload_types::checkpoint::parse_timestamp;
use lakeload_types::dataset::{Dataset, Value};
use lakeload_types::error::EtlError;
use lakeload_types::schema::{ColumnType, TableName, TableSchema};

pub use memory::MemoryWarehouse;
pub use postgres::PostgresWarehouse;

/// Timestamp layout written to the warehouse.
const TIMESTAMP_RENDER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A column as reported by the warehouse catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingColumn {
    pub name: String,
    /// Catalog type name, e.g. `bigint` or `character varying`.
    pub data_type: String,
    pub nullable: bool,
}

/// Column a write binds values into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    pub name: String,
    pub column_type: ColumnType,
    /// SQL type values are cast to on insert.
    pub sql_type: String,
}

/// Result of [`Warehouse::ensure_table`]: the effective column types used
/// for writing and whether the table was just created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredTable {
    pub columns: Vec<TargetColumn>,
    pub created: bool,
}

impl EnsuredTable {
    /// Targets for a freshly created table.
    #[must_use]
    pub fn created_from(schema: &TableSchema) -> Self {
        Self {
            columns: schema
                .columns
                .iter()
                .map(|c| TargetColumn {
                    name: c.name.clone(),
                    column_type: c.column_type,
                    sql_type: type_map::ddl_type(c.column_type).to_string(),
                })
                .collect(),
            created: true,
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&TargetColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Targets in the order of `dataset`'s columns.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Load`] if a dataset column has no target.
    pub fn targets_for<'a>(
        &'a self,
        table: &TableName,
        dataset: &Dataset,
    ) -> Result<Vec<&'a TargetColumn>, EtlError> {
        dataset
            .columns()
            .iter()
            .map(|name| {
                self.column(name).ok_or_else(|| {
                    EtlError::Load(format!("table {table} has no column '{name}'"))
                })
            })
            .collect()
    }
}

/// Destination warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create `table` from `schema` if absent, otherwise verify that the
    /// existing table can hold the data.
    async fn ensure_table(
        &self,
        table: &TableName,
        schema: &TableSchema,
    ) -> Result<EnsuredTable, EtlError>;

    /// Append every row of `dataset` in a single transaction.
    ///
    /// Returns the number of rows written. Any failure leaves the table
    /// unchanged.
    async fn write(
        &self,
        table: &TableName,
        dataset: &Dataset,
        target: &EnsuredTable,
    ) -> Result<u64, EtlError>;

    /// Verify connectivity.
    async fn ping(&self) -> Result<(), EtlError>;

    fn describe(&self) -> String;
}

/// Placeholder for runs that must never reach the warehouse (dry runs).
///
/// Every operation fails, so an accidental call surfaces as an error
/// instead of a connection attempt.
#[derive(Debug, Clone)]
pub struct DetachedWarehouse {
    label: String,
}

impl DetachedWarehouse {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    fn refuse(&self, operation: &str) -> EtlError {
        EtlError::Load(format!(
            "{operation} on {} refused: warehouse is not connected in dry-run mode",
            self.label
        ))
    }
}

#[async_trait]
impl Warehouse for DetachedWarehouse {
    async fn ensure_table(
        &self,
        table: &TableName,
        _schema: &TableSchema,
    ) -> Result<EnsuredTable, EtlError> {
        Err(self.refuse(&format!("ensure table {table}")))
    }

    async fn write(
        &self,
        table: &TableName,
        _dataset: &Dataset,
        _target: &EnsuredTable,
    ) -> Result<u64, EtlError> {
        Err(self.refuse(&format!("write to {table}")))
    }

    async fn ping(&self) -> Result<(), EtlError> {
        Err(self.refuse("ping"))
    }

    fn describe(&self) -> String {
        format!("detached({})", self.label)
    }
}

/// Check an existing table against a synthesized schema.
///
/// The column-name sets must match. When the schema carries type evidence,
/// each existing column type must also accept the synthesized type. All
/// mismatches are reported together.
///
/// # Errors
///
/// Returns [`EtlError::SchemaConflict`] listing every mismatch.
pub fn check_compatibility(
    table: &TableName,
    schema: &TableSchema,
    existing: &[ExistingColumn],
) -> Result<EnsuredTable, EtlError> {
    let mut mismatches = Vec::new();
    let mut columns = Vec::with_capacity(schema.columns.len());

    for column in &schema.columns {
        let Some(found) = existing.iter().find(|e| e.name == column.name) else {
            mismatches.push(format!("column '{}' is missing from the table", column.name));
            continue;
        };
        let Some(family) = type_map::column_type_for(&found.data_type) else {
            mismatches.push(format!(
                "column '{}' has unsupported type '{}'",
                column.name, found.data_type
            ));
            continue;
        };
        if schema.has_type_evidence() && !family.accepts(column.column_type) {
            mismatches.push(format!(
                "column '{}' is {} in the table but {} in the data",
                column.name, found.data_type, column.column_type
            ));
            continue;
        }
        // Bind through the family's unbounded type: an explicit cast to a
        // bare catalog name like `character` would silently truncate, while
        // assignment into the real column rejects values that do not fit.
        columns.push(TargetColumn {
            name: column.name.clone(),
            column_type: family,
            sql_type: type_map::ddl_type(family).to_string(),
        });
    }

    let expected: HashSet<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    for column in existing {
        if !expected.contains(column.name.as_str()) {
            mismatches.push(format!(
                "table column '{}' is not present in the data",
                column.name
            ));
        }
    }

    if mismatches.is_empty() {
        Ok(EnsuredTable {
            columns,
            created: false,
        })
    } else {
        Err(EtlError::SchemaConflict {
            table: table.to_string(),
            mismatches,
        })
    }
}

/// Render a value as the text bound for a column of `column_type`.
///
/// Returns `None` for null. Boolean columns accept the cleaner's `1`/`0`
/// encoding; timestamps are normalized to UTC.
#[must_use]
pub fn render_value(value: &Value, column_type: ColumnType) -> Option<String> {
    match (value, column_type) {
        (Value::Null, _) => None,
        (Value::Int(i), ColumnType::Boolean) => Some((*i != 0).to_string()),
        (Value::Str(s), ColumnType::Timestamp) => Some(
            parse_timestamp(s).map_or_else(
                || s.clone(),
                |ts| ts.format(TIMESTAMP_RENDER_FORMAT).to_string(),
            ),
        ),
        (other, _) => Some(other.to_string()),
    }
}

/// Convert a value to the typed form a column of `column_type` stores.
///
/// # Errors
///
/// Returns a description of the value when it cannot be represented.
pub fn coerce_value(value: &Value, column_type: ColumnType) -> Result<Value, String> {
    let Some(text) = render_value(value, column_type) else {
        return Ok(Value::Null);
    };
    let invalid = || format!("invalid {column_type} value '{text}'");
    let coerced = match column_type {
        ColumnType::Integer => Value::Int(text.trim().parse().map_err(|_| invalid())?),
        ColumnType::Float => Value::Float(text.trim().parse().map_err(|_| invalid())?),
        ColumnType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Value::Bool(true),
            "false" | "f" | "0" | "no" | "n" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        ColumnType::Timestamp => {
            parse_timestamp(&text).ok_or_else(invalid)?;
            Value::Str(text)
        }
        ColumnType::String => Value::Str(text),
    };
    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeload_types::schema::ColumnDescriptor;

    fn table() -> TableName {
        TableName::new("public", "heart")
    }

    fn schema(columns: &[(&str, ColumnType)], rows_observed: usize) -> TableSchema {
        TableSchema {
            columns: columns
                .iter()
                .map(|(n, t)| ColumnDescriptor::new(*n, *t, false))
                .collect(),
            rows_observed,
        }
    }

    fn existing(columns: &[(&str, &str)]) -> Vec<ExistingColumn> {
        columns
            .iter()
            .map(|(n, t)| ExistingColumn {
                name: (*n).to_string(),
                data_type: (*t).to_string(),
                nullable: true,
            })
            .collect()
    }

    #[test]
    fn matching_table_is_compatible() {
        let ensured = check_compatibility(
            &table(),
            &schema(&[("id", ColumnType::Integer), ("name", ColumnType::String)], 3),
            &existing(&[("name", "character varying"), ("id", "bigint")]),
        )
        .unwrap();
        assert!(!ensured.created);
        assert_eq!(ensured.column("id").unwrap().sql_type, "BIGINT");
        assert_eq!(ensured.columns[0].name, "id");
    }

    #[test]
    fn bounded_character_columns_bind_as_unbounded_text() {
        // information_schema reports `character(10)` as bare `character`,
        // which as a cast target means char(1).
        let ensured = check_compatibility(
            &table(),
            &schema(
                &[
                    ("name", ColumnType::String),
                    ("code", ColumnType::String),
                    ("score", ColumnType::Integer),
                ],
                2,
            ),
            &existing(&[
                ("name", "character"),
                ("code", "character varying"),
                ("score", "numeric"),
            ]),
        )
        .unwrap();
        assert_eq!(ensured.column("name").unwrap().sql_type, "TEXT");
        assert_eq!(ensured.column("code").unwrap().sql_type, "TEXT");
        assert_eq!(ensured.column("score").unwrap().sql_type, "DOUBLE PRECISION");
    }

    #[test]
    fn widening_is_accepted() {
        let ensured = check_compatibility(
            &table(),
            &schema(
                &[("score", ColumnType::Integer), ("smoker", ColumnType::Boolean)],
                3,
            ),
            &existing(&[("score", "double precision"), ("smoker", "bigint")]),
        )
        .unwrap();
        assert_eq!(ensured.column("score").unwrap().column_type, ColumnType::Float);
        assert_eq!(ensured.column("smoker").unwrap().column_type, ColumnType::Integer);
    }

    #[test]
    fn every_mismatch_is_reported() {
        let err = check_compatibility(
            &table(),
            &schema(&[("id", ColumnType::Float), ("name", ColumnType::String)], 3),
            &existing(&[("id", "bigint"), ("extra", "text")]),
        )
        .unwrap_err();
        let EtlError::SchemaConflict { table, mismatches } = err else {
            panic!("expected schema conflict");
        };
        assert_eq!(table, "public.heart");
        assert_eq!(mismatches.len(), 3, "got: {mismatches:?}");
    }

    #[test]
    fn unknown_existing_type_conflicts() {
        let err = check_compatibility(
            &table(),
            &schema(&[("doc", ColumnType::String)], 1),
            &existing(&[("doc", "jsonb")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported type 'jsonb'"));
    }

    #[test]
    fn no_type_evidence_compares_names_only() {
        let ensured = check_compatibility(
            &table(),
            &schema(&[("id", ColumnType::String)], 0),
            &existing(&[("id", "bigint")]),
        )
        .unwrap();
        assert_eq!(ensured.column("id").unwrap().column_type, ColumnType::Integer);
    }

    #[test]
    fn render_boolean_from_binary_encoding() {
        assert_eq!(
            render_value(&Value::Int(1), ColumnType::Boolean).as_deref(),
            Some("true")
        );
        assert_eq!(
            render_value(&Value::Int(0), ColumnType::Boolean).as_deref(),
            Some("false")
        );
        assert_eq!(
            render_value(&Value::Int(1), ColumnType::Integer).as_deref(),
            Some("1")
        );
        assert_eq!(render_value(&Value::Null, ColumnType::String), None);
    }

    #[test]
    fn render_timestamp_normalizes_to_utc() {
        assert_eq!(
            render_value(&Value::from("2024-03-01T12:30:05+02:00"), ColumnType::Timestamp)
                .as_deref(),
            Some("2024-03-01 10:30:05")
        );
    }

    #[test]
    fn coerce_rejects_unrepresentable_values() {
        assert_eq!(
            coerce_value(&Value::from("42"), ColumnType::Integer),
            Ok(Value::Int(42))
        );
        assert_eq!(
            coerce_value(&Value::Int(1), ColumnType::Boolean),
            Ok(Value::Bool(true))
        );
        assert!(coerce_value(&Value::from("abc"), ColumnType::Float).is_err());
    }

    #[tokio::test]
    async fn detached_warehouse_refuses_every_call() {
        let wh = DetachedWarehouse::new("db.internal:5439/analytics");
        let schema = schema(&[("id", ColumnType::Integer)], 1);
        let err = wh.ensure_table(&table(), &schema).await.unwrap_err();
        assert!(err.to_string().contains("dry-run"), "got: {err}");
        assert!(wh.ping().await.is_err());
        assert_eq!(wh.describe(), "detached(db.internal:5439/analytics)");
    }

    #[test]
    fn targets_follow_dataset_order() {
        let ensured = EnsuredTable::created_from(&schema(
            &[("a", ColumnType::Integer), ("b", ColumnType::String)],
            1,
        ));
        let ds = Dataset::new(vec!["b".into(), "a".into()]);
        let targets = ensured.targets_for(&table(), &ds).unwrap();
        assert_eq!(targets[0].sql_type, "TEXT");
        assert_eq!(targets[1].sql_type, "BIGINT");

        let missing = Dataset::new(vec!["zzz".into()]);
        assert!(ensured.targets_for(&table(), &missing).is_err());
    }
}
