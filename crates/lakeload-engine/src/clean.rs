//! Cleaning and validation of an extracted dataset.
//!
//! [`clean`] runs four steps in a fixed order: column-name normalization,
//! duplicate removal, binary categorical recoding, and completeness
//! validation. Data is never repaired silently; any missing value fails
//! the run.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use lakeload_types::dataset::{Dataset, Value};
use lakeload_types::error::{EtlError, ValidationFailure};

const BINARY_TRUE: &str = "Yes";
const BINARY_FALSE: &str = "No";

/// Cleaned dataset plus what the cleaner changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanOutcome {
    pub dataset: Dataset,
    /// Columns recoded from `"Yes"`/`"No"` to `1`/`0`.
    pub binary_columns: BTreeSet<String>,
    pub duplicates_removed: usize,
    pub renamed_columns: usize,
}

/// Clean and validate `dataset`.
///
/// # Errors
///
/// Returns [`EtlError::Validation`] when two column names collide after
/// normalization, a name normalizes to empty, or any value is missing.
pub fn clean(mut dataset: Dataset) -> Result<CleanOutcome, EtlError> {
    let renamed_columns = normalize_column_names(&mut dataset)?;
    let duplicates_removed = remove_duplicates(&mut dataset);
    let binary_columns = recode_binary_columns(&mut dataset);
    validate_completeness(&dataset)?;

    tracing::debug!(
        rows = dataset.num_rows(),
        renamed_columns,
        duplicates_removed,
        binary_columns = binary_columns.len(),
        "Dataset cleaned"
    );

    Ok(CleanOutcome {
        dataset,
        binary_columns,
        duplicates_removed,
        renamed_columns,
    })
}

/// Strip NUL characters from every column name.
fn normalize_column_names(dataset: &mut Dataset) -> Result<usize, ValidationFailure> {
    let normalized: Vec<String> = dataset
        .columns()
        .iter()
        .map(|name| name.replace('\0', ""))
        .collect();

    if let Some(position) = normalized.iter().position(String::is_empty) {
        return Err(ValidationFailure::EmptyColumnName { position });
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, name) in normalized.iter().enumerate() {
        groups.entry(name.as_str()).or_default().push(i);
    }
    // Report the collision involving the leftmost column.
    if let Some((name, positions)) = groups
        .iter()
        .filter(|(_, positions)| positions.len() > 1)
        .min_by_key(|(_, positions)| positions[0])
    {
        return Err(ValidationFailure::NamingConflict {
            normalized: (*name).to_string(),
            originals: positions
                .iter()
                .map(|&i| dataset.columns()[i].clone())
                .collect(),
        });
    }

    let mut renamed = 0;
    for (current, target) in dataset.columns_mut().iter_mut().zip(normalized) {
        if *current != target {
            *current = target;
            renamed += 1;
        }
    }
    Ok(renamed)
}

/// Drop rows equal to an earlier row, keeping first occurrences in order.
fn remove_duplicates(dataset: &mut Dataset) -> usize {
    let before = dataset.num_rows();
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(before);
        dataset.rows().iter().map(|row| seen.insert(row)).collect()
    };
    let mut keep = keep.into_iter();
    dataset.retain_rows(|_| keep.next().unwrap_or(true));
    before - dataset.num_rows()
}

fn is_binary_column(dataset: &Dataset, index: usize) -> bool {
    let mut observed = false;
    for value in dataset.column_values(index) {
        match value {
            Value::Null => {}
            Value::Str(s) if s == BINARY_TRUE || s == BINARY_FALSE => observed = true,
            _ => return false,
        }
    }
    observed
}

/// Recode columns whose non-null values are all `"Yes"`/`"No"`.
fn recode_binary_columns(dataset: &mut Dataset) -> BTreeSet<String> {
    let indices: Vec<usize> = (0..dataset.num_columns())
        .filter(|&i| is_binary_column(dataset, i))
        .collect();
    if indices.is_empty() {
        return BTreeSet::new();
    }

    for row in dataset.rows_mut() {
        for &i in &indices {
            let recoded = match &row[i] {
                Value::Str(s) => Value::Int(i64::from(s == BINARY_TRUE)),
                _ => continue,
            };
            row[i] = recoded;
        }
    }

    indices
        .into_iter()
        .map(|i| dataset.columns()[i].clone())
        .collect()
}

fn validate_completeness(dataset: &Dataset) -> Result<(), ValidationFailure> {
    for (index, column) in dataset.columns().iter().enumerate() {
        let mut missing = 0usize;
        let mut first_row = None;
        for (row, value) in dataset.column_values(index).enumerate() {
            if value.is_null() {
                missing += 1;
                first_row.get_or_insert(row);
            }
        }
        if let Some(first_row) = first_row {
            return Err(ValidationFailure::MissingValues {
                column: column.clone(),
                missing,
                first_row,
            });
        }
    }
    Ok(())
}

/// Serialize a dataset as comma-delimited text with a header row.
///
/// # Errors
///
/// Returns [`EtlError::TransientIo`] if the in-memory writer fails.
pub fn write_csv(dataset: &Dataset) -> Result<Vec<u8>, EtlError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(dataset.columns())
        .map_err(|e| EtlError::transient_io("write cleaned header", e))?;
    for row in dataset.rows() {
        writer
            .write_record(row.iter().map(ToString::to_string))
            .map_err(|e| EtlError::transient_io("write cleaned row", e))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::transient_io("flush cleaned output", e.into_error()))
}
