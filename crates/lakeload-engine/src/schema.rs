//! Destination schema synthesis from a cleaned dataset.

use std::collections::BTreeSet;

use lakeload_types::checkpoint::parse_timestamp;
use lakeload_types::dataset::{Dataset, Value};
use lakeload_types::schema::{ColumnDescriptor, ColumnType, TableSchema};

/// What one value could be stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observed {
    Bool,
    Int,
    /// Integer literal outside the i64 range.
    WideInt,
    Float,
    Timestamp,
    Text,
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn observe(value: &Value) -> Option<Observed> {
    let observed = match value {
        Value::Null => return None,
        Value::Bool(_) => Observed::Bool,
        Value::Int(_) => Observed::Int,
        Value::Float(f) if f.is_finite() => Observed::Float,
        Value::Float(_) => Observed::Text,
        Value::Str(raw) => {
            let s = raw.trim();
            if is_integer_literal(s) {
                if s.parse::<i64>().is_ok() {
                    Observed::Int
                } else {
                    Observed::WideInt
                }
            } else if s.bytes().any(|b| b.is_ascii_digit())
                && s.parse::<f64>().is_ok_and(f64::is_finite)
            {
                Observed::Float
            } else if parse_timestamp(s).is_some() {
                Observed::Timestamp
            } else {
                Observed::Text
            }
        }
    };
    Some(observed)
}

#[derive(Debug, Default)]
struct ColumnScan {
    seen: usize,
    nulls: usize,
    bools: usize,
    ints: usize,
    wide_ints: usize,
    floats: usize,
    timestamps: usize,
}

impl ColumnScan {
    fn record(&mut self, value: &Value) {
        match observe(value) {
            None => self.nulls += 1,
            Some(kind) => {
                self.seen += 1;
                match kind {
                    Observed::Bool => self.bools += 1,
                    Observed::Int => self.ints += 1,
                    Observed::WideInt => self.wide_ints += 1,
                    Observed::Float => self.floats += 1,
                    Observed::Timestamp => self.timestamps += 1,
                    Observed::Text => {}
                }
            }
        }
    }

    fn column_type(&self, binary: bool) -> ColumnType {
        if self.seen == 0 {
            return ColumnType::String;
        }
        if binary || self.bools == self.seen {
            return ColumnType::Boolean;
        }
        // Never store an out-of-range integer at float precision.
        if self.wide_ints > 0 {
            return ColumnType::String;
        }
        if self.ints == self.seen {
            ColumnType::Integer
        } else if self.ints + self.floats == self.seen {
            ColumnType::Float
        } else if self.timestamps == self.seen {
            ColumnType::Timestamp
        } else {
            ColumnType::String
        }
    }
}

/// Infer a destination schema from the observed values of `dataset`.
///
/// Columns in `binary_columns` were recoded to `1`/`0` by the cleaner and
/// are typed [`ColumnType::Boolean`]. A column with no observed values is
/// [`ColumnType::String`].
#[must_use]
pub fn synthesize(dataset: &Dataset, binary_columns: &BTreeSet<String>) -> TableSchema {
    let columns = dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let mut scan = ColumnScan::default();
            for value in dataset.column_values(index) {
                scan.record(value);
            }
            let column_type = scan.column_type(binary_columns.contains(name));
            ColumnDescriptor::new(name.clone(), column_type, scan.nulls > 0)
        })
        .collect();

    TableSchema {
        columns,
        rows_observed: dataset.num_rows(),
    }
}
