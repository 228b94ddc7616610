//! Checkpoint-based incremental selection.

use lakeload_types::checkpoint::{parse_timestamp, Checkpoint};
use lakeload_types::dataset::{Dataset, Value};

/// Records kept by [`filter_by_checkpoint`] plus what was dropped.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub dataset: Dataset,
    /// Rows dropped because the cursor was missing or not a timestamp.
    pub excluded_untimestamped: usize,
    /// Rows dropped because they are not newer than the checkpoint.
    pub excluded_not_newer: usize,
}

fn cursor_index(dataset: &Dataset, cursor_field: &str) -> Option<usize> {
    // Filtering runs before names are normalized, so compare NUL-stripped.
    dataset
        .columns()
        .iter()
        .position(|c| c.replace('\0', "") == cursor_field)
}

fn cursor_timestamp(value: &Value) -> Option<chrono::NaiveDateTime> {
    value.as_str().and_then(parse_timestamp)
}

/// Keep only records modified after `checkpoint`.
///
/// With no checkpoint the dataset is returned unchanged (full load).
/// Otherwise a record is kept only if its cursor value parses as a
/// timestamp strictly greater than the checkpoint. Records with a missing
/// or unparseable cursor are excluded, as are all records when the cursor
/// column is absent.
#[must_use]
pub fn filter_by_checkpoint(
    mut dataset: Dataset,
    checkpoint: Option<Checkpoint>,
    cursor_field: &str,
) -> FilterOutcome {
    let Some(checkpoint) = checkpoint else {
        return FilterOutcome {
            dataset,
            excluded_untimestamped: 0,
            excluded_not_newer: 0,
        };
    };

    let Some(index) = cursor_index(&dataset, cursor_field) else {
        let excluded = dataset.num_rows();
        if excluded > 0 {
            tracing::warn!(
                cursor_field,
                excluded,
                "Cursor column not found, excluding every record"
            );
        }
        return FilterOutcome {
            dataset: dataset.emptied(),
            excluded_untimestamped: excluded,
            excluded_not_newer: 0,
        };
    };

    let boundary = checkpoint.timestamp();
    let mut untimestamped = 0usize;
    let mut not_newer = 0usize;
    dataset.retain_rows(|row| match cursor_timestamp(&row[index]) {
        Some(ts) if ts > boundary => true,
        Some(_) => {
            not_newer += 1;
            false
        }
        None => {
            untimestamped += 1;
            false
        }
    });

    if untimestamped > 0 {
        tracing::warn!(
            cursor_field,
            excluded = untimestamped,
            "Excluded records without a parseable cursor timestamp"
        );
    }

    FilterOutcome {
        dataset,
        excluded_untimestamped: untimestamped,
        excluded_not_newer: not_newer,
    }
}
