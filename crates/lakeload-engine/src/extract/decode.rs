//! Delimited-text decoding into a [`Dataset`].

use std::borrow::Cow;

use lakeload_types::dataset::{Dataset, Value};
use lakeload_types::error::EtlError;

use crate::config::types::SourceConfig;

/// Delimiters considered when none is configured.
const SNIFF_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Cell values treated as missing unless overridden.
pub const DEFAULT_NULL_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "None", "<NA>", "#N/A",
];

/// Malformed rows beyond this many are counted but not logged individually.
const MALFORMED_LOG_LIMIT: usize = 10;

/// Text encoding the source was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter; sniffed from the header line when `None`.
    pub delimiter: Option<u8>,
    pub null_values: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            null_values: DEFAULT_NULL_VALUES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CsvOptions {
    #[must_use]
    pub fn from_source(source: &SourceConfig) -> Self {
        let defaults = Self::default();
        Self {
            delimiter: source
                .delimiter
                .as_deref()
                .and_then(|d| d.as_bytes().first().copied()),
            null_values: source.null_values.clone().unwrap_or(defaults.null_values),
        }
    }

    fn is_null(&self, cell: &str) -> bool {
        self.null_values.iter().any(|n| n == cell)
    }
}

/// A decoded source snapshot.
#[derive(Debug, Clone)]
pub struct DecodedSource {
    pub dataset: Dataset,
    pub malformed_rows: usize,
    pub encoding: SourceEncoding,
    pub delimiter: u8,
}

fn decode_text(bytes: &[u8]) -> (Cow<'_, str>, SourceEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (Cow::Borrowed(text), SourceEncoding::Utf8),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => (
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
            SourceEncoding::Latin1,
        ),
    }
}

/// Pick the candidate delimiter occurring most often in the header line,
/// ignoring quoted sections. Falls back to `,`.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut counts = [0usize; SNIFF_CANDIDATES.len()];
    let mut in_quotes = false;
    for byte in header.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(i) = SNIFF_CANDIDATES.iter().position(|&c| c == byte) {
            counts[i] += 1;
        }
    }
    let mut best: Option<(usize, usize)> = None;
    for (i, &n) in counts.iter().enumerate() {
        if n > 0 && best.map_or(true, |(max, _)| n > max) {
            best = Some((n, i));
        }
    }
    best.map_or(b',', |(_, i)| SNIFF_CANDIDATES[i])
}

/// Decode a raw snapshot into a dataset.
///
/// Every non-missing cell becomes [`Value::Str`]; typing is left to the
/// schema synthesizer. Rows whose field count differs from the header are
/// skipped and counted.
///
/// # Errors
///
/// Returns [`EtlError::Parse`] if the source is empty or has no header row.
pub fn decode_source(bytes: &[u8], options: &CsvOptions) -> Result<DecodedSource, EtlError> {
    let (decoded, encoding) = decode_text(bytes);
    if encoding == SourceEncoding::Latin1 {
        tracing::warn!("Source is not valid UTF-8, decoded as Latin-1");
    }
    let text: &str = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);
    if text.trim().is_empty() {
        return Err(EtlError::Parse("source is empty".to_string()));
    }

    let delimiter = options.delimiter.unwrap_or_else(|| sniff_delimiter(text));
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| EtlError::Parse(format!("failed to read header row: {e}")))?
        .clone();
    if header.is_empty() {
        return Err(EtlError::Parse("source has no header row".to_string()));
    }
    let columns: Vec<String> = header.iter().map(ToString::to_string).collect();
    let width = columns.len();

    let mut dataset = Dataset::new(columns);
    let mut malformed_rows = 0usize;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                malformed_rows += 1;
                if malformed_rows <= MALFORMED_LOG_LIMIT {
                    tracing::warn!(error = %e, "Skipping unreadable row");
                }
                continue;
            }
        };
        if record.len() != width {
            malformed_rows += 1;
            if malformed_rows <= MALFORMED_LOG_LIMIT {
                tracing::warn!(
                    line = record.position().map(csv::Position::line),
                    expected = width,
                    actual = record.len(),
                    "Skipping row with wrong field count"
                );
            }
            continue;
        }
        let row: Vec<Value> = record
            .iter()
            .map(|cell| {
                if options.is_null(cell) {
                    Value::Null
                } else {
                    Value::from(cell)
                }
            })
            .collect();
        dataset
            .push_row(row)
            .map_err(|e| EtlError::Parse(e.to_string()))?;
    }

    if malformed_rows > 0 {
        tracing::warn!(malformed_rows, "Skipped malformed rows while decoding source");
    }

    Ok(DecodedSource {
        dataset,
        malformed_rows,
        encoding,
        delimiter,
    })
}
