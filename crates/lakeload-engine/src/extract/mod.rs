//! Incremental extraction: fetch the raw snapshot, decode it, and select
//! the records newer than the last checkpoint.

pub mod decode;
pub mod filter;

use lakeload_types::error::EtlError;

use crate::storage::ObjectRef;

pub use decode::{decode_source, CsvOptions, DecodedSource, SourceEncoding};
pub use filter::{filter_by_checkpoint, FilterOutcome};

/// Reads one snapshot object and decodes it.
#[derive(Debug, Clone)]
pub struct Extractor {
    source: ObjectRef,
    options: CsvOptions,
}

impl Extractor {
    #[must_use]
    pub fn new(source: ObjectRef, options: CsvOptions) -> Self {
        Self { source, options }
    }

    #[must_use]
    pub fn source(&self) -> &ObjectRef {
        &self.source
    }

    /// Fetch and decode the full snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::TransientIo`] if the object cannot be read and
    /// [`EtlError::Parse`] if it cannot be decoded.
    pub async fn extract(&self) -> Result<DecodedSource, EtlError> {
        let bytes = self.source.fetch().await?;
        tracing::debug!(source = %self.source, bytes = bytes.len(), "Fetched source snapshot");
        decode_source(&bytes, &self.options)
    }
}
