//! Object storage locations for sources, checkpoints, and cleaned output.
//!
//! A location is either `s3://bucket/key` or a local file (`file:///path`
//! or a bare path). Each resolves to an [`ObjectStore`] plus the object
//! path within it.

use std::fmt;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use lakeload_types::error::EtlError;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore, PutPayload, RetryConfig};

/// Parse an S3 URI into bucket and key components.
///
/// # Errors
///
/// Returns an error if the URI is missing the scheme, the bucket, or the key.
pub fn parse_s3_uri(uri: &str) -> Result<(&str, &str)> {
    let without_scheme = uri
        .strip_prefix("s3://")
        .with_context(|| format!("Invalid S3 URI: expected 's3://' prefix in '{uri}'"))?;

    let (bucket, key) = without_scheme
        .split_once('/')
        .with_context(|| format!("Invalid S3 URI: expected 's3://bucket/key' format in '{uri}'"))?;
    if bucket.is_empty() || key.is_empty() {
        anyhow::bail!("Invalid S3 URI: expected 's3://bucket/key' format in '{uri}'");
    }
    Ok((bucket, key))
}

/// A parsed storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    S3 { bucket: String, key: Path },
    Local { root: PathBuf, file: Path },
}

impl Location {
    /// Parse a location string.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed S3 URI, an unsupported scheme, or a
    /// path that does not name a file.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.starts_with("s3://") {
            let (bucket, key) = parse_s3_uri(raw)?;
            let key = Path::parse(key).with_context(|| format!("Invalid object key in '{raw}'"))?;
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key,
            });
        }
        if let Some((scheme, _)) = raw.split_once("://") {
            if scheme != "file" {
                anyhow::bail!("Unsupported location scheme '{scheme}://' in '{raw}'");
            }
        }

        let local = raw.strip_prefix("file://").unwrap_or(raw);
        let path = FsPath::new(local);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Location '{raw}' does not name a file"))?;
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file = Path::parse(file_name)
            .with_context(|| format!("Invalid file name in '{raw}'"))?;
        Ok(Self::Local { root, file })
    }

    /// Path of the object within its store.
    #[must_use]
    pub fn object_path(&self) -> &Path {
        match self {
            Self::S3 { key, .. } => key,
            Self::Local { file, .. } => file,
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Local { root, file } => write!(f, "{}", root.join(file.to_string()).display()),
        }
    }
}

fn create_client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(60))
}

// Retries are left to whatever schedules the pipeline.
fn create_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        backoff: object_store::BackoffConfig::default(),
        retry_timeout: Duration::from_secs(60),
    }
}

/// Create an S3 client authenticated from the environment.
///
/// Credentials come from the standard `AWS_*` variables, config files, or
/// the instance profile.
fn create_s3_store(bucket: &str, region: Option<&str>) -> Result<Arc<dyn ObjectStore>> {
    tracing::debug!(bucket, region, "Creating S3 client");

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_client_options(create_client_options())
        .with_retry(create_retry_config());
    if let Some(region) = region {
        builder = builder.with_region(region);
    }

    Ok(Arc::new(builder.build().with_context(|| {
        format!("Failed to create S3 client for bucket '{bucket}'")
    })?))
}

/// Create a store able to read the object at `location`.
///
/// # Errors
///
/// Returns an error if the S3 client cannot be built or the local
/// directory does not exist.
pub fn create_read_store(location: &Location, region: Option<&str>) -> Result<Arc<dyn ObjectStore>> {
    match location {
        Location::S3 { bucket, .. } => create_s3_store(bucket, region),
        Location::Local { root, .. } => {
            let store = LocalFileSystem::new_with_prefix(root)
                .with_context(|| format!("Local directory not accessible: {}", root.display()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Create a store able to write the object at `location`, creating the
/// local directory if needed.
///
/// # Errors
///
/// Returns an error if the S3 client cannot be built or the local
/// directory cannot be created.
pub fn create_write_store(
    location: &Location,
    region: Option<&str>,
) -> Result<Arc<dyn ObjectStore>> {
    if let Location::Local { root, .. } = location {
        if !root.exists() {
            std::fs::create_dir_all(root)
                .with_context(|| format!("Failed to create directory {}", root.display()))?;
        }
        tracing::debug!(root = %root.display(), "Creating LocalFileSystem store");
    }
    create_read_store(location, region)
}

/// A single object within a store.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub store: Arc<dyn ObjectStore>,
    pub path: Path,
}

impl ObjectRef {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, path: Path) -> Self {
        Self { store, path }
    }

    /// Fetch the full object body.
    ///
    /// # Errors
    ///
    /// Any storage failure, including a missing object, is
    /// [`EtlError::TransientIo`].
    pub async fn fetch(&self) -> Result<Bytes, EtlError> {
        let context = format!("get {}", self.path);
        let result = self
            .store
            .get(&self.path)
            .await
            .map_err(|e| EtlError::transient_io(context.clone(), e))?;
        result
            .bytes()
            .await
            .map_err(|e| EtlError::transient_io(context, e))
    }

    /// Overwrite the object with `body` in a single PUT.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::TransientIo`] if the write fails.
    pub async fn put(&self, body: Bytes) -> Result<(), EtlError> {
        self.store
            .put(&self.path, PutPayload::from(body))
            .await
            .map_err(|e| EtlError::transient_io(format!("put {}", self.path), e))?;
        Ok(())
    }

    /// Check that the object exists and is readable without fetching it.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::TransientIo`] if the object cannot be found.
    pub async fn probe(&self) -> Result<u64, EtlError> {
        let meta = self
            .store
            .head(&self.path)
            .await
            .map_err(|e| EtlError::transient_io(format!("head {}", self.path), e))?;
        Ok(meta.size as u64)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.path)
    }
}
