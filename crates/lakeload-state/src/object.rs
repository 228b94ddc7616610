//! Object-storage implementation of [`CheckpointStore`].
//!
//! The checkpoint key is the object path; the object body is exactly the
//! `YYYY-MM-DD HH:MM:SS` timestamp string.

use std::sync::Arc;

use async_trait::async_trait;
use lakeload_types::checkpoint::{Checkpoint, CheckpointKey};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use crate::backend::CheckpointStore;
use crate::error::{self, StateError};

/// Checkpoint storage on S3 or any other [`ObjectStore`].
pub struct ObjectStoreCheckpointStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreCheckpointStore {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn object_path(key: &CheckpointKey) -> error::Result<Path> {
        Path::parse(key.as_str()).map_err(|e| StateError::ObjectStore(e.into()))
    }
}

#[async_trait]
impl CheckpointStore for ObjectStoreCheckpointStore {
    async fn get_checkpoint(&self, key: &CheckpointKey) -> error::Result<Option<Checkpoint>> {
        let path = Self::object_path(key)?;
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(key = key.as_str(), "No checkpoint object found");
                return Ok(None);
            }
            Err(e) => return Err(StateError::ObjectStore(e)),
        };

        let body = result.bytes().await?;
        let raw = std::str::from_utf8(&body).map_err(|e| StateError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let checkpoint = raw.parse::<Checkpoint>().map_err(|e| StateError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(checkpoint))
    }

    async fn set_checkpoint(
        &self,
        key: &CheckpointKey,
        checkpoint: Checkpoint,
    ) -> error::Result<()> {
        let path = Self::object_path(key)?;
        self.store
            .put(&path, PutPayload::from(checkpoint.format()))
            .await?;
        tracing::debug!(key = key.as_str(), checkpoint = %checkpoint, "Checkpoint object written");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("object_store({})", self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use object_store::local::LocalFileSystem;
    use object_store::memory::InMemory;

    fn cp(day: u32) -> Checkpoint {
        Checkpoint::new(
            NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(8, 15, 0)
                .unwrap(),
        )
    }

    fn key() -> CheckpointKey {
        CheckpointKey::new("last_load_time.txt")
    }

    #[tokio::test]
    async fn missing_object_is_absent_not_error() {
        let store = ObjectStoreCheckpointStore::new(Arc::new(InMemory::new()));
        assert!(store.get_checkpoint(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_roundtrip_and_overwrite() {
        let store = ObjectStoreCheckpointStore::new(Arc::new(InMemory::new()));
        store.set_checkpoint(&key(), cp(1)).await.unwrap();
        assert_eq!(store.get_checkpoint(&key()).await.unwrap(), Some(cp(1)));

        store.set_checkpoint(&key(), cp(2)).await.unwrap();
        assert_eq!(store.get_checkpoint(&key()).await.unwrap(), Some(cp(2)));
    }

    #[tokio::test]
    async fn body_is_plain_timestamp_string() {
        let inner = Arc::new(InMemory::new());
        let store = ObjectStoreCheckpointStore::new(inner.clone());
        store.set_checkpoint(&key(), cp(5)).await.unwrap();

        let body = inner
            .get(&Path::from("last_load_time.txt"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&body[..], b"2024-01-05 08:15:00");
    }

    #[tokio::test]
    async fn corrupt_body_is_an_error() {
        let inner = Arc::new(InMemory::new());
        inner
            .put(&Path::from("last_load_time.txt"), PutPayload::from("garbage"))
            .await
            .unwrap();
        let store = ObjectStoreCheckpointStore::new(inner);

        let err = store.get_checkpoint(&key()).await.unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = ObjectStoreCheckpointStore::new(Arc::new(InMemory::new()));
        let a = CheckpointKey::new("pipelines/a/checkpoint");
        let b = CheckpointKey::new("pipelines/b/checkpoint");
        store.set_checkpoint(&a, cp(3)).await.unwrap();
        assert_eq!(store.get_checkpoint(&a).await.unwrap(), Some(cp(3)));
        assert!(store.get_checkpoint(&b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_filesystem_backend() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new_with_prefix(dir.path()).unwrap();
        let store = ObjectStoreCheckpointStore::new(Arc::new(fs));

        assert!(store.get_checkpoint(&key()).await.unwrap().is_none());
        store.set_checkpoint(&key(), cp(9)).await.unwrap();
        assert_eq!(store.get_checkpoint(&key()).await.unwrap(), Some(cp(9)));

        let on_disk = std::fs::read_to_string(dir.path().join("last_load_time.txt")).unwrap();
        assert_eq!(on_disk, "2024-01-09 08:15:00");
    }
}
