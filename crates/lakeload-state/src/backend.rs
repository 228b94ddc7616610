//! Checkpoint store trait definition.
//!
//! [`CheckpointStore`] defines the storage contract for the single
//! "processed through" timestamp of each pipeline. Model types live in
//! [`lakeload_types::checkpoint`].

use async_trait::async_trait;
use lakeload_types::checkpoint::{Checkpoint, CheckpointKey};

use crate::error;

/// Storage contract for pipeline checkpoints.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn CheckpointStore>`.
/// Concurrent writers to the same key are not coordinated; callers run at
/// most one pipeline per key at a time.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet (first run).
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on any storage
    /// failure other than "not found", and when the stored value is not a
    /// valid checkpoint.
    async fn get_checkpoint(&self, key: &CheckpointKey) -> error::Result<Option<Checkpoint>>;

    /// Atomically overwrite the checkpoint stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    async fn set_checkpoint(&self, key: &CheckpointKey, checkpoint: Checkpoint)
        -> error::Result<()>;

    /// Human-readable backend name for logs.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn CheckpointStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn CheckpointStore) {}
    }
}
