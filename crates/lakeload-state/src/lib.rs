//! Checkpoint persistence for lakeload pipelines.
//!
//! Provides the [`CheckpointStore`] trait with an object-storage backend
//! ([`ObjectStoreCheckpointStore`]) and a `SQLite` backend
//! ([`SqliteCheckpointStore`]).

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod object;
pub mod sqlite;

pub use backend::CheckpointStore;
pub use error::StateError;
pub use object::ObjectStoreCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
