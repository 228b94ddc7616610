//! Shared data model for lakeload pipelines.
//!
//! Pure data types used by the state, engine, and CLI crates: the tabular
//! [`dataset::Dataset`], destination [`schema::TableSchema`], persisted
//! [`checkpoint::Checkpoint`], and the [`error::EtlError`] taxonomy.

#![warn(clippy::pedantic)]

pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod schema;
