//! Core data models for noteguard
//!
//! The backup subsystem only needs two shapes: a `Record` (one note) and a
//! `Snapshot` (every record at one instant).

pub mod record;
pub mod snapshot;

pub use record::{Record, RecordFlags, RecordId};
pub use snapshot::{Snapshot, SnapshotDocument, SNAPSHOT_SCHEMA_VERSION};
