//! Note store collaborator
//!
//! The backup subsystem only needs a point-in-time snapshot of every record
//! and an atomic way to replace all of them. `JsonNoteStore` keeps records in
//! `notes.json` with an in-memory cache in front.

use std::path::PathBuf;
use std::sync::RwLock;

use tracing::debug;

use crate::error::NoteguardError;
use crate::models::{Record, Snapshot};

use super::file_io::{read_json, write_json_atomic};

/// The live record store as seen by backup and restore
pub trait NoteStore: Send + Sync {
    /// Capture every record as of now
    fn snapshot(&self) -> Result<Snapshot, NoteguardError>;

    /// Replace the whole store with `snapshot`. Either the previous contents
    /// stay fully intact or the new ones are fully installed.
    fn replace_all(&self, snapshot: Snapshot) -> Result<(), NoteguardError>;

    /// Rebuild anything derived from the persisted store
    fn reload(&self) -> Result<(), NoteguardError> {
        Ok(())
    }
}

/// Serializable store file layout
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct NotesData {
    records: Vec<Record>,
}

/// Record store persisted as JSON
pub struct JsonNoteStore {
    path: PathBuf,
    data: RwLock<Vec<Record>>,
}

impl JsonNoteStore {
    /// Open the store at `path`, loading it if the file exists
    pub fn open(path: PathBuf) -> Result<Self, NoteguardError> {
        let store = Self {
            path,
            data: RwLock::new(Vec::new()),
        };
        store.load()?;
        Ok(store)
    }

    /// Load records from disk into the cache
    pub fn load(&self) -> Result<(), NoteguardError> {
        let file_data: NotesData = read_json(&self.path)?;

        let mut data = self.data.write().map_err(|e| {
            NoteguardError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        *data = file_data.records;

        debug!(records = data.len(), path = %self.path.display(), "loaded note store");
        Ok(())
    }

    /// Get all records in stored order
    pub fn get_all(&self) -> Result<Vec<Record>, NoteguardError> {
        let data = self.data.read().map_err(|e| {
            NoteguardError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(data.clone())
    }

    /// Number of records
    pub fn count(&self) -> Result<usize, NoteguardError> {
        let data = self.data.read().map_err(|e| {
            NoteguardError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(data.len())
    }
}

impl NoteStore for JsonNoteStore {
    fn snapshot(&self) -> Result<Snapshot, NoteguardError> {
        Ok(Snapshot::new(self.get_all()?))
    }

    fn replace_all(&self, snapshot: Snapshot) -> Result<(), NoteguardError> {
        // Hold the write lock across the file swap so no reader sees the
        // cache and the file disagree.
        let mut data = self.data.write().map_err(|e| {
            NoteguardError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        let file_data = NotesData {
            records: snapshot.into_records(),
        };
        write_json_atomic(&self.path, &file_data)?;
        *data = file_data.records;

        debug!(records = data.len(), "replaced note store contents");
        Ok(())
    }

    fn reload(&self) -> Result<(), NoteguardError> {
        self.load()
    }
}
