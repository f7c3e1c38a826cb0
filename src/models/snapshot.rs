//! Snapshot model
//!
//! An ordered, immutable capture of every record at one instant, and the JSON
//! document it is serialized into inside a backup archive.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NoteguardError, NoteguardResult};

use super::record::Record;

/// Snapshot document version written by this build
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Point-in-time capture of a note store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    captured_at: DateTime<Utc>,
    records: Vec<Record>,
}

impl Snapshot {
    /// Capture `records` as of now, keeping their order
    pub fn new(records: Vec<Record>) -> Self {
        Self::captured(Utc::now(), records)
    }

    pub fn captured(captured_at: DateTime<Utc>, records: Vec<Record>) -> Self {
        Self {
            captured_at,
            records,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Check record ids are unique
    pub fn validate(&self) -> NoteguardResult<()> {
        let mut seen = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if !seen.insert(record.id) {
                return Err(NoteguardError::Validation(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
        }
        Ok(())
    }

    /// Serialize into the archive payload
    pub fn encode(&self) -> NoteguardResult<Vec<u8>> {
        let document = SnapshotDocument {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            created_at: self.captured_at,
            record_count: self.records.len(),
            records: self.records.clone(),
        };
        serde_json::to_vec(&document)
            .map_err(|e| NoteguardError::Json(format!("Failed to serialize snapshot: {}", e)))
    }
}

/// Serialized form of a snapshot
///
/// `record_count` is written explicitly so an empty restore is recognisably
/// intentional rather than a payload that lost its records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub records: Vec<Record>,
}

impl SnapshotDocument {
    /// Parse an archive payload
    pub fn decode(bytes: &[u8]) -> NoteguardResult<Self> {
        let document: SnapshotDocument = serde_json::from_slice(bytes).map_err(|e| {
            NoteguardError::MalformedArchive(format!("snapshot payload is not valid: {}", e))
        })?;

        if document.schema_version == 0 || document.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(NoteguardError::MalformedArchive(format!(
                "unsupported snapshot schema version {}",
                document.schema_version
            )));
        }

        Ok(document)
    }

    /// Check the document against its own declared shape and produce a snapshot
    pub fn into_validated(self) -> NoteguardResult<Snapshot> {
        if self.record_count != self.records.len() {
            return Err(NoteguardError::Validation(format!(
                "snapshot declares {} records but contains {}",
                self.record_count,
                self.records.len()
            )));
        }

        let snapshot = Snapshot::captured(self.created_at, self.records);
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot::new(vec![
            Record::new(2, "B", "second"),
            Record::new(1, "A", "first").with_tags(["x"]),
        ])
    }

    #[test]
    fn test_encode_decode_preserves_order_and_content() {
        let snapshot = sample();
        let bytes = snapshot.encode().unwrap();

        let restored = SnapshotDocument::decode(&bytes)
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.records()[0].id, 2);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let snapshot = Snapshot::new(vec![Record::new(1, "A", ""), Record::new(1, "B", "")]);
        assert!(snapshot.validate().unwrap_err().is_validation());
    }

    #[test]
    fn test_explicit_empty_snapshot_is_valid() {
        let bytes = Snapshot::empty().encode().unwrap();
        let restored = SnapshotDocument::decode(&bytes)
            .unwrap()
            .into_validated()
            .unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let mut document = SnapshotDocument::decode(&sample().encode().unwrap()).unwrap();
        document.records.clear();

        assert!(document.into_validated().unwrap_err().is_validation());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = SnapshotDocument::decode(b"\x00\x01garbage").unwrap_err();
        assert!(matches!(err, NoteguardError::MalformedArchive(_)));
    }

    #[test]
    fn test_future_schema_is_malformed() {
        let json = r#"{"schema_version":99,"created_at":"2025-01-01T00:00:00Z","record_count":0,"records":[]}"#;
        let err = SnapshotDocument::decode(json.as_bytes()).unwrap_err();
        assert!(err.is_malformed());
    }
}
