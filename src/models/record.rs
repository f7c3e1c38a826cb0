//! Record model
//!
//! One persisted note as the backup subsystem sees it. When `flags.encrypted`
//! is set, title and body already hold ciphertext produced by the note
//! editor; backups carry them as-is.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable record identifier, unique within a store
pub type RecordId = i64;

/// Boolean state attached to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordFlags {
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub trashed: bool,
}

/// A persisted note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,

    pub title: String,

    pub body: String,

    #[serde(default)]
    pub flags: RecordFlags,

    /// When the note was first created
    pub created_at: DateTime<Utc>,

    /// Tags are a set; order carries no meaning
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Record {
    /// Create a new record stamped with the current time
    pub fn new(id: RecordId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            flags: RecordFlags::default(),
            created_at: Utc::now(),
            tags: BTreeSet::new(),
        }
    }

    /// Add tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Replace the flags
    pub fn with_flags(mut self, flags: RecordFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let record = Record::new(7, "Groceries", "milk, eggs");
        assert_eq!(record.id, 7);
        assert_eq!(record.title, "Groceries");
        assert_eq!(record.flags, RecordFlags::default());
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_tags_are_a_set() {
        let record = Record::new(1, "t", "b").with_tags(["work", "home", "work"]);
        assert_eq!(record.tags.len(), 2);
        assert_eq!(
            record.tags.iter().collect::<Vec<_>>(),
            vec!["home", "work"]
        );
    }

    #[test]
    fn test_serde_round_trip_is_exact() {
        let record = Record::new(3, "ciphertext==", "more==")
            .with_flags(RecordFlags {
                pinned: true,
                encrypted: true,
                trashed: false,
            })
            .with_tags(["a"]);

        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_missing_optional_fields() {
        let json = r#"{"id":1,"title":"t","body":"b","created_at":"2025-01-02T03:04:05Z"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert!(!record.flags.pinned);
        assert!(record.tags.is_empty());
    }
}
