//! Restore pipeline
//!
//! Fetch, decrypt when needed, unarchive, decode, validate, then swap the
//! validated snapshot into the note store. Nothing touches the live store
//! until every check has passed; the swap itself is the only step that
//! writes.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::archive::unpack;
use crate::config::paths::NOTES_FILE_NAME;
use crate::crypto::{open, BackupFormat};
use crate::error::{NoteguardError, NoteguardResult};
use crate::models::{Snapshot, SnapshotDocument};
use crate::storage::NoteStore;
use crate::transport::Transport;

use super::cancel::CancelToken;

/// Where a restore run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    Idle,
    Fetching,
    Decrypting,
    Unarchiving,
    Deserializing,
    Validating,
    Swapping,
    Done,
    Failed,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Decrypting => "decrypting",
            Self::Unarchiving => "unarchiving",
            Self::Deserializing => "deserializing",
            Self::Validating => "validating",
            Self::Swapping => "swapping",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Result of a restore operation
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// Backup that was restored
    pub name: String,
    /// When the snapshot inside the backup was taken
    pub backup_date: DateTime<Utc>,
    pub record_count: usize,
    pub was_encrypted: bool,
}

impl RestoreReport {
    pub fn summary(&self) -> String {
        format!(
            "Restored {} records from {} (taken {})",
            self.record_count,
            self.name,
            self.backup_date.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// A backup that passed every check and is ready to install
#[derive(Debug)]
pub struct VerifiedBackup {
    pub snapshot: Snapshot,
    pub was_encrypted: bool,
}

/// A single restore run
pub struct RestorePipeline<'a> {
    store: &'a dyn NoteStore,
    cancel: CancelToken,
    stage: RestoreStage,
}

impl<'a> RestorePipeline<'a> {
    pub fn new(store: &'a dyn NoteStore) -> Self {
        Self {
            store,
            cancel: CancelToken::new(),
            stage: RestoreStage::Idle,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> RestoreStage {
        self.stage
    }

    fn enter(&mut self, stage: RestoreStage) -> NoteguardResult<()> {
        if self.cancel.is_cancelled() {
            return Err(NoteguardError::Cancelled {
                stage: stage.to_string(),
            });
        }
        debug!(from = %self.stage, to = %stage, "restore stage");
        self.stage = stage;
        Ok(())
    }

    /// Restore the backup stored under `name`, replacing every record
    pub fn run(
        &mut self,
        transport: &dyn Transport,
        name: &str,
        password: Option<&str>,
    ) -> NoteguardResult<RestoreReport> {
        let result = self.verify(transport, name, password).and_then(|verified| {
            // Past this point cancellation is no longer observed.
            self.enter(RestoreStage::Swapping)?;
            let report = RestoreReport {
                name: name.to_string(),
                backup_date: verified.snapshot.captured_at(),
                record_count: verified.snapshot.len(),
                was_encrypted: verified.was_encrypted,
            };
            self.store.replace_all(verified.snapshot)?;
            Ok(report)
        });

        match result {
            Ok(report) => {
                self.stage = RestoreStage::Done;
                info!(
                    name = %report.name,
                    records = report.record_count,
                    "restore complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(stage = %self.stage, error = %e, "restore failed");
                self.stage = RestoreStage::Failed;
                Err(e)
            }
        }
    }

    /// Run every step short of the swap
    ///
    /// Leaves the note store untouched; useful for checking a backup and its
    /// password without installing it.
    pub fn verify(
        &mut self,
        transport: &dyn Transport,
        name: &str,
        password: Option<&str>,
    ) -> NoteguardResult<VerifiedBackup> {
        self.enter(RestoreStage::Fetching)?;
        let bytes = transport.get(name)?;

        let (archive, was_encrypted) = match BackupFormat::detect(&bytes) {
            BackupFormat::Encrypted => {
                let password = password
                    .filter(|p| !p.is_empty())
                    .ok_or(NoteguardError::MissingPassword)?;
                self.enter(RestoreStage::Decrypting)?;
                (open(&bytes, password)?, true)
            }
            BackupFormat::Plain => {
                if password.is_some() {
                    warn!(backup = name, "backup is not encrypted; ignoring the supplied password");
                }
                (bytes, false)
            }
            BackupFormat::LegacyCbc => {
                return Err(NoteguardError::MalformedArchive(
                    "backups in the unauthenticated CBC format are no longer supported".into(),
                ))
            }
            BackupFormat::Unknown => {
                return Err(NoteguardError::MalformedArchive(
                    "not a recognised backup file".into(),
                ))
            }
        };

        self.enter(RestoreStage::Unarchiving)?;
        let entries = unpack(&archive)?;
        let payload = entries
            .into_iter()
            .find(|e| e.name == NOTES_FILE_NAME)
            .ok_or_else(|| {
                NoteguardError::MalformedArchive(format!("archive has no {}", NOTES_FILE_NAME))
            })?;

        self.enter(RestoreStage::Deserializing)?;
        let document = SnapshotDocument::decode(&payload.data)?;

        self.enter(RestoreStage::Validating)?;
        let snapshot = document.into_validated()?;

        Ok(VerifiedBackup {
            snapshot,
            was_encrypted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{pack, ArchiveEntry};
    use crate::backup::BackupPipeline;
    use crate::crypto::KeyDerivationParams;
    use crate::models::Record;
    use crate::storage::JsonNoteStore;
    use crate::transport::LocalTransport;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: JsonNoteStore,
        transport: LocalTransport,
        staging: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = JsonNoteStore::open(temp.path().join("data").join("notes.json")).unwrap();
        store
            .replace_all(Snapshot::new(vec![
                Record::new(1, "A", "secret"),
                Record::new(2, "B", "secret"),
                Record::new(3, "C", "secret"),
            ]))
            .unwrap();
        Fixture {
            transport: LocalTransport::new(temp.path().join("backups")),
            staging: temp.path().join("staging"),
            store,
            _temp: temp,
        }
    }

    fn backup(f: &Fixture, password: Option<&str>) -> String {
        BackupPipeline::new(&f.store, f.staging.clone())
            .encrypt(password.is_some())
            .with_kdf(KeyDerivationParams::for_testing())
            .run(&f.transport, password)
            .unwrap()
            .name
    }

    fn ids(store: &JsonNoteStore) -> Vec<i64> {
        store.get_all().unwrap().iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_restore_replaces_records() {
        let f = fixture();
        let name = backup(&f, Some("pw"));
        f.store
            .replace_all(Snapshot::new(vec![
                Record::new(1, "A", "secret"),
                Record::new(4, "D", "later"),
            ]))
            .unwrap();

        let mut run = RestorePipeline::new(&f.store);
        let report = run.run(&f.transport, &name, Some("pw")).unwrap();

        assert_eq!(run.stage(), RestoreStage::Done);
        assert_eq!(report.record_count, 3);
        assert!(report.was_encrypted);
        assert_eq!(ids(&f.store), vec![1, 2, 3]);
    }

    #[test]
    fn test_wrong_password_leaves_store_alone() {
        let f = fixture();
        let name = backup(&f, Some("pw"));
        f.store
            .replace_all(Snapshot::new(vec![Record::new(9, "Z", "")]))
            .unwrap();

        let mut run = RestorePipeline::new(&f.store);
        let err = run.run(&f.transport, &name, Some("wrong")).unwrap_err();

        assert!(err.is_bad_password());
        assert_eq!(run.stage(), RestoreStage::Failed);
        assert_eq!(ids(&f.store), vec![9]);
    }

    #[test]
    fn test_encrypted_backup_needs_password() {
        let f = fixture();
        let name = backup(&f, Some("pw"));

        let err = RestorePipeline::new(&f.store)
            .run(&f.transport, &name, None)
            .unwrap_err();
        assert!(matches!(err, NoteguardError::MissingPassword));
    }

    #[test]
    fn test_plain_backup_ignores_password() {
        let f = fixture();
        let name = backup(&f, None);

        let report = RestorePipeline::new(&f.store)
            .run(&f.transport, &name, Some("unused"))
            .unwrap();
        assert!(!report.was_encrypted);
        assert_eq!(report.record_count, 3);
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let f = fixture();
        let payload = br#"{"schema_version":1,"created_at":"2025-01-01T00:00:00Z","record_count":2,"records":[]}"#;
        let archive = pack(&[ArchiveEntry::new(NOTES_FILE_NAME, payload.to_vec())]).unwrap();
        f.transport.put("forged.tar.gz", &archive).unwrap();

        let err = RestorePipeline::new(&f.store)
            .run(&f.transport, "forged.tar.gz", None)
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(ids(&f.store), vec![1, 2, 3]);
    }

    #[test]
    fn test_explicitly_empty_backup_restores() {
        let f = fixture();
        let payload = br#"{"schema_version":1,"created_at":"2025-01-01T00:00:00Z","record_count":0,"records":[]}"#;
        let archive = pack(&[ArchiveEntry::new(NOTES_FILE_NAME, payload.to_vec())]).unwrap();
        f.transport.put("empty.tar.gz", &archive).unwrap();

        let report = RestorePipeline::new(&f.store)
            .run(&f.transport, "empty.tar.gz", None)
            .unwrap();
        assert_eq!(report.record_count, 0);
        assert!(ids(&f.store).is_empty());
    }

    #[test]
    fn test_archive_without_notes_rejected() {
        let f = fixture();
        let archive = pack(&[ArchiveEntry::new("other.json", b"{}".to_vec())]).unwrap();
        f.transport.put("other.tar.gz", &archive).unwrap();

        let err = RestorePipeline::new(&f.store)
            .run(&f.transport, "other.tar.gz", None)
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_legacy_and_unknown_formats_rejected() {
        let f = fixture();
        f.transport.put("legacy.nbak", &[0x01; 64]).unwrap();
        f.transport.put("junk.nbak", b"hello world").unwrap();

        for name in ["legacy.nbak", "junk.nbak"] {
            let err = RestorePipeline::new(&f.store)
                .run(&f.transport, name, Some("pw"))
                .unwrap_err();
            assert!(err.is_malformed(), "{} gave {}", name, err);
        }
    }

    #[test]
    fn test_verify_does_not_swap() {
        let f = fixture();
        let name = backup(&f, Some("pw"));
        f.store.replace_all(Snapshot::empty()).unwrap();

        let verified = RestorePipeline::new(&f.store)
            .verify(&f.transport, &name, Some("pw"))
            .unwrap();
        assert_eq!(verified.snapshot.len(), 3);
        assert!(ids(&f.store).is_empty());
    }

    #[test]
    fn test_cancelled_restore_leaves_store_alone() {
        let f = fixture();
        let name = backup(&f, Some("pw"));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = RestorePipeline::new(&f.store)
            .with_cancel(cancel)
            .run(&f.transport, &name, Some("pw"))
            .unwrap_err();
        assert!(matches!(err, NoteguardError::Cancelled { .. }));
        assert_eq!(ids(&f.store), vec![1, 2, 3]);
    }
}
