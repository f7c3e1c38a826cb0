//! Backup pipeline
//!
//! Snapshot, serialize, archive, optionally encrypt, then hand the bytes to a
//! transport. The archive is staged in a temp file under the staging
//! directory; the temp file is removed however the run ends.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Read, Seek, SeekFrom};
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::archive::{pack_into, ArchiveEntry};
use crate::config::paths::NOTES_FILE_NAME;
use crate::crypto::{seal, KeyDerivationParams};
use crate::error::{NoteguardError, NoteguardResult};
use crate::storage::NoteStore;
use crate::transport::Transport;

use super::cancel::CancelToken;
use super::descriptor::BackupDescriptor;

/// Where a backup run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    Idle,
    Snapshotting,
    Serializing,
    Archiving,
    Encrypting,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Snapshotting => "snapshotting",
            Self::Serializing => "serializing",
            Self::Archiving => "archiving",
            Self::Encrypting => "encrypting",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// What a successful backup produced
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub descriptor: BackupDescriptor,
    /// Object name at the destination
    pub name: String,
    pub record_count: usize,
    /// Bytes handed to the transport
    pub size_bytes: usize,
}

impl BackupReport {
    pub fn summary(&self) -> String {
        format!(
            "Backed up {} records to {} ({} bytes{})",
            self.record_count,
            self.name,
            self.size_bytes,
            if self.descriptor.encrypted {
                ", encrypted"
            } else {
                ""
            }
        )
    }
}

/// A single backup run
///
/// Not reusable: build one per run. Concurrency control lives in
/// [`super::BackupService`].
pub struct BackupPipeline<'a> {
    store: &'a dyn NoteStore,
    staging_dir: PathBuf,
    encrypt: bool,
    kdf: KeyDerivationParams,
    cancel: CancelToken,
    stage: BackupStage,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(store: &'a dyn NoteStore, staging_dir: PathBuf) -> Self {
        Self {
            store,
            staging_dir,
            encrypt: true,
            kdf: KeyDerivationParams::default(),
            cancel: CancelToken::new(),
            stage: BackupStage::Idle,
        }
    }

    /// Turn encryption on or off (on by default)
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn with_kdf(mut self, kdf: KeyDerivationParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> BackupStage {
        self.stage
    }

    fn enter(&mut self, stage: BackupStage) -> NoteguardResult<()> {
        if self.cancel.is_cancelled() {
            return Err(NoteguardError::Cancelled {
                stage: stage.to_string(),
            });
        }
        debug!(from = %self.stage, to = %stage, "backup stage");
        self.stage = stage;
        Ok(())
    }

    /// Run the backup and write the result through `transport`
    ///
    /// With encryption on, a missing or blank password fails before anything
    /// is read or written, as do key derivation costs restore would refuse.
    pub fn run(
        &mut self,
        transport: &dyn Transport,
        password: Option<&str>,
    ) -> NoteguardResult<BackupReport> {
        let password = if self.encrypt {
            match password {
                Some(p) if !p.trim().is_empty() => {
                    if let Err(e) = self.kdf.check_restorable() {
                        self.stage = BackupStage::Failed;
                        return Err(e);
                    }
                    Some(p)
                }
                _ => {
                    self.stage = BackupStage::Failed;
                    return Err(NoteguardError::MissingPassword);
                }
            }
        } else {
            if password.is_some() {
                debug!("password ignored for unencrypted backup");
            }
            None
        };

        match self.run_steps(transport, password) {
            Ok(report) => {
                self.stage = BackupStage::Done;
                info!(
                    name = %report.name,
                    records = report.record_count,
                    bytes = report.size_bytes,
                    destination = %transport.describe(),
                    "backup complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(stage = %self.stage, error = %e, "backup failed");
                self.stage = BackupStage::Failed;
                Err(e)
            }
        }
    }

    fn run_steps(
        &mut self,
        transport: &dyn Transport,
        password: Option<&str>,
    ) -> NoteguardResult<BackupReport> {
        self.enter(BackupStage::Snapshotting)?;
        let snapshot = self.store.snapshot()?;
        let record_count = snapshot.len();

        self.enter(BackupStage::Serializing)?;
        let payload = snapshot.encode()?;
        drop(snapshot);

        self.enter(BackupStage::Archiving)?;
        let archive = self.stage_archive(payload)?;

        let bytes = match password {
            Some(password) => {
                self.enter(BackupStage::Encrypting)?;
                seal(&archive, password, &self.kdf)?
            }
            None => archive,
        };

        let descriptor =
            BackupDescriptor::now(password.is_some()).with_destination(transport.describe());
        let name = descriptor.file_name();

        // Last chance to cancel; the write itself always runs to completion.
        self.enter(BackupStage::Writing)?;
        transport.put(&name, &bytes)?;

        Ok(BackupReport {
            descriptor,
            name,
            record_count,
            size_bytes: bytes.len(),
        })
    }

    /// Pack the payload through a temp file in the staging directory
    fn stage_archive(&self, payload: Vec<u8>) -> NoteguardResult<Vec<u8>> {
        fs::create_dir_all(&self.staging_dir).map_err(|e| {
            NoteguardError::Io(format!(
                "Failed to create staging directory {}: {}",
                self.staging_dir.display(),
                e
            ))
        })?;

        let staged = NamedTempFile::new_in(&self.staging_dir)
            .map_err(|e| NoteguardError::Io(format!("Failed to create staging file: {}", e)))?;

        let entries = [ArchiveEntry::new(NOTES_FILE_NAME, payload)];
        let writer = pack_into(&entries, BufWriter::new(staged))?;
        let mut staged = writer
            .into_inner()
            .map_err(|e| NoteguardError::Io(format!("Failed to flush staging file: {}", e)))?;

        staged.as_file_mut().seek(SeekFrom::Start(0))?;
        let mut archive = Vec::new();
        staged.as_file_mut().read_to_end(&mut archive)?;

        debug!(bytes = archive.len(), "staged archive");
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::unpack;
    use crate::crypto::open;
    use crate::error::TransportError;
    use crate::models::{Record, Snapshot, SnapshotDocument};
    use crate::storage::JsonNoteStore;
    use crate::transport::LocalTransport;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        store: JsonNoteStore,
        transport: LocalTransport,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = JsonNoteStore::open(temp.path().join("data").join("notes.json")).unwrap();
        store
            .replace_all(Snapshot::new(vec![
                Record::new(1, "A", "secret"),
                Record::new(2, "B", "secret"),
            ]))
            .unwrap();
        let transport = LocalTransport::new(temp.path().join("backups"));
        Fixture {
            temp,
            store,
            transport,
        }
    }

    fn pipeline(f: &Fixture) -> BackupPipeline<'_> {
        BackupPipeline::new(&f.store, f.temp.path().join("staging"))
            .with_kdf(KeyDerivationParams::for_testing())
    }

    fn backup_files(f: &Fixture) -> usize {
        f.transport.list().unwrap().len()
    }

    #[test]
    fn test_encrypted_backup_hides_plaintext() {
        let f = fixture();
        let mut run = pipeline(&f);

        let report = run.run(&f.transport, Some("pw")).unwrap();
        assert_eq!(run.stage(), BackupStage::Done);
        assert_eq!(report.record_count, 2);
        assert!(report.name.ends_with(".nbak"));

        let bytes = f.transport.get(&report.name).unwrap();
        assert!(!bytes.windows(6).any(|w| w == b"secret"));

        let archive = open(&bytes, "pw").unwrap();
        let entries = unpack(&archive).unwrap();
        let snapshot = SnapshotDocument::decode(&entries[0].data)
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_unrestorable_kdf_fails_before_writing() {
        let f = fixture();
        let mut run = pipeline(&f).with_kdf(KeyDerivationParams::with_values(8, 65, 1));

        let err = run.run(&f.transport, Some("pw")).unwrap_err();
        assert!(matches!(err, NoteguardError::Encryption(_)));
        assert_eq!(run.stage(), BackupStage::Failed);
        assert_eq!(backup_files(&f), 0);
    }

    #[test]
    fn test_plain_backup_is_gzip() {
        let f = fixture();
        let report = pipeline(&f)
            .encrypt(false)
            .run(&f.transport, None)
            .unwrap();

        assert!(report.name.ends_with(".tar.gz"));
        let bytes = f.transport.get(&report.name).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_missing_password_writes_nothing() {
        let f = fixture();

        for password in [None, Some(""), Some("   ")] {
            let mut run = pipeline(&f);
            let err = run.run(&f.transport, password).unwrap_err();
            assert!(matches!(err, NoteguardError::MissingPassword));
            assert_eq!(run.stage(), BackupStage::Failed);
        }

        assert_eq!(backup_files(&f), 0);
        assert!(!f.temp.path().join("staging").exists());
    }

    #[test]
    fn test_cancelled_before_write() {
        let f = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline(&f)
            .with_cancel(cancel)
            .run(&f.transport, Some("pw"))
            .unwrap_err();

        assert!(matches!(err, NoteguardError::Cancelled { .. }));
        assert_eq!(backup_files(&f), 0);
    }

    #[test]
    fn test_staging_file_removed() {
        let f = fixture();
        pipeline(&f).run(&f.transport, Some("pw")).unwrap();

        let staged: Vec<_> = fs::read_dir(f.temp.path().join("staging"))
            .unwrap()
            .collect();
        assert!(staged.is_empty());
    }

    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn put(&self, _name: &str, _bytes: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::retryable("host unreachable"))
        }

        fn get(&self, name: &str) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::fatal(format!("no object {}", name)))
        }

        fn describe(&self) -> String {
            "nowhere".into()
        }
    }

    #[test]
    fn test_transport_failure_surfaces_kind() {
        let f = fixture();
        let mut run = pipeline(&f);

        let err = run.run(&RefusingTransport, Some("pw")).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(run.stage(), BackupStage::Failed);
    }
}
