//! Local directory destination
//!
//! Writes go through a temp file and an atomic rename, so a crash mid-write
//! never leaves a truncated file under a backup's final name. Also handles
//! listing and rolling retention for the local backup directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use tracing::debug;

use crate::backup::{BackupDescriptor, BackupInfo};
use crate::config::settings::BackupRetention;
use crate::error::{NoteguardError, NoteguardResult, TransportError};
use crate::storage::file_io::write_bytes_atomic;

use super::{check_object_name, Transport};

/// Backups stored in a directory on this machine
#[derive(Debug, Clone)]
pub struct LocalTransport {
    dir: PathBuf,
}

impl LocalTransport {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Get backup directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path a backup name maps to
    pub fn path_for(&self, name: &str) -> Result<PathBuf, TransportError> {
        check_object_name(name)?;
        Ok(self.dir.join(name))
    }

    /// List all backups, newest first
    pub fn list(&self) -> NoteguardResult<Vec<BackupInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(|e| {
            NoteguardError::Io(format!("Failed to read backup directory: {}", e))
        })? {
            let entry = entry.map_err(|e| {
                NoteguardError::Io(format!("Failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Some(descriptor) = BackupDescriptor::parse_file_name(&filename) else {
                continue;
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };

            backups.push(BackupInfo {
                is_monthly: descriptor.created_at.day() == 1,
                size_bytes: metadata.len(),
                name: filename,
                path,
                descriptor,
            });
        }

        backups.sort_by(|a, b| b.descriptor.created_at.cmp(&a.descriptor.created_at));

        Ok(backups)
    }

    /// Get the most recent backup
    pub fn latest(&self) -> NoteguardResult<Option<BackupInfo>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Enforce retention policy by deleting old backups
    pub fn enforce_retention(&self, retention: &BackupRetention) -> NoteguardResult<Vec<PathBuf>> {
        let backups = self.list()?;
        let mut deleted = Vec::new();

        let (monthly, daily): (Vec<_>, Vec<_>) = backups.into_iter().partition(|b| b.is_monthly);

        for backup in daily.into_iter().skip(retention.daily_count as usize) {
            fs::remove_file(&backup.path).map_err(|e| {
                NoteguardError::Io(format!("Failed to delete old backup: {}", e))
            })?;
            deleted.push(backup.path);
        }

        for backup in monthly.into_iter().skip(retention.monthly_count as usize) {
            fs::remove_file(&backup.path).map_err(|e| {
                NoteguardError::Io(format!("Failed to delete old monthly backup: {}", e))
            })?;
            deleted.push(backup.path);
        }

        debug!(deleted = deleted.len(), "enforced backup retention");
        Ok(deleted)
    }
}

impl Transport for LocalTransport {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let path = self.path_for(name)?;
        write_bytes_atomic(&path, bytes).map_err(|e| TransportError::fatal(e.to_string()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote local backup");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|e| {
            TransportError::fatal(format!("Failed to read {}: {}", path.display(), e))
        })
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn write_backup(transport: &LocalTransport, y: i32, m: u32, d: u32, h: u32) -> String {
        let created_at = Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
        let name = BackupDescriptor::at(created_at, true).file_name();
        transport.put(&name, b"x").unwrap();
        name
    }

    #[test]
    fn test_put_get() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path().join("backups"));

        transport.put("a.nbak", b"bytes").unwrap();
        assert_eq!(transport.get("a.nbak").unwrap(), b"bytes");
    }

    #[test]
    fn test_missing_object_is_fatal() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path().to_path_buf());

        let err = transport.get("absent.nbak").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path().join("backups"));

        assert!(transport.put("../escape", b"x").is_err());
        assert!(!temp.path().join("escape").exists());
    }

    #[test]
    fn test_list_sorted_newest_first_and_ignores_strangers() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path().to_path_buf());

        let older = write_backup(&transport, 2025, 3, 4, 10);
        let newer = write_backup(&transport, 2025, 3, 5, 10);
        fs::write(temp.path().join("notes.txt"), b"unrelated").unwrap();

        let names: Vec<_> = transport
            .list()
            .unwrap()
            .into_iter()
            .map(|b| b.file_name())
            .collect();
        assert_eq!(names, vec![newer.clone(), older]);
        assert_eq!(transport.latest().unwrap().unwrap().file_name(), newer);
    }

    #[test]
    fn test_latest_keeps_on_disk_name() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path().to_path_buf());
        let legacy = "notes-backup-20250101-120000.nbak";
        let short_millis = "notes-backup-20250102-120000-5.tar.gz";
        transport.put(legacy, b"old").unwrap();
        transport.put(short_millis, b"newer").unwrap();

        let latest = transport.latest().unwrap().unwrap();
        assert_eq!(latest.file_name(), short_millis);
        assert_eq!(transport.get(&latest.file_name()).unwrap(), b"newer");

        let oldest = transport.list().unwrap().pop().unwrap();
        assert_eq!(oldest.file_name(), legacy);
        assert_eq!(transport.get(&oldest.file_name()).unwrap(), b"old");
    }

    #[test]
    fn test_retention_policy() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path().to_path_buf());

        for day in 2..7 {
            write_backup(&transport, 2025, 3, day, 12);
        }
        write_backup(&transport, 2025, 2, 1, 12);
        write_backup(&transport, 2025, 1, 1, 12);

        let retention = BackupRetention {
            daily_count: 3,
            monthly_count: 1,
        };
        let deleted = transport.enforce_retention(&retention).unwrap();
        assert_eq!(deleted.len(), 3);

        let remaining = transport.list().unwrap();
        assert_eq!(remaining.len(), 4);
        assert_eq!(remaining.iter().filter(|b| b.is_monthly).count(), 1);
    }
}
