use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const FILE_PREFIX: &str = "notes-backup-";
const ENCRYPTED_SUFFIX: &str = ".nbak";
const PLAIN_SUFFIX: &str = ".tar.gz";

/// Name, time and destination of one backup run
///
/// Purely descriptive: nothing here is stored beyond the file name itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    pub created_at: DateTime<Utc>,
    pub encrypted: bool,
    /// Where the file went, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl BackupDescriptor {
    /// Describe a backup taken now
    pub fn now(encrypted: bool) -> Self {
        Self::at(Utc::now(), encrypted)
    }

    pub fn at(created_at: DateTime<Utc>, encrypted: bool) -> Self {
        Self {
            created_at,
            encrypted,
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// File or object name: `notes-backup-YYYYMMDD-HHMMSS-mmm.nbak` when
    /// encrypted, `.tar.gz` otherwise
    pub fn file_name(&self) -> String {
        format!(
            "{}{}-{:03}{}",
            FILE_PREFIX,
            self.created_at.format("%Y%m%d-%H%M%S"),
            self.created_at.timestamp_subsec_millis(),
            if self.encrypted {
                ENCRYPTED_SUFFIX
            } else {
                PLAIN_SUFFIX
            }
        )
    }

    /// Recover a descriptor from a backup file name
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(FILE_PREFIX)?;
        let (date_part, encrypted) = if let Some(stem) = rest.strip_suffix(ENCRYPTED_SUFFIX) {
            (stem, true)
        } else {
            (rest.strip_suffix(PLAIN_SUFFIX)?, false)
        };

        Some(Self::at(parse_backup_timestamp(date_part)?, encrypted))
    }
}

/// A backup found in the local backup directory
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub descriptor: BackupDescriptor,
    /// Name as found on disk; older builds wrote names without milliseconds
    pub name: String,
    /// Full path to backup
    pub path: PathBuf,
    /// Size in bytes
    pub size_bytes: u64,
    /// Whether this is a monthly backup (kept longer)
    pub is_monthly: bool,
}

impl BackupInfo {
    pub fn file_name(&self) -> String {
        self.name.clone()
    }
}

/// Parse a backup timestamp from the filename date part
fn parse_backup_timestamp(date_str: &str) -> Option<DateTime<Utc>> {
    // Expected format: YYYYMMDD-HHMMSS or YYYYMMDD-HHMMSS-mmm (with milliseconds)
    let parts: Vec<&str> = date_str.split('-').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let date_part = parts[0];
    let time_part = parts[1];
    let millis: u32 = if parts.len() == 3 {
        parts[2].parse().ok()?
    } else {
        0
    };

    if date_part.len() != 8 || time_part.len() != 6 {
        return None;
    }

    let year: i32 = date_part.get(0..4)?.parse().ok()?;
    let month: u32 = date_part.get(4..6)?.parse().ok()?;
    let day: u32 = date_part.get(6..8)?.parse().ok()?;
    let hour: u32 = time_part.get(0..2)?.parse().ok()?;
    let minute: u32 = time_part.get(2..4)?.parse().ok()?;
    let second: u32 = time_part.get(4..6)?.parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = chrono::NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;
    let datetime = chrono::NaiveDateTime::new(date, time);

    Some(DateTime::from_naive_utc_and_offset(datetime, Utc))
}
