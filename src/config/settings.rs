//! User settings for noteguard
//!
//! Manages backup preferences including whether backups are encrypted, key
//! derivation cost, where backups go, retention, and the periodic schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::NoteguardPaths;
use crate::crypto::key_derivation::KeyDerivationParams;
use crate::error::NoteguardError;
use crate::storage::file_io::write_json_atomic;

/// Where backups are written to and restored from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// The local backup directory
    #[default]
    Local,
    /// A WebDAV endpoint configured through the credential store
    WebDav,
}

impl Destination {
    /// Parse a destination from a CLI string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" | "disk" => Some(Self::Local),
            "webdav" | "dav" | "remote" => Some(Self::WebDav),
            _ => None,
        }
    }
}

/// Backup retention settings for local backups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRetention {
    /// Number of daily backups to keep
    pub daily_count: u32,
    /// Number of monthly backups to keep
    pub monthly_count: u32,
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self {
            daily_count: 30,
            monthly_count: 12,
        }
    }
}

/// Periodic backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Whether the periodic backup is active
    #[serde(default)]
    pub enabled: bool,
    /// Hours between runs
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

fn default_interval_hours() -> u64 {
    24
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
        }
    }
}

impl ScheduleSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.max(1) * 3600)
    }
}

/// User settings for noteguard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Whether backups are encrypted with a password
    #[serde(default = "default_encrypt_backup")]
    pub encrypt_backup: bool,

    /// Key derivation cost used for new encrypted backups
    #[serde(default)]
    pub kdf: KeyDerivationParams,

    /// Default destination for backups and restores
    #[serde(default)]
    pub destination: Destination,

    /// Retention policy for local backups
    #[serde(default)]
    pub backup_retention: BackupRetention,

    /// Periodic backup schedule
    #[serde(default)]
    pub schedule: ScheduleSettings,

    /// Upper bound for a single WebDAV request
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_schema_version() -> u32 {
    1
}

fn default_encrypt_backup() -> bool {
    true
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            encrypt_backup: default_encrypt_backup(),
            kdf: KeyDerivationParams::default(),
            destination: Destination::default(),
            backup_retention: BackupRetention::default(),
            schedule: ScheduleSettings::default(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &NoteguardPaths) -> Result<Self, NoteguardError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                NoteguardError::Io(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                NoteguardError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            settings.kdf.check_restorable()?;
            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &NoteguardPaths) -> Result<(), NoteguardError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.encrypt_backup);
        assert_eq!(settings.destination, Destination::Local);
        assert_eq!(settings.kdf.memory_cost, 65536);
        assert_eq!(settings.schedule.interval(), Duration::from_secs(86400));
        assert_eq!(settings.backup_retention.daily_count, 30);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = NoteguardPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.destination = Destination::WebDav;
        settings.encrypt_backup = false;

        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.destination, Destination::WebDav);
        assert!(!loaded.encrypt_backup);
    }

    #[test]
    fn test_unrestorable_kdf_rejected_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = NoteguardPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        std::fs::write(
            paths.settings_file(),
            r#"{"kdf": {"memory_cost": 8, "time_cost": 65, "parallelism": 1}}"#,
        )
        .unwrap();

        assert!(Settings::load_or_create(&paths).is_err());
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"destination":"webdav"}"#).unwrap();
        assert_eq!(settings.destination, Destination::WebDav);
        assert!(settings.encrypt_backup);
        assert_eq!(settings.http_timeout_secs, 30);
    }

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse("WebDAV"), Some(Destination::WebDav));
        assert_eq!(Destination::parse("local"), Some(Destination::Local));
        assert_eq!(Destination::parse("ftp"), None);
    }
}
