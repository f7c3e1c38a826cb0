//! Path management for noteguard
//!
//! Provides platform-appropriate path resolution for configuration, the note
//! store, local backups, and staging files.
//!
//! ## Path Resolution Order
//!
//! 1. `NOTEGUARD_DATA_DIR` environment variable (if set)
//! 2. The platform config directory from `directories::ProjectDirs`
//!    (`~/.config/noteguard` on Linux)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::NoteguardError;

/// Name of the record-store file. The backup archive carries one entry with
/// this name.
pub const NOTES_FILE_NAME: &str = "notes.json";

/// Manages all paths used by noteguard
#[derive(Debug, Clone)]
pub struct NoteguardPaths {
    /// Base directory for all noteguard data
    base_dir: PathBuf,
}

impl NoteguardPaths {
    /// Create a new NoteguardPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no platform config directory can be determined.
    pub fn new() -> Result<Self, NoteguardError> {
        let base_dir = if let Ok(custom) = std::env::var("NOTEGUARD_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create NoteguardPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the data directory holding the record store
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the local backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Get the directory for intermediate archive files
    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("staging")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the record store
    pub fn notes_file(&self) -> PathBuf {
        self.data_dir().join(NOTES_FILE_NAME)
    }

    /// Get the path to the encrypted credential store
    pub fn secrets_file(&self) -> PathBuf {
        self.base_dir.join("secrets.json")
    }

    /// Fallback location for the credential store master key
    pub fn master_key_file(&self) -> PathBuf {
        self.base_dir.join("secrets.key")
    }

    /// Cross-process backup/restore lock
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("operation.lock")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), NoteguardError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| NoteguardError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| NoteguardError::Io(format!("Failed to create data directory: {}", e)))?;

        std::fs::create_dir_all(self.backup_dir())
            .map_err(|e| NoteguardError::Io(format!("Failed to create backup directory: {}", e)))?;

        std::fs::create_dir_all(self.staging_dir()).map_err(|e| {
            NoteguardError::Io(format!("Failed to create staging directory: {}", e))
        })?;

        Ok(())
    }

    /// Check if noteguard has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, NoteguardError> {
    ProjectDirs::from("", "", "noteguard")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| NoteguardError::Config("Could not determine a config directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = NoteguardPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.data_dir(), temp_dir.path().join("data"));
        assert_eq!(paths.backup_dir(), temp_dir.path().join("backups"));
    }

    #[test]
    fn test_env_var_override() {
        let temp_dir = TempDir::new().unwrap();
        let custom_path = temp_dir.path().to_str().unwrap();

        env::set_var("NOTEGUARD_DATA_DIR", custom_path);

        let paths = NoteguardPaths::new().unwrap();
        assert_eq!(paths.base_dir(), temp_dir.path());

        env::remove_var("NOTEGUARD_DATA_DIR");
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = NoteguardPaths::with_base_dir(temp_dir.path().to_path_buf());

        paths.ensure_directories().unwrap();

        assert!(paths.data_dir().exists());
        assert!(paths.backup_dir().exists());
        assert!(paths.staging_dir().exists());
    }

    #[test]
    fn test_file_paths() {
        let temp_dir = TempDir::new().unwrap();
        let paths = NoteguardPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(
            paths.notes_file(),
            temp_dir.path().join("data").join("notes.json")
        );
    }
}
