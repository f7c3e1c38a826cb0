//! Master key for the encrypted secret store
//!
//! The key is generated once and kept in the OS keyring. Hosts without a
//! usable keyring (headless servers, CI) fall back to a 0600 key file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::key_derivation::KEY_LEN;
use crate::crypto::DerivedKey;
use crate::error::{NoteguardError, NoteguardResult};

const KEYRING_SERVICE: &str = "noteguard";
const KEYRING_ACCOUNT: &str = "secret-store-master-key";

fn decode_key(encoded: &str) -> NoteguardResult<DerivedKey> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| NoteguardError::Secret(format!("Invalid master key encoding: {}", e)))?,
    );
    let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        NoteguardError::Secret(format!("Master key must be {} bytes", KEY_LEN))
    })?;
    Ok(DerivedKey::from_bytes(key))
}

fn keyring_entry() -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
}

fn keyring_get() -> Result<Option<String>, keyring::Error> {
    match keyring_entry()?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

fn keyring_set(value: &str) -> Result<(), keyring::Error> {
    keyring_entry()?.set_password(value)
}

/// Create `path` for writing, failing if it exists; owner-only from the start
fn create_private_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn keyfile_read(path: &Path) -> NoteguardResult<DerivedKey> {
    let encoded = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        NoteguardError::Secret(format!("Failed to read key file {}: {}", path.display(), e))
    })?);
    decode_key(&encoded)
}

fn keyfile_load_or_create(path: &Path) -> NoteguardResult<DerivedKey> {
    if path.exists() {
        return keyfile_read(path);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = match create_private_file(path) {
        Ok(file) => file,
        // Another process created it first
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return keyfile_read(path),
        Err(e) => {
            return Err(NoteguardError::Secret(format!(
                "Failed to create key file {}: {}",
                path.display(),
                e
            )))
        }
    };

    let key = DerivedKey::generate();
    let encoded = Zeroizing::new(STANDARD.encode(key.as_bytes()));
    file.write_all(encoded.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            NoteguardError::Secret(format!("Failed to write key file {}: {}", path.display(), e))
        })?;
    Ok(key)
}

/// Load the secret store master key, creating it on first use
///
/// An existing key file always wins so that a host which once fell back to it
/// keeps decrypting its store after the keyring becomes available.
pub fn load_or_create_master_key(key_file: &Path) -> NoteguardResult<DerivedKey> {
    if key_file.exists() {
        debug!(path = %key_file.display(), "using master key file");
        return keyfile_load_or_create(key_file);
    }

    match keyring_get() {
        Ok(Some(encoded)) => {
            let encoded = Zeroizing::new(encoded);
            return decode_key(&encoded);
        }
        Ok(None) => {
            let key = DerivedKey::generate();
            let encoded = Zeroizing::new(STANDARD.encode(key.as_bytes()));
            match keyring_set(&encoded) {
                Ok(()) => {
                    debug!("stored new master key in the OS keyring");
                    return Ok(key);
                }
                Err(err) => warn!(error = %err, "keyring write failed, using key file"),
            }
        }
        Err(err) => warn!(error = %err, "keyring unavailable, using key file"),
    }

    keyfile_load_or_create(key_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.key");

        let first = keyfile_load_or_create(&path).unwrap();
        let second = keyfile_load_or_create(&path).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_created_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.key");
        let file = create_private_file(&path).unwrap();

        // Restricted before anything has been written
        let mode = file.metadata().unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_create_private_file_refuses_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.key");
        std::fs::write(&path, b"kept").unwrap();

        let err = create_private_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"kept");
    }

    #[test]
    fn test_existing_key_file_wins() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.key");
        std::fs::write(&path, STANDARD.encode([3u8; 32])).unwrap();

        let key = load_or_create_master_key(&path).unwrap();
        assert_eq!(key.as_bytes(), &[3u8; 32]);
    }

    #[test]
    fn test_bad_key_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.key");
        std::fs::write(&path, STANDARD.encode([3u8; 8])).unwrap();

        assert!(matches!(
            load_or_create_master_key(&path),
            Err(NoteguardError::Secret(_))
        ));
    }
}
