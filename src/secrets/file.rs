//! Encrypted file secret store
//!
//! All secrets live in one JSON map sealed with AES-256-GCM. The file is read
//! and decrypted on every call, so a credential saved by another process is
//! picked up by the next transport operation without a restart.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::crypto::{decrypt, encrypt, DerivedKey, EncryptedData, SecureString};
use crate::error::{NoteguardError, NoteguardResult};
use crate::storage::file_io::write_json_atomic;

use super::SecretStore;

type SecretMap = BTreeMap<String, String>;

/// Secret store backed by an encrypted JSON file
pub struct EncryptedFileSecretStore {
    path: PathBuf,
    key: DerivedKey,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl EncryptedFileSecretStore {
    pub fn new(path: PathBuf, key: DerivedKey) -> Self {
        Self {
            path,
            key,
            write_lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> NoteguardResult<SecretMap> {
        if !self.path.exists() {
            return Ok(SecretMap::new());
        }

        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| NoteguardError::Secret(format!("Failed to read secret store: {}", e)))?;
        let encrypted: EncryptedData = serde_json::from_str(&contents)
            .map_err(|e| NoteguardError::Secret(format!("Invalid secret store file: {}", e)))?;

        let plaintext = Zeroizing::new(decrypt(&encrypted, &self.key).map_err(|_| {
            NoteguardError::Secret("Secret store could not be decrypted with the master key".into())
        })?);

        serde_json::from_slice(&plaintext)
            .map_err(|e| NoteguardError::Secret(format!("Invalid secret store contents: {}", e)))
    }

    fn write_map(&self, map: &SecretMap) -> NoteguardResult<()> {
        let plaintext = Zeroizing::new(serde_json::to_vec(map)?);
        let encrypted = encrypt(&plaintext, &self.key)?;
        write_json_atomic(&self.path, &encrypted)?;
        restrict_permissions(&self.path)
    }

    fn modify<F>(&self, change: F) -> NoteguardResult<()>
    where
        F: FnOnce(&mut SecretMap),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| NoteguardError::Secret(format!("Failed to acquire lock: {}", e)))?;

        let mut map = self.read_map()?;
        change(&mut map);
        self.write_map(&map)
    }
}

impl SecretStore for EncryptedFileSecretStore {
    fn get_many(&self, keys: &[&str]) -> NoteguardResult<Vec<Option<SecureString>>> {
        let mut map = self.read_map()?;
        Ok(keys
            .iter()
            .map(|key| map.remove(*key).map(SecureString::from))
            .collect())
    }

    fn put_many(&self, entries: &[(&str, &str)]) -> NoteguardResult<()> {
        self.modify(|map| {
            for (key, value) in entries {
                map.insert(key.to_string(), value.to_string());
            }
        })
    }

    fn delete_many(&self, keys: &[&str]) -> NoteguardResult<()> {
        self.modify(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }
}

pub(super) fn restrict_permissions(path: &std::path::Path) -> NoteguardResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn test_put_get_delete() {
        let temp = TempDir::new().unwrap();
        let store =
            EncryptedFileSecretStore::new(temp.path().join("secrets.json"), DerivedKey::from_bytes(key()));

        store.put("webdav.password", "hunter2").unwrap();
        assert_eq!(
            store.get("webdav.password").unwrap().unwrap().as_str(),
            "hunter2"
        );

        store.delete("webdav.password").unwrap();
        assert!(store.get("webdav.password").unwrap().is_none());
    }

    #[test]
    fn test_file_does_not_contain_plaintext() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.json");
        let store = EncryptedFileSecretStore::new(path.clone(), DerivedKey::from_bytes(key()));

        store.put("webdav.password", "hunter2").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("hunter2"));
        assert!(!raw.contains("webdav.password"));
    }

    #[test]
    fn test_updates_visible_across_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.json");
        let reader = EncryptedFileSecretStore::new(path.clone(), DerivedKey::from_bytes(key()));
        let writer = EncryptedFileSecretStore::new(path, DerivedKey::from_bytes(key()));

        writer.put("webdav.username", "alice").unwrap();
        assert_eq!(reader.get("webdav.username").unwrap().unwrap().as_str(), "alice");

        writer.put("webdav.username", "bob").unwrap();
        assert_eq!(reader.get("webdav.username").unwrap().unwrap().as_str(), "bob");
    }

    #[test]
    fn test_batch_operations() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.json");
        let store = EncryptedFileSecretStore::new(path, DerivedKey::from_bytes(key()));
        store.put("a", "old").unwrap();
        store.put_many(&[("a", "new"), ("b", "2")]).unwrap();

        let values = store.get_many(&["a", "b"]).unwrap();
        assert_eq!(values[0].as_ref().unwrap().as_str(), "new");
        assert_eq!(values[1].as_ref().unwrap().as_str(), "2");

        store.delete_many(&["a", "b"]).unwrap();
        assert!(store.get_many(&["a", "b"]).unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_wrong_master_key_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.json");
        EncryptedFileSecretStore::new(path.clone(), DerivedKey::from_bytes(key()))
            .put("k", "v")
            .unwrap();

        let other = EncryptedFileSecretStore::new(path, DerivedKey::from_bytes([8u8; 32]));
        assert!(matches!(other.get("k"), Err(NoteguardError::Secret(_))));
    }
}
