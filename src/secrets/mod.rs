//! Credential storage for noteguard
//!
//! Pipelines and transports read secrets through the [`SecretStore`]
//! capability and never assume a particular backing. The production store
//! is an AES-256-GCM encrypted file whose master key lives in the OS keyring.

mod credential;
mod file;
mod master_key;

use std::collections::HashMap;
use std::sync::RwLock;

pub use credential::{WebDavCredential, BACKUP_PASSWORD_KEY};
pub use file::EncryptedFileSecretStore;
pub use master_key::load_or_create_master_key;

use crate::crypto::SecureString;
use crate::error::{NoteguardError, NoteguardResult};

/// String-keyed secret storage
///
/// The batch operations are atomic: readers never observe some of the keys
/// of a `put_many` or `delete_many` without the others.
pub trait SecretStore: Send + Sync {
    /// Read several keys from one consistent view, in the order given
    fn get_many(&self, keys: &[&str]) -> NoteguardResult<Vec<Option<SecureString>>>;

    fn put_many(&self, entries: &[(&str, &str)]) -> NoteguardResult<()>;

    /// Remove `keys`; removing a missing key is not an error
    fn delete_many(&self, keys: &[&str]) -> NoteguardResult<()>;

    fn get(&self, key: &str) -> NoteguardResult<Option<SecureString>> {
        Ok(self.get_many(&[key])?.pop().flatten())
    }

    fn put(&self, key: &str, value: &str) -> NoteguardResult<()> {
        self.put_many(&[(key, value)])
    }

    fn delete(&self, key: &str) -> NoteguardResult<()> {
        self.delete_many(&[key])
    }
}

/// Process-local secret store, for tests and embedding
#[derive(Default)]
pub struct MemorySecretStore {
    values: RwLock<HashMap<String, SecureString>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get_many(&self, keys: &[&str]) -> NoteguardResult<Vec<Option<SecureString>>> {
        let values = self
            .values
            .read()
            .map_err(|e| NoteguardError::Secret(format!("Failed to acquire read lock: {}", e)))?;
        Ok(keys.iter().map(|key| values.get(*key).cloned()).collect())
    }

    fn put_many(&self, entries: &[(&str, &str)]) -> NoteguardResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|e| NoteguardError::Secret(format!("Failed to acquire write lock: {}", e)))?;
        for (key, value) in entries {
            values.insert(key.to_string(), SecureString::new(*value));
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[&str]) -> NoteguardResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|e| NoteguardError::Secret(format!("Failed to acquire write lock: {}", e)))?;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemorySecretStore::new();
        assert!(store.get("k").unwrap().is_none());

        store.put("k", "v1").unwrap();
        store.put("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().as_str(), "v2");

        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_batch_operations() {
        let store = MemorySecretStore::new();
        store.put_many(&[("a", "1"), ("b", "2")]).unwrap();

        let values = store.get_many(&["b", "missing", "a"]).unwrap();
        let values: Vec<_> = values
            .iter()
            .map(|v| v.as_ref().map(|s| s.as_str().to_string()))
            .collect();
        assert_eq!(
            values,
            vec![Some("2".to_string()), None, Some("1".to_string())]
        );

        store.delete_many(&["a", "b"]).unwrap();
        assert!(store.get_many(&["a", "b"]).unwrap().iter().all(Option::is_none));
    }
}
