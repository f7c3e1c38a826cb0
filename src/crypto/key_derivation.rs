//! Key derivation using Argon2id
//!
//! Derives backup encryption keys from user passwords using Argon2id, a
//! deliberately slow and memory-hard function, so brute-forcing a stolen
//! archive is expensive. Salts are raw bytes generated fresh for every backup.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{NoteguardError, NoteguardResult};

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Largest memory cost (KiB) a backup may be sealed or opened with
pub const MAX_MEMORY_COST: u32 = 1 << 20;

/// Largest time cost a backup may be sealed or opened with
pub const MAX_TIME_COST: u32 = 64;

/// Largest parallelism a backup may be sealed or opened with
pub const MAX_PARALLELISM: u32 = 64;

/// Cost parameters for key derivation
///
/// These travel in the header of every encrypted backup, so changing the
/// defaults never breaks restores of older files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivationParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KeyDerivationParams {
    /// Create params with specific values
    pub fn with_values(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }

    /// The cheapest parameters Argon2 accepts. Only meant for tests.
    pub fn for_testing() -> Self {
        Self::with_values(8, 1, 1)
    }

    fn argon2_params(&self) -> NoteguardResult<Params> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| NoteguardError::Encryption(format!("Invalid Argon2 parameters: {}", e)))
    }

    /// Check that Argon2 accepts these parameters
    pub fn validate(&self) -> NoteguardResult<()> {
        self.argon2_params().map(|_| ())
    }

    /// Check that a backup sealed with these parameters can be opened again
    ///
    /// Restore refuses headers above the `MAX_*` ceilings, so sealing above
    /// them would produce a file nobody can decrypt.
    pub fn check_restorable(&self) -> NoteguardResult<()> {
        if self.memory_cost > MAX_MEMORY_COST
            || self.time_cost > MAX_TIME_COST
            || self.parallelism > MAX_PARALLELISM
        {
            return Err(NoteguardError::Encryption(format!(
                "key derivation parameters exceed restore limits \
                 (memory_cost <= {}, time_cost <= {}, parallelism <= {})",
                MAX_MEMORY_COST, MAX_TIME_COST, MAX_PARALLELISM
            )));
        }
        self.validate()
    }
}

/// A derived encryption key, wiped from memory on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Wrap raw key material, e.g. a stored master key
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

/// Generate a fresh random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive an encryption key from a password and salt
///
/// Pure: the same password, salt and parameters always give the same key.
/// Empty passwords are accepted here; callers that persist "encrypted" data
/// must reject them first.
pub fn derive_key(
    password: &str,
    salt: &[u8; SALT_LEN],
    params: &KeyDerivationParams,
) -> NoteguardResult<DerivedKey> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| NoteguardError::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey { key })
}
