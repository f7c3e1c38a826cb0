//! Binary layout of encrypted backup files
//!
//! ```text
//! version(1) | memory_cost(4, LE) | time_cost(4, LE) | parallelism(4, LE)
//!            | salt(16) | nonce(12) | ciphertext || tag(16)
//! ```
//!
//! Everything before the nonce is passed to AES-GCM as associated data, so a
//! modified version byte, cost parameter or salt fails authentication just
//! like a modified ciphertext does. Salt and nonce are fresh for every seal.

use tracing::debug;

use crate::error::{NoteguardError, NoteguardResult};

use super::encryption::{decrypt_bytes, encrypt_bytes, NONCE_SIZE, TAG_SIZE};
use super::key_derivation::{derive_key, generate_salt, KeyDerivationParams, SALT_LEN};

/// Current encrypted format (Argon2id + AES-256-GCM)
pub const FORMAT_VERSION: u8 = 2;

/// Unauthenticated CBC format written by older app versions
pub const LEGACY_CBC_VERSION: u8 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const PARAMS_LEN: usize = 12;

/// Length of the authenticated header (version, params, salt)
pub const HEADER_LEN: usize = 1 + PARAMS_LEN + SALT_LEN;

/// Smallest possible encrypted file: header, nonce and an empty ciphertext's tag
pub const MIN_BLOB_LEN: usize = HEADER_LEN + NONCE_SIZE + TAG_SIZE;

/// What kind of backup file a byte stream looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    /// A bare gzip-compressed archive
    Plain,
    /// A sealed archive in the current format
    Encrypted,
    /// A sealed archive in the legacy CBC format
    LegacyCbc,
    /// Nothing recognisable
    Unknown,
}

impl BackupFormat {
    /// Classify a backup file by its leading bytes
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&GZIP_MAGIC) {
            Self::Plain
        } else {
            match bytes.first() {
                Some(&FORMAT_VERSION) => Self::Encrypted,
                Some(&LEGACY_CBC_VERSION) => Self::LegacyCbc,
                _ => Self::Unknown,
            }
        }
    }
}

/// A parsed encrypted backup
#[derive(Debug, Clone)]
pub struct EncryptedBlob {
    pub params: KeyDerivationParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    fn header(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.push(FORMAT_VERSION);
        header.extend_from_slice(&self.params.memory_cost.to_le_bytes());
        header.extend_from_slice(&self.params.time_cost.to_le_bytes());
        header.extend_from_slice(&self.params.parallelism.to_le_bytes());
        header.extend_from_slice(&self.salt);
        header
    }

    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header();
        out.reserve(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the on-disk layout
    ///
    /// Any structural problem is reported as [`NoteguardError::Cipher`]: at
    /// this point a damaged file and a foreign one look the same.
    pub fn parse(bytes: &[u8]) -> NoteguardResult<Self> {
        if bytes.len() < MIN_BLOB_LEN {
            return Err(NoteguardError::Cipher(format!(
                "encrypted backup is truncated ({} bytes)",
                bytes.len()
            )));
        }

        if bytes[0] != FORMAT_VERSION {
            return Err(NoteguardError::Cipher(format!(
                "unsupported encrypted format version {}",
                bytes[0]
            )));
        }

        // A damaged header must not make restore allocate gigabytes before
        // authentication has a chance to fail.
        let params = KeyDerivationParams::with_values(
            read_u32(bytes, 1),
            read_u32(bytes, 5),
            read_u32(bytes, 9),
        );
        params.check_restorable().map_err(|_| {
            NoteguardError::Cipher("implausible key derivation parameters in header".to_string())
        })?;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[1 + PARAMS_LEN..HEADER_LEN]);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + NONCE_SIZE]);

        Ok(Self {
            params,
            salt,
            nonce,
            ciphertext: bytes[HEADER_LEN + NONCE_SIZE..].to_vec(),
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Encrypt `plaintext` with a key derived from `password`
///
/// Generates a new salt and nonce on every call.
pub fn seal(
    plaintext: &[u8],
    password: &str,
    params: &KeyDerivationParams,
) -> NoteguardResult<Vec<u8>> {
    params.check_restorable()?;

    let salt = generate_salt();
    let key = derive_key(password, &salt, params)?;

    let mut blob = EncryptedBlob {
        params: *params,
        salt,
        nonce: [0u8; NONCE_SIZE],
        ciphertext: Vec::new(),
    };
    let (nonce, ciphertext) = encrypt_bytes(plaintext, &key, &blob.header())?;
    blob.nonce = nonce;
    blob.ciphertext = ciphertext;

    debug!(
        plaintext_len = plaintext.len(),
        memory_cost = params.memory_cost,
        "sealed backup payload"
    );
    Ok(blob.to_bytes())
}

/// Decrypt a sealed backup with `password`
pub fn open(bytes: &[u8], password: &str) -> NoteguardResult<Vec<u8>> {
    let blob = EncryptedBlob::parse(bytes)?;
    let key = derive_key(password, &blob.salt, &blob.params)?;
    decrypt_bytes(&blob.nonce, &blob.ciphertext, &key, &blob.header())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::{MAX_PARALLELISM, MAX_TIME_COST};

    fn params() -> KeyDerivationParams {
        KeyDerivationParams::for_testing()
    }

    #[test]
    fn test_seal_open() {
        let sealed = seal(b"archive bytes", "secret", &params()).unwrap();

        assert_eq!(BackupFormat::detect(&sealed), BackupFormat::Encrypted);
        assert_eq!(sealed.len(), MIN_BLOB_LEN + b"archive bytes".len());
        assert_eq!(open(&sealed, "secret").unwrap(), b"archive bytes");
    }

    #[test]
    fn test_salt_and_nonce_fresh_per_seal() {
        let a = EncryptedBlob::parse(&seal(b"same", "pw", &params()).unwrap()).unwrap();
        let b = EncryptedBlob::parse(&seal(b"same", "pw", &params()).unwrap()).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_wrong_password() {
        let sealed = seal(b"archive bytes", "secret", &params()).unwrap();
        assert!(open(&sealed, "Secret").unwrap_err().is_bad_password());
    }

    #[test]
    fn test_any_flipped_byte_is_detected() {
        let sealed = seal(b"0123456789abcdef", "secret", &params()).unwrap();

        for i in 0..sealed.len() {
            let mut damaged = sealed.clone();
            damaged[i] ^= 0x01;
            assert!(open(&damaged, "secret").is_err(), "flip at {} undetected", i);
        }
    }

    #[test]
    fn test_header_params_are_authenticated() {
        let mut sealed = seal(b"data", "secret", &params()).unwrap();
        // Bump time_cost from 1 to 2; still a valid Argon2 configuration.
        sealed[5] = 2;

        assert!(open(&sealed, "secret").unwrap_err().is_bad_password());
    }

    #[test]
    fn test_implausible_params_rejected_before_derivation() {
        let mut sealed = seal(b"data", "secret", &params()).unwrap();
        sealed[1..5].copy_from_slice(&u32::MAX.to_le_bytes());

        assert!(open(&sealed, "secret").unwrap_err().is_bad_password());
    }

    #[test]
    fn test_seal_at_ceiling_opens() {
        let ceiling = KeyDerivationParams::with_values(8 * MAX_PARALLELISM, 2, MAX_PARALLELISM);
        let sealed = seal(b"data", "secret", &ceiling).unwrap();
        assert_eq!(open(&sealed, "secret").unwrap(), b"data");
    }

    #[test]
    fn test_seal_refuses_unrestorable_params() {
        let too_slow = KeyDerivationParams::with_values(8, MAX_TIME_COST + 1, 1);
        let err = seal(b"data", "secret", &too_slow).unwrap_err();
        assert!(!err.is_bad_password());
        assert!(err.to_string().contains("restore limits"));
    }

    #[test]
    fn test_truncated_blob() {
        let sealed = seal(b"data", "secret", &params()).unwrap();
        assert!(open(&sealed[..MIN_BLOB_LEN - 1], "secret").is_err());
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(BackupFormat::detect(&[0x1f, 0x8b, 0x08]), BackupFormat::Plain);
        assert_eq!(BackupFormat::detect(&[1, 0, 0]), BackupFormat::LegacyCbc);
        assert_eq!(BackupFormat::detect(b"PK\x03\x04"), BackupFormat::Unknown);
        assert_eq!(BackupFormat::detect(&[]), BackupFormat::Unknown);
    }
}
