//! AES-256-GCM encryption/decryption
//!
//! Provides authenticated encryption for backup payloads and for the local
//! credential store. Each encryption operation generates a unique nonce.
//! A wrong key or a single flipped bit fails the authentication tag check,
//! so corrupted plaintext is never handed to the caller.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{NoteguardError, NoteguardResult};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

fn cipher_for(key: &DerivedKey) -> NoteguardResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| NoteguardError::Encryption(format!("Failed to create cipher: {}", e)))
}

/// Encrypt `plaintext` under a fresh random nonce
///
/// `aad` is authenticated but not encrypted. Returns the nonce and the
/// ciphertext with its tag appended.
pub fn encrypt_bytes(
    plaintext: &[u8],
    key: &DerivedKey,
    aad: &[u8],
) -> NoteguardResult<([u8; NONCE_SIZE], Vec<u8>)> {
    let cipher = cipher_for(key)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| NoteguardError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt and authenticate `ciphertext`
///
/// Fails with [`NoteguardError::Cipher`] when the tag does not verify, which
/// covers both a wrong key and tampered or truncated data.
pub fn decrypt_bytes(
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    key: &DerivedKey,
    aad: &[u8],
) -> NoteguardResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(NoteguardError::Cipher(format!(
            "ciphertext is {} bytes, shorter than the authentication tag",
            ciphertext.len()
        )));
    }

    cipher_for(key)?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| NoteguardError::Cipher("authentication failed".to_string()))
}

/// Encrypted data in a JSON-friendly form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    /// The nonce used for this encryption (base64 encoded)
    pub nonce: String,
    /// The encrypted ciphertext with authentication tag (base64 encoded)
    pub ciphertext: String,
    /// Version for future algorithm upgrades
    #[serde(default = "default_version")]
    pub version: u8,
}

fn default_version() -> u8 {
    1
}

impl EncryptedData {
    fn new(nonce: &[u8], ciphertext: &[u8]) -> Self {
        Self {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
            version: 1,
        }
    }

    fn decode_nonce(&self) -> NoteguardResult<[u8; NONCE_SIZE]> {
        let bytes = STANDARD
            .decode(&self.nonce)
            .map_err(|e| NoteguardError::Cipher(format!("Invalid nonce encoding: {}", e)))?;

        bytes.as_slice().try_into().map_err(|_| {
            NoteguardError::Cipher(format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                bytes.len()
            ))
        })
    }

    fn decode_ciphertext(&self) -> NoteguardResult<Vec<u8>> {
        STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| NoteguardError::Cipher(format!("Invalid ciphertext encoding: {}", e)))
    }
}

/// Encrypt plaintext into a JSON-friendly envelope
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> NoteguardResult<EncryptedData> {
    let (nonce, ciphertext) = encrypt_bytes(plaintext, key, &[])?;
    Ok(EncryptedData::new(&nonce, &ciphertext))
}

/// Decrypt a JSON-friendly envelope
pub fn decrypt(encrypted: &EncryptedData, key: &DerivedKey) -> NoteguardResult<Vec<u8>> {
    if encrypted.version != 1 {
        return Err(NoteguardError::Encryption(format!(
            "Unsupported encryption version: {}",
            encrypted.version
        )));
    }

    let nonce = encrypted.decode_nonce()?;
    let ciphertext = encrypted.decode_ciphertext()?;
    decrypt_bytes(&nonce, &ciphertext, key, &[])
}
