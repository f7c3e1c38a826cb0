//! Cryptographic functions for noteguard
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation for
//! password-protected backups and for the local credential store.

pub mod encryption;
pub mod envelope;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{decrypt, encrypt, EncryptedData};
pub use envelope::{open, seal, BackupFormat, EncryptedBlob};
pub use key_derivation::{derive_key, generate_salt, DerivedKey, KeyDerivationParams};
pub use secure_memory::SecureString;
