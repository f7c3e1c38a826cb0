//! noteguard - encrypted backup and restore for a local note store
//!
//! This library snapshots every note, packs the snapshot into a compressed
//! archive, optionally seals it with a password, and writes it to a local
//! directory or a WebDAV server. Restores run the same steps in reverse and
//! replace the whole store atomically.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `crypto`: Key derivation, AES-256-GCM and the sealed backup format
//! - `models`: Records and snapshots
//! - `archive`: Deterministic tar+gzip codec
//! - `storage`: The note store and atomic file writes
//! - `secrets`: Credential storage behind the `SecretStore` trait
//! - `transport`: Local and WebDAV backup destinations
//! - `backup`: Backup and restore pipelines, the operation lock and service
//! - `scheduler`: Periodic automatic backups
//! - `cli`: Command handlers for the `noteguard` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use noteguard::config::{paths::NoteguardPaths, settings::Settings};
//!
//! let paths = NoteguardPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod archive;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod secrets;
pub mod storage;
pub mod transport;

pub use error::{NoteguardError, NoteguardResult};
