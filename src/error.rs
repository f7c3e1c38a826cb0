//! Custom error types for noteguard
//!
//! This module defines the error hierarchy for the backup subsystem using
//! thiserror for ergonomic error definitions. Every pipeline step returns a
//! `NoteguardResult`, and the first error aborts the run.

use std::fmt;

use thiserror::Error;

/// How a transport failure should be treated by whoever scheduled the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Unreachable host or timeout; trying again later may succeed
    Retryable,
    /// Rejected credentials or any other definite failure
    Fatal,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A failure reading from or writing to a backup destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// HTTP status, when the remote answered at all
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Retryable,
            status: None,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Fatal,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == TransportErrorKind::Retryable
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}, HTTP {})", self.message, self.kind, status),
            None => write!(f, "{} ({})", self.message, self.kind),
        }
    }
}

impl std::error::Error for TransportError {}

/// The main error type for noteguard operations
#[derive(Error, Debug)]
pub enum NoteguardError {
    /// Encryption was requested but no usable password was supplied
    #[error("A non-empty password is required to create an encrypted backup")]
    MissingPassword,

    /// Decryption failed. Without more information this cannot be told apart
    /// from a damaged file.
    #[error("Wrong password or corrupted file: {0}")]
    Cipher(String),

    /// The container format itself is damaged
    #[error("Archive error: {0}")]
    Archive(String),

    /// The container was readable but its payload is not a valid snapshot
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// Destination could not be read or written
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Another backup or restore currently holds the operation lock
    #[error("Another backup or restore operation is already in progress")]
    OperationInProgress,

    /// A decoded snapshot failed its structural checks
    #[error("Validation error: {0}")]
    Validation(String),

    /// The run was cancelled before reaching its critical section
    #[error("Operation cancelled during {stage}")]
    Cancelled { stage: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Key derivation or cipher setup errors (not decryption failures)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Note store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Secret store errors
    #[error("Secret store error: {0}")]
    Secret(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },
}

impl NoteguardError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when the user should be told "wrong password or corrupted file"
    pub fn is_bad_password(&self) -> bool {
        matches!(self, Self::Cipher(_))
    }

    /// True for archive or payload corruption
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Archive(_) | Self::MalformedArchive(_))
    }

    /// True when a scheduler may try the same run again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_retryable())
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for NoteguardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NoteguardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<TransportError> for NoteguardError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// Result type alias for noteguard operations
pub type NoteguardResult<T> = Result<T, NoteguardError>;
