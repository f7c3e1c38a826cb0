//! Backup destinations
//!
//! A [`Transport`] stores and fetches whole backup files by name. Pipelines
//! only see this trait, so a local directory and a WebDAV server are
//! interchangeable. Every call makes exactly one attempt; retry policy belongs
//! to whoever scheduled the run.

mod local;
mod webdav;

pub use local::LocalTransport;
pub use webdav::{classify_status, WebDavTransport};

use crate::error::TransportError;

/// A sink and source for backup files
pub trait Transport: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous object
    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), TransportError>;

    /// Fetch the object stored under `name`
    fn get(&self, name: &str) -> Result<Vec<u8>, TransportError>;

    /// Human-readable location, for logs and reports
    fn describe(&self) -> String;
}

/// Reject names that could escape the destination
pub(crate) fn check_object_name(name: &str) -> Result<(), TransportError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(TransportError::fatal(format!(
            "invalid backup name '{}'",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_object_name() {
        assert!(check_object_name("notes-backup-20250101-000000-000.nbak").is_ok());
        for bad in ["", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(check_object_name(bad).is_err(), "accepted '{}'", bad);
        }
    }
}
