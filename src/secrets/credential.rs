//! WebDAV credential stored in a [`SecretStore`]

use std::fmt;

use crate::crypto::SecureString;
use crate::error::{NoteguardError, NoteguardResult};

use super::SecretStore;

const URL_KEY: &str = "webdav.url";
const USERNAME_KEY: &str = "webdav.username";
const PASSWORD_KEY: &str = "webdav.password";

/// Backup password remembered for scheduled runs
pub const BACKUP_PASSWORD_KEY: &str = "backup.password";

/// Connection details for a WebDAV backup destination
#[derive(Clone)]
pub struct WebDavCredential {
    pub base_url: String,
    pub username: String,
    pub password: SecureString,
}

impl fmt::Debug for WebDavCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDavCredential")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

impl WebDavCredential {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<SecureString>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read the credential; `None` until all three parts have been saved
    pub fn load(store: &dyn SecretStore) -> NoteguardResult<Option<Self>> {
        let mut parts = store
            .get_many(&[URL_KEY, USERNAME_KEY, PASSWORD_KEY])?
            .into_iter();
        let (url, username, password) = (
            parts.next().flatten(),
            parts.next().flatten(),
            parts.next().flatten(),
        );

        Ok(match (url, username, password) {
            (Some(url), Some(username), Some(password)) => Some(Self {
                base_url: url.as_str().to_string(),
                username: username.as_str().to_string(),
                password,
            }),
            _ => None,
        })
    }

    /// Create or update the stored credential
    pub fn save(&self, store: &dyn SecretStore) -> NoteguardResult<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NoteguardError::Config(format!(
                "WebDAV URL must start with http:// or https://: {}",
                url
            )));
        }

        store.put_many(&[
            (URL_KEY, url),
            (USERNAME_KEY, self.username.as_str()),
            (PASSWORD_KEY, self.password.as_str()),
        ])
    }

    /// Remove every stored part of the credential
    pub fn clear(store: &dyn SecretStore) -> NoteguardResult<()> {
        store.delete_many(&[URL_KEY, USERNAME_KEY, PASSWORD_KEY])
    }
}
