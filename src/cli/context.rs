//! Shared state for CLI commands

use std::path::Path;
use std::sync::Arc;

use crate::backup::{BackupService, OperationLock};
use crate::config::settings::Destination;
use crate::config::{NoteguardPaths, Settings};
use crate::error::{NoteguardError, NoteguardResult, TransportError};
use crate::secrets::{load_or_create_master_key, EncryptedFileSecretStore, SecretStore};
use crate::storage::JsonNoteStore;
use crate::transport::{LocalTransport, Transport, WebDavTransport};

/// Everything a command needs, opened once per invocation
pub struct AppContext {
    pub paths: NoteguardPaths,
    pub settings: Settings,
    pub store: Arc<JsonNoteStore>,
    pub service: Arc<BackupService>,
}

impl AppContext {
    pub fn open(paths: NoteguardPaths) -> NoteguardResult<Self> {
        paths.ensure_directories()?;
        let settings = Settings::load_or_create(&paths)?;
        let store = Arc::new(JsonNoteStore::open(paths.notes_file())?);

        let lock = OperationLock::new().with_lock_file(paths.lock_file());
        let service = Arc::new(
            BackupService::new(store.clone(), paths.staging_dir(), &settings).with_lock(lock),
        );

        Ok(Self {
            paths,
            settings,
            store,
            service,
        })
    }

    /// Open the credential store
    ///
    /// Deferred until a command needs it so that purely local commands never
    /// touch the OS keyring.
    pub fn secrets(&self) -> NoteguardResult<Arc<dyn SecretStore>> {
        let key = load_or_create_master_key(&self.paths.master_key_file())?;
        Ok(Arc::new(EncryptedFileSecretStore::new(
            self.paths.secrets_file(),
            key,
        )))
    }

    pub fn local_transport(&self) -> LocalTransport {
        LocalTransport::new(self.paths.backup_dir())
    }

    /// Transport for a configured destination
    pub fn transport(&self, destination: Destination) -> NoteguardResult<Arc<dyn Transport>> {
        match destination {
            Destination::Local => Ok(Arc::new(self.local_transport())),
            Destination::WebDav => {
                let transport = WebDavTransport::new(self.secrets()?, self.settings.http_timeout())
                    .map_err(NoteguardError::from)?;
                Ok(Arc::new(transport))
            }
        }
    }

    /// Transport reading from the directory that holds `file`, and the name
    /// of `file` within it
    pub fn file_transport(file: &Path) -> NoteguardResult<(LocalTransport, String)> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| NoteguardError::backup_not_found(file.display().to_string()))?;
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };

        if !file.exists() {
            return Err(NoteguardError::Transport(TransportError::fatal(format!(
                "{} does not exist",
                file.display()
            ))));
        }
        Ok((LocalTransport::new(dir), name))
    }
}
