//! Backup service
//!
//! Entry point used by the CLI and the scheduler. Owns the operation lock so
//! at most one backup or restore runs at a time, and notifies registered
//! listeners after a restore has replaced the store.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::config::Settings;
use crate::crypto::KeyDerivationParams;
use crate::error::{NoteguardError, NoteguardResult};
use crate::storage::NoteStore;
use crate::transport::Transport;

use super::cancel::CancelToken;
use super::lock::OperationLock;
use super::pipeline::{BackupPipeline, BackupReport};
use super::restore::{RestorePipeline, RestoreReport};

/// Outcome of a backup as shown to a user
#[derive(Debug)]
pub enum BackupResult {
    Success(BackupReport),
    BadPassword,
    Error(NoteguardError),
}

/// Outcome of a restore as shown to a user
#[derive(Debug)]
pub enum RestoreResult {
    Success(RestoreReport),
    /// Wrong password, or a file damaged in a way indistinguishable from one
    BadPassword,
    Error(NoteguardError),
}

impl From<NoteguardResult<BackupReport>> for BackupResult {
    fn from(result: NoteguardResult<BackupReport>) -> Self {
        match result {
            Ok(report) => Self::Success(report),
            Err(e) if e.is_bad_password() => Self::BadPassword,
            Err(e) => Self::Error(e),
        }
    }
}

impl From<NoteguardResult<RestoreReport>> for RestoreResult {
    fn from(result: NoteguardResult<RestoreReport>) -> Self {
        match result {
            Ok(report) => Self::Success(report),
            Err(e) if e.is_bad_password() => Self::BadPassword,
            Err(e) => Self::Error(e),
        }
    }
}

impl BackupResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Back to a plain `Result`, for callers that propagate with `?`
    pub fn into_result(self) -> NoteguardResult<BackupReport> {
        match self {
            Self::Success(report) => Ok(report),
            Self::BadPassword => Err(NoteguardError::Cipher("authentication failed".into())),
            Self::Error(e) => Err(e),
        }
    }
}

impl RestoreResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> NoteguardResult<RestoreReport> {
        match self {
            Self::Success(report) => Ok(report),
            Self::BadPassword => Err(NoteguardError::Cipher("authentication failed".into())),
            Self::Error(e) => Err(e),
        }
    }
}

type RestoreHook = Box<dyn Fn(&RestoreReport) + Send + Sync>;

/// Runs backups and restores against one note store
pub struct BackupService {
    store: Arc<dyn NoteStore>,
    staging_dir: PathBuf,
    encrypt_backup: bool,
    kdf: KeyDerivationParams,
    lock: OperationLock,
    on_restored: RwLock<Vec<RestoreHook>>,
}

impl BackupService {
    pub fn new(store: Arc<dyn NoteStore>, staging_dir: PathBuf, settings: &Settings) -> Self {
        Self {
            store,
            staging_dir,
            encrypt_backup: settings.encrypt_backup,
            kdf: settings.kdf,
            lock: OperationLock::new(),
            on_restored: RwLock::new(Vec::new()),
        }
    }

    /// Use `lock` instead of a private in-process lock
    pub fn with_lock(mut self, lock: OperationLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn lock(&self) -> &OperationLock {
        &self.lock
    }

    pub fn encrypts_by_default(&self) -> bool {
        self.encrypt_backup
    }

    /// Call `hook` after every successful restore, once the store has been
    /// reloaded
    pub fn on_restored<F>(&self, hook: F)
    where
        F: Fn(&RestoreReport) + Send + Sync + 'static,
    {
        if let Ok(mut hooks) = self.on_restored.write() {
            hooks.push(Box::new(hook));
        }
    }

    /// Back up with the configured encryption setting
    pub fn run_backup(&self, destination: &dyn Transport, password: Option<&str>) -> BackupResult {
        self.backup(destination, password, self.encrypt_backup, &CancelToken::new())
            .into()
    }

    pub fn run_backup_with_cancel(
        &self,
        destination: &dyn Transport,
        password: Option<&str>,
        cancel: &CancelToken,
    ) -> BackupResult {
        self.backup(destination, password, self.encrypt_backup, cancel)
            .into()
    }

    /// Back up, overriding the configured encryption setting
    pub fn run_backup_with(
        &self,
        destination: &dyn Transport,
        password: Option<&str>,
        encrypt: bool,
        cancel: &CancelToken,
    ) -> BackupResult {
        self.backup(destination, password, encrypt, cancel).into()
    }

    pub fn run_restore(
        &self,
        source: &dyn Transport,
        name: &str,
        password: Option<&str>,
    ) -> RestoreResult {
        self.restore(source, name, password, &CancelToken::new())
            .into()
    }

    pub fn run_restore_with_cancel(
        &self,
        source: &dyn Transport,
        name: &str,
        password: Option<&str>,
        cancel: &CancelToken,
    ) -> RestoreResult {
        self.restore(source, name, password, cancel).into()
    }

    fn backup(
        &self,
        destination: &dyn Transport,
        password: Option<&str>,
        encrypt: bool,
        cancel: &CancelToken,
    ) -> NoteguardResult<BackupReport> {
        if encrypt && password.map_or(true, |p| p.trim().is_empty()) {
            return Err(NoteguardError::MissingPassword);
        }

        let _guard = self.lock.try_acquire()?;
        BackupPipeline::new(self.store.as_ref(), self.staging_dir.clone())
            .encrypt(encrypt)
            .with_kdf(self.kdf)
            .with_cancel(cancel.clone())
            .run(destination, password)
    }

    fn restore(
        &self,
        source: &dyn Transport,
        name: &str,
        password: Option<&str>,
        cancel: &CancelToken,
    ) -> NoteguardResult<RestoreReport> {
        let _guard = self.lock.try_acquire()?;
        let report = RestorePipeline::new(self.store.as_ref())
            .with_cancel(cancel.clone())
            .run(source, name, password)?;

        // The swap is already committed; a failed reload only means cached
        // views are stale until the next start.
        if let Err(e) = self.store.reload() {
            warn!(error = %e, "note store reload after restore failed");
        }

        match self.on_restored.read() {
            Ok(hooks) => {
                for hook in hooks.iter() {
                    hook(&report);
                }
            }
            Err(e) => warn!(error = %e, "restore listeners unavailable"),
        }

        info!(name = %report.name, "restored notes are live");
        Ok(report)
    }
}
