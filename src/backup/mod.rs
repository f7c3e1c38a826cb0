//! Backup and restore for noteguard
//!
//! # Architecture
//!
//! - `BackupPipeline`: snapshot, archive, encrypt, write
//! - `RestorePipeline`: fetch, decrypt, unarchive, validate, swap
//! - `BackupService`: runs either pipeline under the operation lock
//!
//! # Backup Format
//!
//! A backup is a gzip-compressed tar archive holding one `notes.json` entry.
//! Encrypted backups wrap that archive in an authenticated envelope (see
//! [`crate::crypto::envelope`]) and use the `.nbak` extension; plain ones are
//! written as `.tar.gz`.
//!
//! # Example
//!
//! ```rust,ignore
//! use noteguard::backup::{BackupService, RestoreResult};
//!
//! let service = BackupService::new(store, paths.staging_dir(), &settings);
//! let report = service.run_backup(&transport, Some("hunter2")).into_result()?;
//!
//! match service.run_restore(&transport, &report.name, Some("hunter2")) {
//!     RestoreResult::Success(r) => println!("{}", r.summary()),
//!     RestoreResult::BadPassword => eprintln!("wrong password or corrupted file"),
//!     RestoreResult::Error(e) => eprintln!("{}", e),
//! }
//! ```

mod cancel;
mod descriptor;
mod lock;
mod pipeline;
mod restore;
mod service;

pub use cancel::CancelToken;
pub use descriptor::{BackupDescriptor, BackupInfo};
pub use lock::{OperationGuard, OperationLock};
pub use pipeline::{BackupPipeline, BackupReport, BackupStage};
pub use restore::{RestorePipeline, RestoreReport, RestoreStage, VerifiedBackup};
pub use service::{BackupResult, BackupService, RestoreResult};
