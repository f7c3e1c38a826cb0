//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup service.

pub mod backup;
pub mod context;
pub mod credentials;
pub mod notes;
pub mod password;
pub mod schedule;

pub use backup::{
    handle_backup_command, handle_list_command, handle_prune_command, handle_restore_command,
    BackupArgs, RestoreArgs,
};
pub use context::AppContext;
pub use credentials::{handle_credentials_command, CredentialCommands};
pub use notes::handle_notes_command;
pub use schedule::{handle_schedule_command, ScheduleCommands};
