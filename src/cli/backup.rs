//! Backup CLI commands
//!
//! Implements `backup`, `restore`, `list` and `prune`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::backup::{BackupDescriptor, BackupInfo, CancelToken, RestorePipeline};
use crate::config::settings::Destination;
use crate::error::{NoteguardError, NoteguardResult};
use crate::transport::Transport;

use super::context::AppContext;
use super::password::resolve_password;

const ENCRYPTED_EXTENSION: &str = "nbak";

/// Parse a destination name for clap
pub fn parse_destination(s: &str) -> Result<Destination, String> {
    Destination::parse(s).ok_or_else(|| format!("unknown destination '{}' (local, webdav)", s))
}

/// Arguments for `backup`
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Where to write the backup (local or webdav); defaults to the configured destination
    #[arg(long, value_parser = parse_destination)]
    pub to: Option<Destination>,

    /// Write an unencrypted archive even when encryption is configured
    #[arg(long)]
    pub no_encrypt: bool,

    /// Backup password
    #[arg(long, env = "NOTEGUARD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Arguments for `restore`
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup name, path to a backup file, or 'latest' for the most recent local backup
    pub backup: String,

    /// Where to read the backup from (local or webdav); defaults to the configured destination
    #[arg(long, value_parser = parse_destination)]
    pub from: Option<Destination>,

    /// Backup password
    #[arg(long, env = "NOTEGUARD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Skip confirmation and replace all current notes
    #[arg(short, long)]
    pub force: bool,
}

/// Handle `backup`
pub fn handle_backup_command(ctx: &AppContext, args: BackupArgs) -> NoteguardResult<()> {
    let destination = args.to.unwrap_or(ctx.settings.destination);
    let encrypt = ctx.settings.encrypt_backup && !args.no_encrypt;
    let password = resolve_password(args.password, encrypt, true)?;
    let transport = ctx.transport(destination)?;

    println!("Creating backup...");
    let report = ctx
        .service
        .run_backup_with(
            transport.as_ref(),
            password.as_deref(),
            encrypt,
            &CancelToken::new(),
        )
        .into_result()?;

    println!("Backup created: {}", report.name);
    println!("Location: {}", transport.describe());
    println!("{}", report.summary());

    if destination == Destination::Local {
        let deleted = ctx
            .local_transport()
            .enforce_retention(&ctx.settings.backup_retention)?;
        if !deleted.is_empty() {
            println!("Pruned {} old backup(s).", deleted.len());
        }
    }

    Ok(())
}

/// Handle `restore`
pub fn handle_restore_command(ctx: &AppContext, args: RestoreArgs) -> NoteguardResult<()> {
    let source = args.from.unwrap_or(ctx.settings.destination);
    let (transport, name) = resolve_backup(ctx, source, &args.backup)?;

    println!("Backup Information");
    println!("==================");
    println!("Name: {}", name);
    println!("Source: {}", transport.describe());
    if let Some(descriptor) = BackupDescriptor::parse_file_name(&name) {
        println!(
            "Created: {}",
            descriptor.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!(
            "Encrypted: {}",
            if descriptor.encrypted { "Yes" } else { "No" }
        );
    }
    println!();

    if !args.force {
        println!("WARNING: This will replace ALL current notes!");
        println!("To proceed, run again with --force flag:");
        println!("  noteguard restore {} --force", args.backup);
        return Ok(());
    }

    let password = resolve_password(args.password, looks_encrypted(&name), false)?;

    // Check the backup and its password before touching anything.
    let verified = RestorePipeline::new(ctx.store.as_ref())
        .verify(transport.as_ref(), &name, password.as_deref())?;
    println!(
        "Backup verified: {} records, taken {}",
        verified.snapshot.len(),
        verified
            .snapshot
            .captured_at()
            .format("%Y-%m-%d %H:%M:%S UTC")
    );

    save_current_notes(ctx, password.as_deref())?;

    println!("Restoring from backup...");
    let report = ctx
        .service
        .run_restore(transport.as_ref(), &name, password.as_deref())
        .into_result()?;

    println!("Restore complete!");
    println!("{}", report.summary());
    Ok(())
}

/// Back up the current notes locally before a restore replaces them
fn save_current_notes(ctx: &AppContext, password: Option<&str>) -> NoteguardResult<()> {
    let encrypt = ctx.settings.encrypt_backup;
    if encrypt && password.is_none() {
        println!("Skipping pre-restore backup: no password available to encrypt it.");
        return Ok(());
    }

    println!("Creating backup of current notes before restore...");
    let report = ctx
        .service
        .run_backup_with(
            &ctx.local_transport(),
            password,
            encrypt,
            &CancelToken::new(),
        )
        .into_result()?;
    println!("Pre-restore backup saved: {}", report.name);
    println!();
    Ok(())
}

/// Handle `list`
pub fn handle_list_command(ctx: &AppContext, verbose: bool) -> NoteguardResult<()> {
    let backups = ctx.local_transport().list()?;

    if backups.is_empty() {
        println!("No backups found.");
        println!("Create one with: noteguard backup");
        return Ok(());
    }

    let rows: Vec<BackupRow> = backups
        .iter()
        .enumerate()
        .map(|(i, b)| BackupRow::new(i + 1, b))
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if verbose {
        println!();
        for backup in &backups {
            println!("{}", backup.path.display());
        }
    }

    println!();
    println!("Total: {} backup(s)", backups.len());
    Ok(())
}

/// Handle `prune`
pub fn handle_prune_command(ctx: &AppContext, force: bool) -> NoteguardResult<()> {
    let transport = ctx.local_transport();
    let backups = transport.list()?;
    let retention = &ctx.settings.backup_retention;

    // Calculate how many would be deleted
    let (monthly, daily): (Vec<_>, Vec<_>) = backups.iter().partition(|b| b.is_monthly);

    let daily_to_delete = daily.len().saturating_sub(retention.daily_count as usize);
    let monthly_to_delete = monthly
        .len()
        .saturating_sub(retention.monthly_count as usize);
    let total_to_delete = daily_to_delete + monthly_to_delete;

    if total_to_delete == 0 {
        println!("No backups to prune.");
        println!(
            "Current retention policy: {} daily, {} monthly",
            retention.daily_count, retention.monthly_count
        );
        println!(
            "You have {} daily and {} monthly backups.",
            daily.len(),
            monthly.len()
        );
        return Ok(());
    }

    println!("Prune Summary");
    println!("=============");
    println!(
        "Retention policy: {} daily, {} monthly",
        retention.daily_count, retention.monthly_count
    );
    println!(
        "To be deleted: {} daily, {} monthly ({} total)",
        daily_to_delete, monthly_to_delete, total_to_delete
    );
    println!();

    if !force {
        println!("To delete old backups, run again with --force flag:");
        println!("  noteguard prune --force");
        return Ok(());
    }

    let deleted = transport.enforce_retention(retention)?;
    println!("Deleted {} backup(s).", deleted.len());
    Ok(())
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

impl BackupRow {
    fn new(index: usize, backup: &BackupInfo) -> Self {
        let created_at = backup.descriptor.created_at;
        let mut kind = if backup.descriptor.encrypted {
            "encrypted".to_string()
        } else {
            "plain".to_string()
        };
        if backup.is_monthly {
            kind.push_str(" [monthly]");
        }

        Self {
            index,
            name: backup.file_name(),
            created: created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            age: format_duration(chrono::Utc::now().signed_duration_since(created_at)),
            size: format_size(backup.size_bytes),
            kind,
        }
    }
}

fn looks_encrypted(name: &str) -> bool {
    match BackupDescriptor::parse_file_name(name) {
        Some(descriptor) => descriptor.encrypted,
        None => !name.ends_with(".tar.gz") && !name.ends_with(".tgz"),
    }
}

/// Resolve a backup identifier to a transport and a name within it
fn resolve_backup(
    ctx: &AppContext,
    source: Destination,
    backup: &str,
) -> NoteguardResult<(Arc<dyn Transport>, String)> {
    if source == Destination::WebDav {
        if backup.eq_ignore_ascii_case("latest") {
            return Err(NoteguardError::Config(
                "'latest' is only available for local backups; name the remote backup".into(),
            ));
        }
        return Ok((ctx.transport(source)?, backup.to_string()));
    }

    let local = ctx.local_transport();

    // Handle "latest" keyword
    if backup.eq_ignore_ascii_case("latest") {
        let latest = local
            .latest()?
            .ok_or_else(|| NoteguardError::backup_not_found("latest"))?;
        return Ok((Arc::new(local), latest.file_name()));
    }

    // A path outside the backup directory
    let path = PathBuf::from(backup);
    if path.components().count() > 1 && path.exists() {
        let (transport, name) = AppContext::file_transport(&path)?;
        return Ok((Arc::new(transport), name));
    }

    // A name in the backup directory, with or without its extension
    for candidate in [
        backup.to_string(),
        format!("{}.{}", backup, ENCRYPTED_EXTENSION),
        format!("{}.tar.gz", backup),
    ] {
        if local.path_for(&candidate).map_or(false, |p| p.exists()) {
            return Ok((Arc::new(local), candidate));
        }
    }

    Err(NoteguardError::backup_not_found(backup))
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
