use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use noteguard::cli::{
    handle_backup_command, handle_credentials_command, handle_list_command,
    handle_notes_command, handle_prune_command, handle_restore_command, handle_schedule_command,
    AppContext, BackupArgs, CredentialCommands, RestoreArgs, ScheduleCommands,
};
use noteguard::config::paths::NoteguardPaths;

#[derive(Parser)]
#[command(
    name = "noteguard",
    version,
    about = "Encrypted backup and restore for your notes",
    long_about = "noteguard snapshots your notes into a compressed archive, optionally \
                  seals it with a password, and stores it in a local directory or on a \
                  WebDAV server. Restores replace all notes at once or not at all."
)]
struct Cli {
    /// Increase log output (-v info, -vv debug); NOTEGUARD_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backup
    Backup(BackupArgs),

    /// Replace all notes with the contents of a backup
    Restore(RestoreArgs),

    /// List local backups
    #[command(alias = "ls")]
    List {
        /// Show file paths
        #[arg(short, long)]
        verbose: bool,
    },

    /// Delete old local backups according to the retention policy
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show stored notes
    Notes,

    /// Manage WebDAV credentials and the saved backup password
    #[command(subcommand, alias = "creds")]
    Credentials(CredentialCommands),

    /// Periodic backups
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Show current configuration and paths
    Config,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("NOTEGUARD_LOG")
                .unwrap_or_else(|_| EnvFilter::new(format!("noteguard={}", default_level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Initialize paths, settings and the note store
    let paths = NoteguardPaths::new()?;
    let mut ctx = AppContext::open(paths)?;

    match cli.command {
        Some(Commands::Backup(args)) => handle_backup_command(&ctx, args)?,
        Some(Commands::Restore(args)) => handle_restore_command(&ctx, args)?,
        Some(Commands::List { verbose }) => handle_list_command(&ctx, verbose)?,
        Some(Commands::Prune { force }) => handle_prune_command(&ctx, force)?,
        Some(Commands::Notes) => handle_notes_command(&ctx)?,
        Some(Commands::Credentials(cmd)) => handle_credentials_command(&ctx, cmd)?,
        Some(Commands::Schedule(cmd)) => handle_schedule_command(&mut ctx, cmd)?,
        Some(Commands::Config) => {
            let settings = &ctx.settings;
            println!("noteguard Configuration");
            println!("=======================");
            println!("Base directory:   {}", ctx.paths.base_dir().display());
            println!("Notes file:       {}", ctx.paths.notes_file().display());
            println!("Backup directory: {}", ctx.paths.backup_dir().display());
            println!();
            println!("Settings:");
            println!("  Destination:       {:?}", settings.destination);
            println!("  Encrypt backups:   {}", settings.encrypt_backup);
            println!(
                "  Key derivation:    Argon2id m={} KiB, t={}, p={}",
                settings.kdf.memory_cost, settings.kdf.time_cost, settings.kdf.parallelism
            );
            println!(
                "  Retention:         {} daily, {} monthly",
                settings.backup_retention.daily_count, settings.backup_retention.monthly_count
            );
            println!(
                "  Schedule:          {} (every {}h)",
                if settings.schedule.enabled {
                    "enabled"
                } else {
                    "disabled"
                },
                settings.schedule.interval_hours
            );
            println!("  HTTP timeout:      {}s", settings.http_timeout_secs);
        }
        None => {
            println!("noteguard - encrypted backups for your notes");
            println!();
            println!("Run 'noteguard --help' for usage information.");
            println!("Run 'noteguard backup' to create your first backup.");
        }
    }

    Ok(())
}
