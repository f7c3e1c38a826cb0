//! Schedule CLI commands

use clap::Subcommand;

use crate::backup::BackupResult;
use crate::config::settings::Destination;
use crate::error::{NoteguardError, NoteguardResult};
use crate::scheduler::{
    run_scheduled_backup, schedule_daily_backup, BackupScheduler, LocalPruning,
    DAILY_BACKUP_SCHEDULE,
};

use super::context::AppContext;

/// Schedule subcommands
#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Run periodic backups in the foreground until interrupted
    Run,

    /// Run one scheduled backup now, exactly as the scheduler would
    Once,

    /// Turn periodic backups on
    Enable {
        /// Hours between backups
        #[arg(long)]
        interval_hours: Option<u64>,
    },

    /// Turn periodic backups off
    Disable,

    /// Show the schedule settings
    Status,
}

/// Retention to apply after automatic backups, for local destinations only
fn local_pruning(ctx: &AppContext) -> Option<LocalPruning> {
    (ctx.settings.destination == Destination::Local).then(|| {
        LocalPruning::new(
            ctx.local_transport(),
            ctx.settings.backup_retention.clone(),
        )
    })
}

/// Handle a schedule command
pub fn handle_schedule_command(ctx: &mut AppContext, cmd: ScheduleCommands) -> NoteguardResult<()> {
    match cmd {
        ScheduleCommands::Run => {
            if !ctx.settings.schedule.enabled {
                println!("Periodic backups are disabled.");
                println!("Enable them with: noteguard schedule enable");
                return Ok(());
            }

            let interval = ctx.settings.schedule.interval();
            let scheduler = BackupScheduler::new();
            schedule_daily_backup(
                &scheduler,
                interval,
                ctx.service.clone(),
                ctx.transport(ctx.settings.destination)?,
                ctx.secrets()?,
                local_pruning(ctx),
            )?;

            println!(
                "Backing up to {:?} every {} hour(s). Press Ctrl-C to stop.",
                ctx.settings.destination,
                interval.as_secs() / 3600
            );
            scheduler.wait(DAILY_BACKUP_SCHEDULE);
        }

        ScheduleCommands::Once => {
            let transport = ctx.transport(ctx.settings.destination)?;
            let secrets = ctx.secrets()?;
            let pruning = local_pruning(ctx);
            match run_scheduled_backup(
                &ctx.service,
                transport.as_ref(),
                secrets.as_ref(),
                pruning.as_ref(),
            ) {
                BackupResult::Success(report) => println!("{}", report.summary()),
                BackupResult::BadPassword => {
                    return Err(NoteguardError::Cipher("saved backup password rejected".into()))
                }
                BackupResult::Error(e) => return Err(e),
            }
        }

        ScheduleCommands::Enable { interval_hours } => {
            ctx.settings.schedule.enabled = true;
            if let Some(hours) = interval_hours {
                if hours == 0 {
                    return Err(NoteguardError::Config(
                        "interval must be at least one hour".into(),
                    ));
                }
                ctx.settings.schedule.interval_hours = hours;
            }
            ctx.settings.save(&ctx.paths)?;
            println!(
                "Periodic backups enabled (every {} hour(s)).",
                ctx.settings.schedule.interval_hours
            );
        }

        ScheduleCommands::Disable => {
            ctx.settings.schedule.enabled = false;
            ctx.settings.save(&ctx.paths)?;
            println!("Periodic backups disabled.");
        }

        ScheduleCommands::Status => {
            let schedule = &ctx.settings.schedule;
            println!("Schedule");
            println!("========");
            println!("Name:        {}", DAILY_BACKUP_SCHEDULE);
            println!("Enabled:     {}", if schedule.enabled { "Yes" } else { "No" });
            println!("Interval:    {} hour(s)", schedule.interval_hours);
            println!("Destination: {:?}", ctx.settings.destination);
        }
    }

    Ok(())
}
