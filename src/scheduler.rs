//! Periodic backups
//!
//! Jobs are keyed by name. Scheduling a name that already exists replaces the
//! old job, and cancelling is idempotent. Each job runs on its own thread and
//! sleeps on a channel so it can be stopped without waiting a full interval.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backup::{BackupResult, BackupService};
use crate::config::settings::BackupRetention;
use crate::error::{NoteguardError, NoteguardResult};
use crate::secrets::{SecretStore, BACKUP_PASSWORD_KEY};
use crate::transport::{LocalTransport, Transport};

/// Name of the once-a-day automatic backup
pub const DAILY_BACKUP_SCHEDULE: &str = "noteguard-daily-backup";

struct Job {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Named periodic jobs
#[derive(Default)]
pub struct BackupScheduler {
    jobs: Mutex<HashMap<String, Job>>,
}

impl BackupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` every `interval`, starting one interval from now
    ///
    /// Replaces any job already scheduled under `name`.
    pub fn schedule<F>(&self, name: &str, interval: Duration, job: F) -> NoteguardResult<()>
    where
        F: Fn() + Send + 'static,
    {
        self.cancel(name);

        let (stop, ticks) = mpsc::channel::<()>();
        let job_name = name.to_string();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match ticks.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        debug!(job = %job_name, "scheduled tick");
                        job();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| NoteguardError::Io(format!("Failed to start scheduler thread: {}", e)))?;

        let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        jobs.insert(name.to_string(), Job { stop, thread });
        info!(job = name, interval_secs = interval.as_secs(), "scheduled");
        Ok(())
    }

    /// Stop the job named `name`; returns whether one was running
    ///
    /// A tick already in progress is allowed to finish first.
    pub fn cancel(&self, name: &str) -> bool {
        let job = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
            jobs.remove(name)
        };

        match job {
            Some(job) => {
                stop_job(name, job);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        jobs.contains_key(name)
    }

    /// Names of all scheduled jobs, sorted
    pub fn names(&self) -> Vec<String> {
        let jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<_> = jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Block until the job named `name` stops
    pub fn wait(&self, name: &str) {
        let job = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
            jobs.remove(name)
        };

        if let Some(job) = job {
            // Keep the sender alive so the loop only ends on an explicit stop.
            let _stop = job.stop;
            let _ = job.thread.join();
        }
    }

    /// Stop every job
    pub fn shutdown(&self) {
        let jobs: Vec<_> = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|p| p.into_inner());
            jobs.drain().collect()
        };
        for (name, job) in jobs {
            stop_job(&name, job);
        }
    }
}

fn stop_job(name: &str, job: Job) {
    let _ = job.stop.send(());
    // A job cancelling itself must not join its own thread.
    if job.thread.thread().id() != thread::current().id() {
        let _ = job.thread.join();
    }
    debug!(job = name, "stopped");
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Retention applied to the local backup directory after automatic backups
#[derive(Debug, Clone)]
pub struct LocalPruning {
    pub backups: LocalTransport,
    pub retention: BackupRetention,
}

impl LocalPruning {
    pub fn new(backups: LocalTransport, retention: BackupRetention) -> Self {
        Self { backups, retention }
    }

    fn apply(&self) {
        match self.backups.enforce_retention(&self.retention) {
            Ok(deleted) if !deleted.is_empty() => {
                info!(deleted = deleted.len(), "pruned old backups")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not prune old backups"),
        }
    }
}

/// One automatic backup using the remembered password
///
/// Failures are logged and left for the next tick. After a successful run
/// `pruning`, when given, trims the local backup directory.
pub fn run_scheduled_backup(
    service: &BackupService,
    transport: &dyn Transport,
    secrets: &dyn SecretStore,
    pruning: Option<&LocalPruning>,
) -> BackupResult {
    let password = match secrets.get(BACKUP_PASSWORD_KEY) {
        Ok(password) => password,
        Err(e) => {
            warn!(error = %e, "could not read the saved backup password");
            None
        }
    };

    let result = service.run_backup(transport, password.as_deref());
    match &result {
        BackupResult::Success(report) => {
            info!(name = %report.name, "automatic backup complete");
            if let Some(pruning) = pruning {
                pruning.apply();
            }
        }
        BackupResult::BadPassword => warn!("automatic backup failed: bad password"),
        BackupResult::Error(e) => warn!(
            error = %e,
            retry_next_tick = true,
            retryable = e.is_retryable(),
            "automatic backup failed"
        ),
    }
    result
}

/// Schedule the daily backup against `transport`
pub fn schedule_daily_backup(
    scheduler: &BackupScheduler,
    interval: Duration,
    service: Arc<BackupService>,
    transport: Arc<dyn Transport>,
    secrets: Arc<dyn SecretStore>,
    pruning: Option<LocalPruning>,
) -> NoteguardResult<()> {
    scheduler.schedule(DAILY_BACKUP_SCHEDULE, interval, move || {
        run_scheduled_backup(
            &service,
            transport.as_ref(),
            secrets.as_ref(),
            pruning.as_ref(),
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::backup::BackupDescriptor;
    use crate::config::Settings;
    use crate::crypto::KeyDerivationParams;
    use crate::models::{Record, Snapshot};
    use crate::secrets::MemorySecretStore;
    use crate::storage::{JsonNoteStore, NoteStore};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        (count, move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_job_ticks_until_cancelled() {
        let scheduler = BackupScheduler::new();
        let (count, job) = counter();

        scheduler
            .schedule("tick", Duration::from_millis(10), job)
            .unwrap();
        thread::sleep(Duration::from_millis(100));

        assert!(scheduler.cancel("tick"));
        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel >= 1);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let scheduler = BackupScheduler::new();
        assert!(!scheduler.cancel(DAILY_BACKUP_SCHEDULE));

        scheduler
            .schedule(DAILY_BACKUP_SCHEDULE, Duration::from_secs(3600), || {})
            .unwrap();
        assert!(scheduler.cancel(DAILY_BACKUP_SCHEDULE));
        assert!(!scheduler.cancel(DAILY_BACKUP_SCHEDULE));
    }

    #[test]
    fn test_rescheduling_replaces_job() {
        let scheduler = BackupScheduler::new();
        let (first, first_job) = counter();
        let (second, second_job) = counter();

        scheduler
            .schedule("daily", Duration::from_secs(3600), first_job)
            .unwrap();
        scheduler
            .schedule("daily", Duration::from_millis(10), second_job)
            .unwrap();
        thread::sleep(Duration::from_millis(80));

        assert_eq!(scheduler.names(), vec!["daily".to_string()]);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert!(second.load(Ordering::SeqCst) >= 1);
    }

    fn service(temp: &TempDir) -> BackupService {
        let store = Arc::new(JsonNoteStore::open(temp.path().join("notes.json")).unwrap());
        store
            .replace_all(Snapshot::new(vec![Record::new(1, "A", "body")]))
            .unwrap();
        let mut settings = Settings::default();
        settings.kdf = KeyDerivationParams::for_testing();
        BackupService::new(store, temp.path().join("staging"), &settings)
    }

    fn seed_old_backups(backups: &LocalTransport) {
        for day in 2..5 {
            let created_at = Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap();
            let name = BackupDescriptor::at(created_at, true).file_name();
            backups.put(&name, b"old").unwrap();
        }
    }

    fn pruning(backups: &LocalTransport) -> LocalPruning {
        LocalPruning::new(
            backups.clone(),
            BackupRetention {
                daily_count: 2,
                monthly_count: 1,
            },
        )
    }

    #[test]
    fn test_successful_run_prunes_local_backups() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let backups = LocalTransport::new(temp.path().join("backups"));
        seed_old_backups(&backups);
        let secrets = MemorySecretStore::new();
        secrets.put(BACKUP_PASSWORD_KEY, "pw").unwrap();

        let report = match run_scheduled_backup(
            &service,
            &backups,
            &secrets,
            Some(&pruning(&backups)),
        ) {
            BackupResult::Success(report) => report,
            other => panic!("backup failed: {:?}", other),
        };

        let remaining = backups.list().unwrap();
        assert_eq!(remaining.iter().filter(|b| !b.is_monthly).count(), 2);
        assert_eq!(remaining[0].file_name(), report.name);
    }

    #[test]
    fn test_failed_run_prunes_nothing() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let backups = LocalTransport::new(temp.path().join("backups"));
        seed_old_backups(&backups);

        // No saved password, so the encrypted backup cannot run
        let result = run_scheduled_backup(
            &service,
            &backups,
            &MemorySecretStore::new(),
            Some(&pruning(&backups)),
        );

        assert!(!result.is_success());
        assert_eq!(backups.list().unwrap().len(), 3);
    }

    #[test]
    fn test_drop_stops_jobs() {
        let (count, job) = counter();
        {
            let scheduler = BackupScheduler::new();
            scheduler
                .schedule("tick", Duration::from_millis(10), job)
                .unwrap();
            thread::sleep(Duration::from_millis(40));
        }
        let after_drop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }
}
