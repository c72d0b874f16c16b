use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::RetentionConfig;
use crate::db::Store;

/// Periodically deletes login history and expired tokens past their retention window.
pub struct RetentionScheduler {
    store: Store,
    config: RetentionConfig,
}

impl RetentionScheduler {
    #[must_use]
    pub const fn new(store: Store, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Registers the cleanup job and returns the running scheduler, or `None` when disabled.
    pub async fn start(&self) -> Result<Option<JobScheduler>> {
        if !self.config.enabled {
            info!("Login history retention is disabled in config");
            return Ok(None);
        }

        let sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let hours = self.config.login_history_hours;
        let job = Job::new_async(self.config.cleanup_cron.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            Box::pin(async move {
                if let Err(e) = run_cleanup(&store, hours).await {
                    error!(event = "job_failed", job_name = "prune_logins", error = %e, "Scheduled retention cleanup failed");
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!(
            "Retention cleanup scheduled: {} (keep {}h of login history)",
            self.config.cleanup_cron, hours
        );

        Ok(Some(sched))
    }

    pub async fn run_once(&self) -> Result<u64> {
        run_cleanup(&self.store, self.config.login_history_hours).await
    }
}

async fn run_cleanup(store: &Store, hours: i64) -> Result<u64> {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "prune_logins", "Starting retention cleanup");

    let pruned = store.prune_logins_older_than(hours).await?;
    let tokens = store.purge_expired_tokens().await?;

    info!(
        event = "job_finished",
        job_name = "prune_logins",
        pruned_logins = pruned,
        purged_tokens = tokens,
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Retention cleanup finished"
    );

    Ok(pruned)
}
