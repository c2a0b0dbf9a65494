mod decay_sweep;
mod session_cleanup;

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::{env_bool, env_string};
use crate::db::DatabaseProxy;

pub use decay_sweep::sweep_all_profiles;
pub use session_cleanup::cleanup_expired_sessions;

const DEFAULT_DECAY_SWEEP_SCHEDULE: &str = "0 */15 * * * *";
const SESSION_CLEANUP_SCHEDULE: &str = "0 0 * * * *";

static WORKER_LEADER: AtomicBool = AtomicBool::new(false);

pub fn is_worker_leader() -> bool {
    WORKER_LEADER.load(Ordering::Relaxed)
}

fn set_worker_leader(val: bool) {
    WORKER_LEADER.store(val, Ordering::Relaxed);
}

/// Background jobs. Only the instance started with `WORKER_LEADER=true`
/// schedules anything, so horizontally scaled deployments run each job once.
pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    db: DatabaseProxy,
}

impl WorkerManager {
    pub async fn new(db: DatabaseProxy) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            db,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        if !env_bool("WORKER_LEADER").unwrap_or(false) {
            info!("WORKER_LEADER not set, skipping worker startup");
            return Ok(());
        }

        set_worker_leader(true);
        info!("Starting workers (leader mode)");

        let scheduler = self.scheduler.lock().await;

        {
            let schedule = env_string("DECAY_SWEEP_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_DECAY_SWEEP_SCHEDULE.to_string());
            let db = self.db.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
                let db = db.clone();
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = sweep_all_profiles(&db) => {
                            if let Err(e) = result {
                                error!(error = %e, "Decay sweep error");
                            }
                        }
                    }
                })
            })?;
            scheduler.add(job).await?;
            info!(schedule = %schedule, "Decay sweep scheduled");
        }

        {
            let db = self.db.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(SESSION_CLEANUP_SCHEDULE, move |_uuid, _lock| {
                let db = db.clone();
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = cleanup_expired_sessions(&db) => {
                            if let Err(e) = result {
                                error!(error = %e, "Session cleanup error");
                            }
                        }
                    }
                })
            })?;
            scheduler.add(job).await?;
            info!("Session cleanup scheduled (hourly)");
        }

        scheduler.start().await?;
        info!("All workers started");
        Ok(())
    }

    pub async fn stop(&self) {
        if !is_worker_leader() {
            return;
        }

        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }

        set_worker_leader(false);
        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
