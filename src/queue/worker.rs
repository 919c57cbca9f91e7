use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{AdmissionLimiter, ClaimedJob, JobDisposition, JobQueue};
use crate::config::QueueConfig;
use crate::error::Result;

/// Runs one claimed job end to end. An `Err` fails the attempt and hands the
/// job back to the queue's retry policy.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ClaimedJob) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub max_jobs_per_interval: usize,
    pub interval: Duration,
    pub poll_interval: Duration,
    pub stalled_after: Duration,
    pub maintenance_interval: Duration,
    pub remove_completed_after: Duration,
    pub remove_failed_after: Duration,
    /// How long shutdown waits for in-flight jobs
    pub drain_timeout: Duration,
}

impl From<&QueueConfig> for WorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            max_jobs_per_interval: config.max_jobs_per_interval.max(1),
            interval: Duration::from_millis(config.interval_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            stalled_after: Duration::from_millis(config.stalled_after_ms),
            maintenance_interval: Duration::from_secs(30),
            remove_completed_after: Duration::from_secs(config.remove_completed_after_secs),
            remove_failed_after: Duration::from_secs(config.remove_failed_after_secs),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Running jobs refresh their lock this often, well inside `stalled_after`
    pub fn lock_refresh_interval(&self) -> Duration {
        (self.stalled_after / 3).max(Duration::from_millis(1))
    }
}

/// Bounded-concurrency consumer of a [`JobQueue`]
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Dispatch until `shutdown` flips to true (or its sender is dropped),
    /// then drain in-flight jobs.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let limiter = Arc::new(AdmissionLimiter::new(
            self.config.max_jobs_per_interval,
            self.config.interval,
        ));
        let mut tasks = JoinSet::new();

        let maintenance = tokio::spawn(maintenance_loop(
            self.queue.clone(),
            self.config.clone(),
            shutdown.clone(),
        ));

        info!(
            concurrency = self.config.concurrency,
            max_jobs_per_interval = self.config.max_jobs_per_interval,
            interval_ms = self.config.interval.as_millis() as u64,
            "Order worker pool started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "Job task panicked");
                }
            }

            let permit = tokio::select! {
                _ = shutdown.changed() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claimed = match self.queue.claim().await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = sleep(self.config.poll_interval) => {}
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to claim job");
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = sleep(self.config.poll_interval) => {}
                    }
                    continue;
                }
            };

            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let limiter = limiter.clone();
            let lock_refresh = self.config.lock_refresh_interval();
            tasks.spawn(async move {
                let _permit = permit;
                run_job(queue, handler, &limiter, claimed, lock_refresh).await;
            });
        }

        info!(in_flight = tasks.len(), "Worker pool stopping, draining jobs");
        let drained = timeout(self.config.drain_timeout, async {
            while let Some(done) = tasks.join_next().await {
                if let Err(e) = done {
                    error!(error = %e, "Job task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                abandoned = tasks.len(),
                "Drain timeout reached, aborting remaining jobs"
            );
            tasks.abort_all();
        }

        maintenance.abort();
        info!("Order worker pool stopped");
    }
}

async fn run_job(
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    limiter: &AdmissionLimiter,
    claimed: ClaimedJob,
    lock_refresh: Duration,
) {
    let order_id = claimed.job.order_id.clone();
    debug!(
        order_id = %order_id,
        attempt = claimed.attempts_made,
        max_attempts = claimed.max_attempts,
        "Job started"
    );

    // Admission is charged per claimed job, not per poll
    let heartbeat = HeartbeatGuard(tokio::spawn(keep_lock(
        queue.clone(),
        order_id.clone(),
        lock_refresh,
    )));
    limiter.until_ready().await;
    let outcome = handler.handle(&claimed).await;
    drop(heartbeat);

    match outcome {
        Ok(()) => {
            if let Err(e) = queue.complete(&order_id).await {
                error!(order_id = %order_id, error = %e, "Failed to mark job completed");
            } else {
                info!(order_id = %order_id, "Job completed");
            }
        }
        Err(err) => match queue.fail(&order_id, &err.to_string()).await {
            Ok(JobDisposition::RetryScheduled { run_at }) => {
                warn!(
                    order_id = %order_id,
                    attempt = claimed.attempts_made,
                    run_at = %run_at,
                    error = %err,
                    "Job failed, redelivery scheduled"
                );
            }
            Ok(JobDisposition::Dead) => {
                error!(
                    order_id = %order_id,
                    attempts = claimed.attempts_made,
                    error = %err,
                    "Job failed permanently"
                );
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Failed to record job failure");
            }
        },
    }
}

/// Stops the lock heartbeat when the job ends, including when a drain
/// timeout aborts the job task.
struct HeartbeatGuard(JoinHandle<()>);

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Refresh the job's lock until aborted
async fn keep_lock(queue: Arc<dyn JobQueue>, order_id: String, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately and the claim just set the lock
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = queue.extend_lock(&order_id).await {
            warn!(order_id = %order_id, error = %e, "Failed to extend job lock");
        }
    }
}

async fn maintenance_loop(
    queue: Arc<dyn JobQueue>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(config.maintenance_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {}
        }

        match queue.requeue_stalled(config.stalled_after).await {
            Ok(0) => {}
            Ok(n) => warn!(requeued = n, "Requeued stalled jobs"),
            Err(e) => warn!(error = %e, "Stalled job sweep failed"),
        }

        match queue
            .prune(config.remove_completed_after, config.remove_failed_after)
            .await
        {
            Ok(0) => {}
            Ok(n) => debug!(removed = n, "Pruned finished jobs"),
            Err(e) => warn!(error = %e, "Job pruning failed"),
        }
    }
}
