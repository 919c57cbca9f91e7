//! Durable order job queue and the bounded worker pool that drains it.
//!
//! Two retry tiers exist. Inside a job, venue calls retry with backoff (see
//! `retry`). Around a job, a failed attempt is redelivered from the top after
//! `backoff * 2^(attempts_made - 1)` until `attempts` is reached.

pub mod job;
pub mod limiter;
pub mod worker;

pub use job::{
    ClaimedJob, EnqueueOutcome, JobDisposition, JobOptions, JobState, OrderJob, QueueCounts,
};
pub use limiter::AdmissionLimiter;
pub use worker::{JobHandler, WorkerConfig, WorkerPool};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Recorded on jobs the stalled sweep fails at their attempt ceiling
pub const STALLED_ERROR: &str = "Job stalled: lock expired with no attempts left";

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job keyed by its order id. A second job for the same id is
    /// rejected as [`EnqueueOutcome::Duplicate`].
    async fn enqueue(&self, job: &OrderJob, options: &JobOptions) -> Result<EnqueueOutcome>;

    /// Take the earliest due waiting job, marking it active
    async fn claim(&self) -> Result<Option<ClaimedJob>>;

    async fn complete(&self, order_id: &str) -> Result<()>;

    /// Record a failed attempt and schedule a redelivery or bury the job
    async fn fail(&self, order_id: &str, error: &str) -> Result<JobDisposition>;

    /// Refresh the lock of an active job so the stalled sweep leaves it alone
    async fn extend_lock(&self, order_id: &str) -> Result<()>;

    /// Sweep active jobs locked longer than `older_than`. Jobs with attempts
    /// left go back to waiting; jobs at their attempt ceiling are failed.
    /// Returns how many jobs were swept.
    async fn requeue_stalled(&self, older_than: Duration) -> Result<u64>;

    /// Delete finished jobs past their retention. Returns how many went.
    async fn prune(&self, completed_older_than: Duration, failed_older_than: Duration)
        -> Result<u64>;

    async fn counts(&self) -> Result<QueueCounts>;

    async fn ping(&self) -> Result<()>;
}
