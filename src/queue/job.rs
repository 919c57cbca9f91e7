use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::QueueConfig;
use crate::domain::CreateOrderRequest;

/// Durable envelope for one order; `order_id` is the deduplication key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderJob {
    pub order_id: String,
    #[serde(flatten)]
    pub request: CreateOrderRequest,
    pub submitted_at: DateTime<Utc>,
}

impl OrderJob {
    pub fn new(order_id: impl Into<String>, request: CreateOrderRequest) -> Self {
        Self {
            order_id: order_id.into(),
            request,
            submitted_at: Utc::now(),
        }
    }
}

/// Whole-job retry settings stored with each job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

impl From<&QueueConfig> for JobOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

impl JobOptions {
    /// Delay before redelivery after the given failed attempt:
    /// `backoff * 2^(attempts_made - 1)`
    pub fn retry_delay(&self, attempts_made: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts_made.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }

    /// Decide what happens to a job whose attempt number `attempts_made` failed
    pub fn disposition_after_failure(&self, attempts_made: u32, now: DateTime<Utc>) -> JobDisposition {
        if attempts_made >= self.attempts {
            return JobDisposition::Dead;
        }
        let delay = chrono::Duration::from_std(self.retry_delay(attempts_made))
            .unwrap_or_else(|_| chrono::Duration::zero());
        JobDisposition::RetryScheduled { run_at: now + delay }
    }
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for JobState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

/// A job handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub job: OrderJob,
    /// Attempt number of this delivery, starting at 1
    pub attempts_made: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// A job with this order id already exists; nothing was added
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    RetryScheduled { run_at: DateTime<Utc> },
    /// Attempt ceiling reached; the job stays `failed`
    Dead,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn add(&mut self, state: JobState, n: u64) {
        match state {
            JobState::Waiting => self.waiting += n,
            JobState::Active => self.active += n,
            JobState::Completed => self.completed += n,
            JobState::Failed => self.failed += n,
        }
    }
}
