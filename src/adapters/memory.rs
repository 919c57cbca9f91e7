//! In-process implementations of the storage and queue contracts.
//!
//! Used by `--in-memory` runs and by tests. Each store can be told to fail so
//! the pipeline's escalation rules can be exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::{Order, OrderPatch, OrderStatus, StateTransition};
use crate::error::{Result, SwapError};
use crate::persistence::{OrderCache, OrderRepository, RateLimitStore, WindowHit};
use crate::queue::{
    ClaimedJob, EnqueueOutcome, JobDisposition, JobOptions, JobQueue, JobState, OrderJob,
    QueueCounts, STALLED_ERROR,
};

fn injected_db_error() -> SwapError {
    SwapError::Database(sqlx::Error::PoolTimedOut)
}

fn injected_cache_error() -> SwapError {
    SwapError::Cache(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "injected cache failure",
    )))
}

// ==================== Orders ====================

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: DashMap<String, Order>,
    events: DashMap<String, Vec<StateTransition>>,
    fail_writes: AtomicBool,
    fail_retry_increments: AtomicBool,
    fail_events: AtomicBool,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make order creation and status updates fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_retry_increments(&self, fail: bool) {
        self.fail_retry_increments.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self, order_id: &str) -> Vec<StateTransition> {
        self.events
            .get(order_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_db_error());
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderStore {
    async fn create_or_restart(&self, order: &Order) -> Result<Order> {
        self.check_writes()?;

        match self.orders.entry(order.id.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().status != OrderStatus::Confirmed {
                    existing.get_mut().restart(&order.request());
                }
                Ok(existing.get().clone())
            }
            Entry::Vacant(slot) => Ok(slot.insert(order.clone()).value().clone()),
        }
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.get(order_id).map(|o| o.value().clone()))
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        patch: &OrderPatch,
    ) -> Result<Order> {
        self.check_writes()?;

        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| SwapError::OrderNotFound(order_id.to_string()))?;
        order.apply(status, patch);
        Ok(order.clone())
    }

    async fn increment_retry_count(&self, order_id: &str) -> Result<i32> {
        if self.fail_retry_increments.load(Ordering::SeqCst) {
            return Err(injected_db_error());
        }

        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| SwapError::OrderNotFound(order_id.to_string()))?;
        order.retry_count += 1;
        order.updated_at = Utc::now();
        Ok(order.retry_count)
    }

    async fn append_event(&self, order_id: &str, transition: &StateTransition) -> Result<()> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(injected_db_error());
        }

        self.events
            .entry(order_id.to_string())
            .or_default()
            .push(transition.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_writes()
    }
}

// ==================== Cache ====================

#[derive(Default)]
pub struct MemoryCache {
    active: DashMap<String, (Order, Instant)>,
    windows: DashMap<String, (u64, Instant)>,
    fail: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected_cache_error());
        }
        Ok(())
    }

    fn ttl() -> Duration {
        Duration::from_secs(crate::persistence::ACTIVE_ORDER_TTL_SECS)
    }
}

#[async_trait]
impl OrderCache for MemoryCache {
    async fn set_active(&self, order: &Order) -> Result<()> {
        self.check()?;
        self.active
            .insert(order.id.clone(), (order.clone(), Instant::now() + Self::ttl()));
        Ok(())
    }

    async fn get_active(&self, order_id: &str) -> Result<Option<Order>> {
        self.check()?;
        let now = Instant::now();
        Ok(self
            .active
            .get(order_id)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone()))
    }

    async fn remove_active(&self, order_id: &str) -> Result<()> {
        self.check()?;
        self.active.remove(order_id);
        Ok(())
    }

    async fn active_order_ids(&self) -> Result<Vec<String>> {
        self.check()?;
        let now = Instant::now();
        self.active.retain(|_, (_, expires)| *expires > now);
        let mut ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

#[async_trait]
impl RateLimitStore for MemoryCache {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<WindowHit> {
        self.check()?;
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;

        Ok(WindowHit {
            count: entry.0,
            reset_in_secs: entry.1.saturating_duration_since(now).as_secs(),
        })
    }
}

// ==================== Jobs ====================

#[derive(Debug, Clone)]
struct JobEntry {
    job: OrderJob,
    options: JobOptions,
    state: JobState,
    attempts_made: u32,
    run_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<HashMap<String, JobEntry>>,
    fail: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SwapError::Queue("injected queue failure".to_string()));
        }
        Ok(())
    }

    /// Counts without going through the async trait
    pub fn snapshot_counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for entry in self.jobs().values() {
            counts.add(entry.state, 1);
        }
        counts
    }

    pub fn state_of(&self, order_id: &str) -> Option<JobState> {
        self.jobs().get(order_id).map(|e| e.state)
    }

    pub fn last_error(&self, order_id: &str) -> Option<String> {
        self.jobs().get(order_id).and_then(|e| e.last_error.clone())
    }
}

fn older_than(stamp: Option<DateTime<Utc>>, now: DateTime<Utc>, age: Duration) -> bool {
    let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
    stamp.map(|t| now - t >= age).unwrap_or(false)
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &OrderJob, options: &JobOptions) -> Result<EnqueueOutcome> {
        self.check()?;
        let mut jobs = self.jobs();
        if jobs.contains_key(&job.order_id) {
            return Ok(EnqueueOutcome::Duplicate);
        }
        jobs.insert(
            job.order_id.clone(),
            JobEntry {
                job: job.clone(),
                options: *options,
                state: JobState::Waiting,
                attempts_made: 0,
                run_at: Utc::now(),
                locked_at: None,
                finished_at: None,
                last_error: None,
            },
        );
        Ok(EnqueueOutcome::Queued)
    }

    async fn claim(&self) -> Result<Option<ClaimedJob>> {
        self.check()?;
        let now = Utc::now();
        let mut jobs = self.jobs();

        let next = jobs
            .values_mut()
            .filter(|e| e.state == JobState::Waiting && e.run_at <= now)
            .min_by_key(|e| (e.run_at, e.job.submitted_at));

        Ok(next.map(|entry| {
            entry.state = JobState::Active;
            entry.attempts_made += 1;
            entry.locked_at = Some(now);
            ClaimedJob {
                job: entry.job.clone(),
                attempts_made: entry.attempts_made,
                max_attempts: entry.options.attempts,
            }
        }))
    }

    async fn complete(&self, order_id: &str) -> Result<()> {
        self.check()?;
        let mut jobs = self.jobs();
        let entry = jobs
            .get_mut(order_id)
            .ok_or_else(|| SwapError::Queue(format!("Unknown job: {}", order_id)))?;
        entry.state = JobState::Completed;
        entry.locked_at = None;
        entry.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, order_id: &str, error: &str) -> Result<JobDisposition> {
        self.check()?;
        let now = Utc::now();
        let mut jobs = self.jobs();
        let entry = jobs
            .get_mut(order_id)
            .ok_or_else(|| SwapError::Queue(format!("Unknown job: {}", order_id)))?;

        let disposition = entry
            .options
            .disposition_after_failure(entry.attempts_made, now);
        entry.last_error = Some(error.to_string());
        entry.locked_at = None;
        match disposition {
            JobDisposition::RetryScheduled { run_at } => {
                entry.state = JobState::Waiting;
                entry.run_at = run_at;
            }
            JobDisposition::Dead => {
                entry.state = JobState::Failed;
                entry.finished_at = Some(now);
            }
        }
        Ok(disposition)
    }

    async fn extend_lock(&self, order_id: &str) -> Result<()> {
        self.check()?;
        if let Some(entry) = self.jobs().get_mut(order_id) {
            if entry.state == JobState::Active {
                entry.locked_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn requeue_stalled(&self, older: Duration) -> Result<u64> {
        self.check()?;
        let now = Utc::now();
        let mut swept = 0;
        for entry in self.jobs().values_mut() {
            if entry.state != JobState::Active || !older_than(entry.locked_at, now, older) {
                continue;
            }
            entry.locked_at = None;
            if entry.attempts_made >= entry.options.attempts {
                entry.state = JobState::Failed;
                entry.finished_at = Some(now);
                entry.last_error = Some(STALLED_ERROR.to_string());
            } else {
                entry.state = JobState::Waiting;
                entry.run_at = now;
            }
            swept += 1;
        }
        Ok(swept)
    }

    async fn prune(&self, completed_older_than: Duration, failed_older_than: Duration) -> Result<u64> {
        self.check()?;
        let now = Utc::now();
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, e| match e.state {
            JobState::Completed => !older_than(e.finished_at, now, completed_older_than),
            JobState::Failed => !older_than(e.finished_at, now, failed_older_than),
            _ => true,
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn counts(&self) -> Result<QueueCounts> {
        self.check()?;
        Ok(self.snapshot_counts())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreateOrderRequest, DexName, OrderType};

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            order_type: OrderType::Market,
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 100.0,
        }
    }

    #[tokio::test]
    async fn restart_resets_unconfirmed_order() {
        let store = MemoryOrderStore::new();
        let order = Order::pending("o-1", &request());
        store.create_or_restart(&order).await.unwrap();
        store
            .update_status("o-1", OrderStatus::Failed, &OrderPatch::error("boom"))
            .await
            .unwrap();
        store.increment_retry_count("o-1").await.unwrap();

        let restarted = store.create_or_restart(&order).await.unwrap();

        assert_eq!(restarted.status, OrderStatus::Pending);
        assert_eq!(restarted.retry_count, 0);
        assert!(restarted.error_message.is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn confirmed_order_is_not_restarted() {
        let store = MemoryOrderStore::new();
        let order = Order::pending("o-2", &request());
        store.create_or_restart(&order).await.unwrap();
        store
            .update_status(
                "o-2",
                OrderStatus::Confirmed,
                &OrderPatch {
                    tx_hash: Some("raydium_abc".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let again = store.create_or_restart(&order).await.unwrap();
        assert_eq!(again.status, OrderStatus::Confirmed);
        assert_eq!(again.tx_hash.as_deref(), Some("raydium_abc"));
    }

    #[tokio::test]
    async fn set_once_fields_survive_later_writes() {
        let store = MemoryOrderStore::new();
        store
            .create_or_restart(&Order::pending("o-3", &request()))
            .await
            .unwrap();
        let patch = OrderPatch {
            selected_dex: Some(DexName::Raydium),
            ..Default::default()
        };
        store
            .update_status("o-3", OrderStatus::Routing, &patch)
            .await
            .unwrap();
        let overwrite = OrderPatch {
            selected_dex: Some(DexName::Meteora),
            ..Default::default()
        };
        let order = store
            .update_status("o-3", OrderStatus::Building, &overwrite)
            .await
            .unwrap();

        assert_eq!(order.selected_dex, Some(DexName::Raydium));
    }

    #[tokio::test]
    async fn update_of_unknown_order_is_not_found() {
        let store = MemoryOrderStore::new();
        let err = store
            .update_status("nope", OrderStatus::Routing, &OrderPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn cache_tracks_active_ids() {
        let cache = MemoryCache::new();
        cache
            .set_active(&Order::pending("b", &request()))
            .await
            .unwrap();
        cache
            .set_active(&Order::pending("a", &request()))
            .await
            .unwrap();
        cache.remove_active("b").await.unwrap();

        assert_eq!(cache.active_order_ids().await.unwrap(), vec!["a".to_string()]);
        assert!(cache.get_active("b").await.unwrap().is_none());

        cache.set_fail(true);
        assert!(cache.ping().await.is_err());
    }

    #[tokio::test]
    async fn rate_window_counts_hits() {
        let cache = MemoryCache::new();
        let first = cache.hit("ip:1", 60).await.unwrap();
        let second = cache.hit("ip:1", 60).await.unwrap();
        let other = cache.hit("ip:2", 60).await.unwrap();

        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
        assert_eq!(other.count, 1);
        assert!(second.reset_in_secs <= 60);
    }

    #[tokio::test]
    async fn duplicate_job_is_rejected() {
        let queue = MemoryJobQueue::new();
        let job = OrderJob::new("o-4", request());

        assert_eq!(
            queue.enqueue(&job, &JobOptions::default()).await.unwrap(),
            EnqueueOutcome::Queued
        );
        assert_eq!(
            queue.enqueue(&job, &JobOptions::default()).await.unwrap(),
            EnqueueOutcome::Duplicate
        );
        assert_eq!(queue.counts().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn failure_schedules_retry_then_buries() {
        let queue = MemoryJobQueue::new();
        let options = JobOptions {
            attempts: 2,
            backoff: Duration::ZERO,
        };
        queue
            .enqueue(&OrderJob::new("o-5", request()), &options)
            .await
            .unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        assert_eq!(first.attempts_made, 1);
        assert!(matches!(
            queue.fail("o-5", "db down").await.unwrap(),
            JobDisposition::RetryScheduled { .. }
        ));

        let second = queue.claim().await.unwrap().unwrap();
        assert_eq!(second.attempts_made, 2);
        assert_eq!(queue.fail("o-5", "db down").await.unwrap(), JobDisposition::Dead);

        assert!(queue.claim().await.unwrap().is_none());
        assert_eq!(queue.state_of("o-5"), Some(JobState::Failed));
        assert_eq!(queue.last_error("o-5").as_deref(), Some("db down"));
    }

    #[tokio::test]
    async fn stalled_active_job_is_requeued() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(&OrderJob::new("o-6", request()), &JobOptions::default())
            .await
            .unwrap();
        queue.claim().await.unwrap().unwrap();

        assert_eq!(queue.requeue_stalled(Duration::from_secs(60)).await.unwrap(), 0);
        assert_eq!(queue.requeue_stalled(Duration::ZERO).await.unwrap(), 1);

        let again = queue.claim().await.unwrap().unwrap();
        assert_eq!(again.attempts_made, 2);
    }

    #[tokio::test]
    async fn stalled_job_at_attempt_ceiling_is_failed() {
        let queue = MemoryJobQueue::new();
        let options = JobOptions {
            attempts: 1,
            backoff: Duration::ZERO,
        };
        queue
            .enqueue(&OrderJob::new("o-7", request()), &options)
            .await
            .unwrap();
        queue.claim().await.unwrap().unwrap();

        assert_eq!(queue.requeue_stalled(Duration::ZERO).await.unwrap(), 1);

        assert_eq!(queue.state_of("o-7"), Some(JobState::Failed));
        assert_eq!(queue.last_error("o-7").as_deref(), Some(STALLED_ERROR));
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extended_lock_survives_the_stalled_sweep() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(&OrderJob::new("o-8", request()), &JobOptions::default())
            .await
            .unwrap();
        queue.claim().await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        queue.extend_lock("o-8").await.unwrap();

        assert_eq!(queue.requeue_stalled(Duration::from_millis(50)).await.unwrap(), 0);
        assert_eq!(queue.state_of("o-8"), Some(JobState::Active));

        // Only active jobs take a lock
        queue.complete("o-8").await.unwrap();
        queue.extend_lock("o-8").await.unwrap();
        assert_eq!(queue.requeue_stalled(Duration::ZERO).await.unwrap(), 0);
        assert_eq!(queue.state_of("o-8"), Some(JobState::Completed));
    }

    #[tokio::test]
    async fn prune_removes_only_expired_finished_jobs() {
        let queue = MemoryJobQueue::new();
        for id in ["done", "waiting"] {
            queue
                .enqueue(&OrderJob::new(id, request()), &JobOptions::default())
                .await
                .unwrap();
        }
        let claimed = queue.claim().await.unwrap().unwrap();
        queue.complete(&claimed.job.order_id).await.unwrap();

        assert_eq!(
            queue
                .prune(Duration::from_secs(3600), Duration::from_secs(3600))
                .await
                .unwrap(),
            0
        );
        assert_eq!(queue.prune(Duration::ZERO, Duration::ZERO).await.unwrap(), 1);
        assert_eq!(queue.counts().await.unwrap().waiting, 1);
    }
}
