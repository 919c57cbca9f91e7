use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::config::{AppConfig, RateLimitConfig};
use crate::domain::CreateOrderRequest;
use crate::error::{Result, SwapError};
use crate::notify::ConnectionManager;
use crate::persistence::{OrderCache, OrderRepository, RateLimitStore};
use crate::processor::OrderValidator;
use crate::queue::{EnqueueOutcome, JobOptions, JobQueue, OrderJob};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Durable order records
    pub orders: Arc<dyn OrderRepository>,

    /// Live order snapshots
    pub cache: Arc<dyn OrderCache>,

    /// Ingress request counters
    pub rate_limits: Arc<dyn RateLimitStore>,

    pub queue: Arc<dyn JobQueue>,

    /// Order id → live socket, shared with the processor
    pub connections: Arc<ConnectionManager>,

    pub validator: OrderValidator,

    /// Whole-job retry settings attached to every enqueued job
    pub job_options: JobOptions,

    pub rate_limit: RateLimitConfig,

    /// Show internal error messages in responses (off in production)
    pub expose_internal_errors: bool,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        cache: Arc<dyn OrderCache>,
        rate_limits: Arc<dyn RateLimitStore>,
        queue: Arc<dyn JobQueue>,
        connections: Arc<ConnectionManager>,
        config: &AppConfig,
    ) -> Self {
        Self {
            orders,
            cache,
            rate_limits,
            queue,
            connections,
            validator: OrderValidator::new(),
            job_options: JobOptions::from(&config.queue),
            rate_limit: config.rate_limit.clone(),
            expose_internal_errors: !config.server.is_production(),
            start_time: Utc::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }

    pub fn api_error(&self, error: SwapError) -> ApiError {
        ApiError::new(error, self.expose_internal_errors)
    }

    /// Validate an incoming order and assign it a fresh id
    pub fn accept(&self, request: &CreateOrderRequest) -> Result<String> {
        self.validator.validate(request)?;
        Ok(Uuid::new_v4().to_string())
    }

    /// Hand the order to the worker pool
    pub async fn enqueue(&self, order_id: &str, request: CreateOrderRequest) -> Result<()> {
        let job = OrderJob::new(order_id, request);
        match self.queue.enqueue(&job, &self.job_options).await? {
            EnqueueOutcome::Queued => {
                info!(order_id, "Order queued");
            }
            EnqueueOutcome::Duplicate => {
                warn!(order_id, "Order already queued, ignoring duplicate");
            }
        }
        Ok(())
    }
}
