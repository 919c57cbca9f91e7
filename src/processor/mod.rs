//! Order pipeline: PENDING → ROUTING → BUILDING → SUBMITTED → CONFIRMED,
//! with FAILED reachable from every live state.
//!
//! Each step is awaited before the next starts. A redelivered job restarts
//! from the top; the repository resets the order row unless it is already
//! CONFIRMED.

pub mod validator;

pub use validator::OrderValidator;

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::OrderProcessingConfig;
use crate::dex::{ComparisonResult, DexRouter};
use crate::domain::{
    CreateOrderRequest, DexName, Order, OrderPatch, OrderStatus, QuoteRequest, StateTransition,
    SwapExecution,
};
use crate::error::{Result, SwapError};
use crate::notify::{ConnectionManager, OrderEvent};
use crate::persistence::{OrderCache, OrderRepository};
use crate::queue::{ClaimedJob, JobHandler};
use crate::retry::{with_backoff, with_backoff_notify, RetryPolicy};

const MSG_RECEIVED: &str = "Order received and queued";
const MSG_ROUTING: &str = "Comparing DEX prices...";
const MSG_BUILDING: &str = "Creating transaction...";
const MSG_SUBMITTED: &str = "Transaction sent to blockchain...";

#[derive(Debug, Clone, Copy)]
pub struct ProcessorSettings {
    pub retry_policy: RetryPolicy,
    /// Simulated transaction assembly latency
    pub build_delay: Duration,
    /// Deadline for the quote and execute steps, retries included
    pub step_timeout: Duration,
}

impl From<&OrderProcessingConfig> for ProcessorSettings {
    fn from(config: &OrderProcessingConfig) -> Self {
        Self {
            retry_policy: config.retry_policy(),
            build_delay: Duration::from_millis(config.build_delay_ms),
            step_timeout: Duration::from_millis(config.step_timeout_ms),
        }
    }
}

/// Where one run of the pipeline currently stands
struct Run<'a> {
    order_id: &'a str,
    status: OrderStatus,
    retry_count: i32,
}

pub struct OrderProcessor {
    router: DexRouter,
    orders: Arc<dyn OrderRepository>,
    cache: Arc<dyn OrderCache>,
    connections: Arc<ConnectionManager>,
    settings: ProcessorSettings,
}

impl OrderProcessor {
    pub fn new(
        router: DexRouter,
        orders: Arc<dyn OrderRepository>,
        cache: Arc<dyn OrderCache>,
        connections: Arc<ConnectionManager>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            router,
            orders,
            cache,
            connections,
            settings,
        }
    }

    /// Drive one order to a terminal status.
    ///
    /// Venue failures end in `Ok(OrderStatus::Failed)`. Persistence failures
    /// mark the order FAILED when possible and are returned as `Err` so the
    /// queue can redeliver the job.
    pub async fn process_order(
        &self,
        order_id: &str,
        request: &CreateOrderRequest,
    ) -> Result<OrderStatus> {
        let started = Instant::now();
        info!(
            order_id,
            order_type = %request.order_type,
            token_in = %request.token_in,
            token_out = %request.token_out,
            amount_in = request.amount_in,
            "Starting order processing"
        );

        let mut run = Run {
            order_id,
            status: OrderStatus::Pending,
            retry_count: 0,
        };

        match self.run_pipeline(&mut run, request).await {
            Ok(status) => {
                info!(
                    order_id,
                    status = %status,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Order processing completed"
                );
                Ok(status)
            }
            Err(err) => {
                self.handle_failure(&mut run, &err).await;
                if err.is_persistence() {
                    Err(err)
                } else {
                    Ok(OrderStatus::Failed)
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        run: &mut Run<'_>,
        request: &CreateOrderRequest,
    ) -> Result<OrderStatus> {
        let order_id = run.order_id;

        // STEP 1: persist at PENDING
        let order = self
            .orders
            .create_or_restart(&Order::pending(order_id, request))
            .await?;
        if order.status == OrderStatus::Confirmed {
            info!(order_id, tx_hash = ?order.tx_hash, "Order already confirmed, skipping");
            run.status = OrderStatus::Confirmed;
            return Ok(OrderStatus::Confirmed);
        }
        self.record_event(order_id, &StateTransition::created(MSG_RECEIVED))
            .await;
        self.refresh_cache(&order).await;
        self.send_status(order_id, OrderStatus::Pending, MSG_RECEIVED);

        let quote_request = QuoteRequest {
            token_in: request.token_in.clone(),
            token_out: request.token_out.clone(),
            amount_in: request.amount_in,
        };

        // STEP 2: route
        self.transition(run, OrderStatus::Routing, OrderPatch::default(), Some(MSG_ROUTING))
            .await?;

        let comparison = self.quote_step(order_id, &quote_request).await?;
        let routed = self
            .orders
            .update_status(order_id, OrderStatus::Routing, &routing_patch(&comparison))
            .await?;
        self.refresh_cache(&routed).await;
        self.send_routing(order_id, &comparison);

        // STEP 3: build
        self.transition(run, OrderStatus::Building, OrderPatch::default(), Some(MSG_BUILDING))
            .await?;
        sleep(self.settings.build_delay).await;

        // STEP 4: submit
        self.transition(run, OrderStatus::Submitted, OrderPatch::default(), Some(MSG_SUBMITTED))
            .await?;

        let dex = comparison.selected_dex();
        let execution = self
            .execute_step(run, &quote_request, &comparison)
            .await?;

        // STEP 5: confirm
        let patch = OrderPatch {
            executed_price: Some(execution.executed_price),
            amount_out: Some(execution.amount_out),
            tx_hash: Some(execution.tx_hash.clone()),
            confirmed_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        self.transition(run, OrderStatus::Confirmed, patch, None).await?;
        self.connections.send_to_order(
            order_id,
            &OrderEvent::execution(
                order_id,
                execution.tx_hash.clone(),
                execution.executed_price,
                execution.amount_out,
                dex,
            ),
        );

        info!(
            order_id,
            dex = %dex,
            tx_hash = %execution.tx_hash,
            executed_price = execution.executed_price,
            amount_out = execution.amount_out,
            "Swap confirmed"
        );
        Ok(OrderStatus::Confirmed)
    }

    async fn quote_step(
        &self,
        order_id: &str,
        request: &QuoteRequest,
    ) -> Result<ComparisonResult> {
        let label = format!("GetQuotes-{}", order_id);
        let router = &self.router;
        self.with_deadline(
            "GetQuotes",
            with_backoff(&label, &self.settings.retry_policy, move || {
                router.best_quote(request)
            }),
        )
        .await?
        .map_err(SwapError::from)
    }

    async fn execute_step(
        &self,
        run: &mut Run<'_>,
        request: &QuoteRequest,
        comparison: &ComparisonResult,
    ) -> Result<SwapExecution> {
        let order_id = run.order_id;
        let label = format!("ExecuteSwap-{}", order_id);
        let router = &self.router;
        let dex = comparison.selected_dex();
        let quote = &comparison.best;
        let orders = &self.orders;
        // Only advances once the store has recorded the retry
        let retries = AtomicI32::new(run.retry_count);
        let recorded = &retries;

        let outcome = self
            .with_deadline(
                "ExecuteSwap",
                with_backoff_notify(
                    &label,
                    &self.settings.retry_policy,
                    move || router.execute_swap(request, dex, quote),
                    |_attempt, _err: &SwapError| async move {
                        let count = orders.increment_retry_count(order_id).await?;
                        recorded.store(count, Ordering::SeqCst);
                        Ok::<_, SwapError>(())
                    },
                ),
            )
            .await;

        run.retry_count = retries.load(Ordering::SeqCst);
        outcome?.map_err(SwapError::from)
    }

    async fn with_deadline<T, F>(&self, step: &str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let limit = self.settings.step_timeout;
        timeout(limit, fut).await.map_err(|_| SwapError::StepTimeout {
            step: step.to_string(),
            timeout_ms: limit.as_millis() as u64,
        })
    }

    /// Validate, persist, trail, cache and announce one status change
    async fn transition(
        &self,
        run: &mut Run<'_>,
        next: OrderStatus,
        patch: OrderPatch,
        message: Option<&str>,
    ) -> Result<Order> {
        let order_id = run.order_id;
        if !run.status.can_transition_to(next) {
            return Err(SwapError::InvalidStateTransition {
                from: run.status.to_string(),
                to: next.to_string(),
            });
        }

        let order = self.orders.update_status(order_id, next, &patch).await?;
        let transition =
            StateTransition::new(run.status, next, message.unwrap_or_else(|| next.as_str()));
        run.status = next;
        run.retry_count = order.retry_count;

        debug!(order_id, from = ?transition.from, to = %next, "Order transitioned");
        self.record_event(order_id, &transition).await;
        self.refresh_cache(&order).await;

        if let Some(message) = message {
            self.send_status(order_id, next, message);
        }
        Ok(order)
    }

    async fn handle_failure(&self, run: &mut Run<'_>, err: &SwapError) {
        let order_id = run.order_id;
        let message = err.to_string();
        error!(
            order_id,
            status = %run.status,
            error = %message,
            kind = err.kind(),
            "Order processing failed"
        );

        if !run.status.can_transition_to(OrderStatus::Failed) {
            warn!(order_id, status = %run.status, "Order already terminal, not marking failed");
            return;
        }

        match self
            .orders
            .update_status(order_id, OrderStatus::Failed, &OrderPatch::error(message.clone()))
            .await
        {
            Ok(order) => {
                run.retry_count = order.retry_count;
                self.record_event(
                    order_id,
                    &StateTransition::new(run.status, OrderStatus::Failed, message.clone()),
                )
                .await;
                run.status = OrderStatus::Failed;
            }
            Err(update_err) => {
                error!(
                    order_id,
                    error = %update_err,
                    "Failed to update order failure status"
                );
            }
        }

        self.connections
            .send_to_order(order_id, &OrderEvent::error(order_id, message, run.retry_count));

        if let Err(e) = self.cache.remove_active(order_id).await {
            warn!(order_id, error = %e, "Failed to remove active order from cache");
        }
    }

    async fn record_event(&self, order_id: &str, transition: &StateTransition) {
        if let Err(e) = self.orders.append_event(order_id, transition).await {
            warn!(order_id, to = %transition.to, error = %e, "Failed to append order event");
        }
    }

    /// Keep the live snapshot current; drop it once the order is terminal
    async fn refresh_cache(&self, order: &Order) {
        let result = if order.status.is_terminal() {
            self.cache.remove_active(&order.id).await
        } else {
            self.cache.set_active(order).await
        };
        if let Err(e) = result {
            warn!(order_id = %order.id, status = %order.status, error = %e, "Cache update failed");
        }
    }

    fn send_status(&self, order_id: &str, status: OrderStatus, message: &str) {
        self.connections
            .send_to_order(order_id, &OrderEvent::status(order_id, status, message));
    }

    fn send_routing(&self, order_id: &str, comparison: &ComparisonResult) {
        let price = |dex| {
            comparison
                .quote_for(dex)
                .map(|q| q.total_cost)
                .unwrap_or(0.0)
        };
        self.connections.send_to_order(
            order_id,
            &OrderEvent::routing(
                order_id,
                price(DexName::Raydium),
                price(DexName::Meteora),
                comparison.selected_dex(),
                comparison.reason(),
            ),
        );
    }
}

fn routing_patch(comparison: &ComparisonResult) -> OrderPatch {
    OrderPatch {
        selected_dex: Some(comparison.selected_dex()),
        raydium_quote_price: comparison.quote_for(DexName::Raydium).map(|q| q.total_cost),
        meteora_quote_price: comparison.quote_for(DexName::Meteora).map(|q| q.total_cost),
        ..Default::default()
    }
}

#[async_trait]
impl JobHandler for OrderProcessor {
    async fn handle(&self, job: &ClaimedJob) -> Result<()> {
        debug!(
            order_id = %job.job.order_id,
            attempt = job.attempts_made,
            max_attempts = job.max_attempts,
            "Processing order job"
        );
        self.process_order(&job.job.order_id, &job.job.request)
            .await
            .map(|_| ())
    }
}
