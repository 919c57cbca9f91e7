//! Storage contracts used by the order pipeline and the HTTP layer.
//!
//! - [`OrderRepository`]: durable order records plus their transition trail
//! - [`OrderCache`]: short-lived snapshots of in-flight orders
//! - [`RateLimitStore`]: fixed-window request counters
//!
//! Concrete implementations live in `adapters`.

use async_trait::async_trait;

use crate::domain::{Order, OrderPatch, OrderStatus, StateTransition};
use crate::error::Result;

/// Seconds an active-order snapshot survives without being refreshed
pub const ACTIVE_ORDER_TTL_SECS: u64 = 3600;

/// Key of the cached snapshot for one order
pub fn active_order_key(order_id: &str) -> String {
    format!("active_order:{}", order_id)
}

/// Set holding the ids of every cached order
pub const ACTIVE_ORDERS_SET: &str = "active_orders";

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert `order` at PENDING. An existing row that is not CONFIRMED is
    /// reset to PENDING with cleared progress; a CONFIRMED row is returned
    /// untouched.
    async fn create_or_restart(&self, order: &Order) -> Result<Order>;

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>>;

    /// Write a status change. Set-once fields already present are kept.
    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        patch: &OrderPatch,
    ) -> Result<Order>;

    /// Returns the new counter value
    async fn increment_retry_count(&self, order_id: &str) -> Result<i32>;

    async fn append_event(&self, order_id: &str, transition: &StateTransition) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait OrderCache: Send + Sync {
    async fn set_active(&self, order: &Order) -> Result<()>;

    async fn get_active(&self, order_id: &str) -> Result<Option<Order>>;

    async fn remove_active(&self, order_id: &str) -> Result<()>;

    async fn active_order_ids(&self) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

/// Counter state after one request in a fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Requests seen in the current window, this one included
    pub count: u64,
    /// Seconds until the window resets
    pub reset_in_secs: u64,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request against `key`. The window starts on the first hit.
    async fn hit(&self, key: &str, window_secs: u64) -> Result<WindowHit>;
}
