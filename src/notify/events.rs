use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{DexName, OrderStatus};

/// Live event pushed to the order's connection. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OrderEvent {
    StatusUpdate {
        order_id: String,
        status: OrderStatus,
        message: String,
        timestamp: i64,
    },
    RoutingInfo {
        order_id: String,
        raydium_price: f64,
        meteora_price: f64,
        selected_dex: DexName,
        reason: String,
        timestamp: i64,
    },
    ExecutionResult {
        order_id: String,
        tx_hash: String,
        executed_price: f64,
        amount_out: f64,
        dex: DexName,
        timestamp: i64,
    },
    Error {
        order_id: String,
        error: String,
        retry_count: i32,
        timestamp: i64,
    },
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl OrderEvent {
    pub fn status(order_id: &str, status: OrderStatus, message: impl Into<String>) -> Self {
        OrderEvent::StatusUpdate {
            order_id: order_id.to_string(),
            status,
            message: message.into(),
            timestamp: now_millis(),
        }
    }

    pub fn routing(
        order_id: &str,
        raydium_price: f64,
        meteora_price: f64,
        selected_dex: DexName,
        reason: String,
    ) -> Self {
        OrderEvent::RoutingInfo {
            order_id: order_id.to_string(),
            raydium_price,
            meteora_price,
            selected_dex,
            reason,
            timestamp: now_millis(),
        }
    }

    pub fn execution(
        order_id: &str,
        tx_hash: String,
        executed_price: f64,
        amount_out: f64,
        dex: DexName,
    ) -> Self {
        OrderEvent::ExecutionResult {
            order_id: order_id.to_string(),
            tx_hash,
            executed_price,
            amount_out,
            dex,
            timestamp: now_millis(),
        }
    }

    pub fn error(order_id: &str, error: impl Into<String>, retry_count: i32) -> Self {
        OrderEvent::Error {
            order_id: order_id.to_string(),
            error: error.into(),
            retry_count,
            timestamp: now_millis(),
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::StatusUpdate { order_id, .. }
            | OrderEvent::RoutingInfo { order_id, .. }
            | OrderEvent::ExecutionResult { order_id, .. }
            | OrderEvent::Error { order_id, .. } => order_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::StatusUpdate { .. } => "status_update",
            OrderEvent::RoutingInfo { .. } => "routing_info",
            OrderEvent::ExecutionResult { .. } => "execution_result",
            OrderEvent::Error { .. } => "error",
        }
    }
}
