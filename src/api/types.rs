use serde::{Deserialize, Serialize};

use crate::domain::{CreateOrderRequest, OrderType};
use crate::queue::QueueCounts;

// ============================================================================
// Order Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAcceptedResponse {
    pub order_id: String,
    pub status: String,
    pub message: String,
    pub websocket_url: String,
}

impl OrderAcceptedResponse {
    pub fn queued(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            status: "queued".to_string(),
            message: "Order queued for processing. Connect to WebSocket for updates.".to_string(),
            websocket_url: stream_path(order_id),
        }
    }
}

pub fn stream_path(order_id: &str) -> String {
    format!("/api/orders/{}/stream", order_id)
}

/// Order parameters carried in the query string of the upgrade request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOrderQuery {
    pub order_type: OrderType,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
}

impl From<ExecuteOrderQuery> for CreateOrderRequest {
    fn from(q: ExecuteOrderQuery) -> Self {
        CreateOrderRequest {
            order_type: q.order_type,
            token_in: q.token_in,
            token_out: q.token_out,
            amount_in: q.amount_in,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrdersResponse {
    pub order_ids: Vec<String>,
    pub count: usize,
}

// ============================================================================
// Transport Control Messages
// ============================================================================

/// Frames sent by the socket handler itself, outside the order event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ControlMessage {
    ConnectionEstablished {
        order_id: String,
        message: String,
        timestamp: i64,
    },
    OrderAccepted {
        order_id: String,
        status: String,
        message: String,
        timestamp: i64,
    },
}

impl ControlMessage {
    pub fn connection_established(order_id: &str) -> Self {
        ControlMessage::ConnectionEstablished {
            order_id: order_id.to_string(),
            message: "Connected to order status stream".to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn order_accepted(order_id: &str) -> Self {
        ControlMessage::OrderAccepted {
            order_id: order_id.to_string(),
            status: "queued".to_string(),
            message: "Order queued for processing".to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

// ============================================================================
// Health / Queue Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub database: String,
    pub cache: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Seconds since startup
    pub uptime: i64,
    pub services: ServiceHealth,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsResponse {
    pub counts: QueueCounts,
    pub live_connections: usize,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
