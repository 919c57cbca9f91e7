use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DexName, OrderStatus};

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Sniper,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Sniper => "sniper",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            "sniper" => Ok(OrderType::Sniper),
            _ => Err(format!("Unknown order type: {}", s)),
        }
    }
}

/// Order request as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_type: OrderType,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
}

/// Order (tracked in our system)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_type: OrderType,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_dex: Option<DexName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raydium_quote_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meteora_quote_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_out: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A fresh PENDING order
    pub fn pending(id: impl Into<String>, request: &CreateOrderRequest) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            order_type: request.order_type,
            token_in: request.token_in.clone(),
            token_out: request.token_out.clone(),
            amount_in: request.amount_in,
            status: OrderStatus::Pending,
            selected_dex: None,
            raydium_quote_price: None,
            meteora_quote_price: None,
            executed_price: None,
            amount_out: None,
            tx_hash: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }

    /// The creation parameters this order was built from
    pub fn request(&self) -> CreateOrderRequest {
        CreateOrderRequest {
            order_type: self.order_type,
            token_in: self.token_in.clone(),
            token_out: self.token_out.clone(),
            amount_in: self.amount_in,
        }
    }

    /// Record a quoted total cost for the given venue
    pub fn set_quote_price(&mut self, dex: DexName, total_cost: f64) {
        match dex {
            DexName::Raydium => self.raydium_quote_price = Some(total_cost),
            DexName::Meteora => self.meteora_quote_price = Some(total_cost),
        }
    }

    pub fn quote_price(&self, dex: DexName) -> Option<f64> {
        match dex {
            DexName::Raydium => self.raydium_quote_price,
            DexName::Meteora => self.meteora_quote_price,
        }
    }

    /// Apply a patch the way the durable store does: set-once fields keep
    /// their first value, the error text is always overwritten.
    pub fn apply(&mut self, status: OrderStatus, patch: &OrderPatch) {
        self.status = status;
        self.selected_dex = self.selected_dex.or(patch.selected_dex);
        self.raydium_quote_price = self.raydium_quote_price.or(patch.raydium_quote_price);
        self.meteora_quote_price = self.meteora_quote_price.or(patch.meteora_quote_price);
        self.executed_price = self.executed_price.or(patch.executed_price);
        self.amount_out = self.amount_out.or(patch.amount_out);
        if self.tx_hash.is_none() {
            self.tx_hash = patch.tx_hash.clone();
        }
        if patch.error_message.is_some() {
            self.error_message = patch.error_message.clone();
        }
        self.confirmed_at = self.confirmed_at.or(patch.confirmed_at);
        self.updated_at = Utc::now();
    }

    /// Reset a non-confirmed order for a full pipeline restart
    pub fn restart(&mut self, request: &CreateOrderRequest) {
        let created_at = self.created_at;
        *self = Order::pending(self.id.clone(), request);
        self.created_at = created_at;
    }
}

/// Optional fields written alongside a status change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub selected_dex: Option<DexName>,
    pub raydium_quote_price: Option<f64>,
    pub meteora_quote_price: Option<f64>,
    pub executed_price: Option<f64>,
    pub amount_out: Option<f64>,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl OrderPatch {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            order_type: OrderType::Market,
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 100.0,
        }
    }

    #[test]
    fn request_uses_camel_case_wire_names() {
        let parsed: CreateOrderRequest = serde_json::from_str(
            r#"{"orderType":"sniper","tokenIn":"SOL","tokenOut":"USDT","amountIn":2.5}"#,
        )
        .unwrap();
        assert_eq!(parsed.order_type, OrderType::Sniper);
        assert_eq!(parsed.amount_in, 2.5);
    }

    #[test]
    fn set_once_fields_keep_first_value() {
        let mut order = Order::pending("o-1", &request());
        order.apply(
            OrderStatus::Routing,
            &OrderPatch {
                selected_dex: Some(DexName::Meteora),
                ..Default::default()
            },
        );
        order.apply(
            OrderStatus::Building,
            &OrderPatch {
                selected_dex: Some(DexName::Raydium),
                ..Default::default()
            },
        );

        assert_eq!(order.status, OrderStatus::Building);
        assert_eq!(order.selected_dex, Some(DexName::Meteora));
    }

    #[test]
    fn restart_clears_progress_but_keeps_identity() {
        let mut order = Order::pending("o-2", &request());
        let created_at = order.created_at;
        order.apply(OrderStatus::Failed, &OrderPatch::error("boom"));
        order.retry_count = 2;

        order.restart(&request());

        assert_eq!(order.id, "o-2");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.retry_count, 0);
        assert!(order.error_message.is_none());
        assert_eq!(order.created_at, created_at);
    }

    #[test]
    fn serializes_camel_case_and_skips_empty_fields() {
        let order = Order::pending("o-3", &request());
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["tokenIn"], "SOL");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["retryCount"], 0);
        assert!(json.get("txHash").is_none());
    }
}
