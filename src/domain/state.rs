use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted and persisted, not yet routed
    Pending,
    /// Fetching and comparing venue quotes
    Routing,
    /// Assembling the transaction
    Building,
    /// Swap sent to the selected venue
    Submitted,
    /// Swap settled
    Confirmed,
    /// Pipeline aborted
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Routing => "routing",
            OrderStatus::Building => "building",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, target) {
            (Pending, Routing) => true,
            (Routing, Building) => true,
            (Building, Submitted) => true,
            (Submitted, Confirmed) => true,

            // Any live state can fail
            (Pending | Routing | Building | Submitted, Failed) => true,

            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<OrderStatus> {
        use OrderStatus::*;

        match self {
            Pending => vec![Routing, Failed],
            Routing => vec![Building, Failed],
            Building => vec![Submitted, Failed],
            Submitted => vec![Confirmed, Failed],
            Confirmed | Failed => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "routing" => Ok(OrderStatus::Routing),
            "building" => Ok(OrderStatus::Building),
            "submitted" => Ok(OrderStatus::Submitted),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "failed" => Ok(OrderStatus::Failed),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// State transition event (for the order's audit trail)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// `None` for the entry written when the order is created
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: OrderStatus, to: OrderStatus, reason: impl Into<String>) -> Self {
        Self {
            from: Some(from),
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn created(reason: impl Into<String>) -> Self {
        Self {
            from: None,
            to: OrderStatus::Pending,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
