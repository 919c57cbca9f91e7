use tracing::{debug, warn};

use crate::domain::CreateOrderRequest;
use crate::error::{Result, SwapError};

pub const MIN_AMOUNT_IN: f64 = 0.000001;
pub const MAX_TOKEN_LEN: usize = 50;

/// Ingress checks applied before anything is persisted or queued
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderValidator;

impl OrderValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, request: &CreateOrderRequest) -> Result<()> {
        let mut problems = Vec::new();

        for (field, value) in [("tokenIn", &request.token_in), ("tokenOut", &request.token_out)] {
            let len = value.chars().count();
            if len == 0 {
                problems.push(format!("{}: must not be empty", field));
            } else if len > MAX_TOKEN_LEN {
                problems.push(format!(
                    "{}: must be at most {} characters",
                    field, MAX_TOKEN_LEN
                ));
            }
        }

        if !request.amount_in.is_finite() || request.amount_in <= 0.0 {
            problems.push("amountIn: must be a positive number".to_string());
        }

        if !problems.is_empty() {
            let message = problems.join(", ");
            warn!(error = %message, "Order validation failed");
            return Err(SwapError::Validation(message));
        }

        if request.token_in == request.token_out {
            return Err(SwapError::Validation(
                "tokenIn and tokenOut must be different".to_string(),
            ));
        }

        if request.amount_in < MIN_AMOUNT_IN {
            return Err(SwapError::Validation(
                "amountIn is too small (minimum: 0.000001)".to_string(),
            ));
        }

        debug!(
            order_type = %request.order_type,
            token_in = %request.token_in,
            token_out = %request.token_out,
            amount_in = request.amount_in,
            "Order validation successful"
        );
        Ok(())
    }
}
