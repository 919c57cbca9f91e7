use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::api::types::ErrorBody;
use crate::error::SwapError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error leaving an HTTP handler
#[derive(Debug)]
pub struct ApiError {
    pub error: SwapError,
    /// Show non-operational messages to the caller (off in production)
    pub expose_internal: bool,
}

impl ApiError {
    pub fn new(error: SwapError, expose_internal: bool) -> Self {
        Self {
            error,
            expose_internal,
        }
    }

    /// Malformed or mistyped JSON bodies are validation failures
    pub fn from_rejection(rejection: JsonRejection, expose_internal: bool) -> Self {
        Self::new(SwapError::Validation(rejection.body_text()), expose_internal)
    }

    fn body(&self) -> (StatusCode, ErrorBody) {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // A lookup miss keeps the short error name clients match on
        let name = match self.error.root() {
            SwapError::OrderNotFound(_) => "OrderNotFound",
            other => other.kind(),
        };

        let message = if self.error.is_operational() || self.expose_internal {
            self.error.to_string()
        } else {
            INTERNAL_MESSAGE.to_string()
        };

        (
            status,
            ErrorBody {
                error: name.to_string(),
                message,
                status_code: status.as_u16(),
            },
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.error.is_operational() {
            warn!(kind = self.error.kind(), error = %self.error, "Request failed");
        } else {
            error!(error = %self.error, "Unhandled request error");
        }

        let (status, body) = self.body();
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_message_hidden_unless_exposed() {
        let hidden = ApiError::new(SwapError::Internal("pool exhausted".into()), false);
        let (status, body) = hidden.body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, INTERNAL_MESSAGE);
        assert_eq!(body.error, "InternalServerError");

        let shown = ApiError::new(SwapError::Internal("pool exhausted".into()), true);
        assert_eq!(shown.body().1.message, "Internal error: pool exhausted");
    }

    #[test]
    fn operational_messages_always_shown() {
        let err = ApiError::new(
            SwapError::Validation("tokenIn and tokenOut must be different".into()),
            false,
        );
        let (status, body) = err.body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "ValidationError");
        assert_eq!(body.message, "tokenIn and tokenOut must be different");
        assert_eq!(body.status_code, 400);
    }

    #[test]
    fn not_found_uses_short_name() {
        let (status, body) = ApiError::new(SwapError::OrderNotFound("o-1".into()), false).body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "OrderNotFound");
    }
}
