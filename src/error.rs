use thiserror::Error;

use crate::retry::RetryError;

/// Main error type for the swap engine
#[derive(Error, Debug)]
pub enum SwapError {
    // Request errors
    #[error("{0}")]
    Validation(String),

    #[error("Order {0} not found")]
    OrderNotFound(String),

    #[error("{0}")]
    RateLimited(String),

    // Venue errors
    #[error("{dex} quote failed: {message}")]
    DexQuote { dex: String, message: String },

    #[error("Swap execution failed: {0}")]
    SwapExecution(String),

    // Pipeline errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("{step} timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    /// Display is the underlying failure so the message reaching the client
    /// is the venue's own.
    #[error("{source}")]
    RetryExhausted {
        label: String,
        attempts: u32,
        #[source]
        source: Box<SwapError>,
    },

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Queue error: {0}")]
    Queue(String),

    // Serialization / infrastructure
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for SwapError
pub type Result<T> = std::result::Result<T, SwapError>;

impl SwapError {
    /// Operational errors are expected failures whose message is safe to show
    /// to the caller verbatim.
    pub fn is_operational(&self) -> bool {
        match self {
            SwapError::Validation(_)
            | SwapError::OrderNotFound(_)
            | SwapError::RateLimited(_)
            | SwapError::DexQuote { .. }
            | SwapError::SwapExecution(_) => true,
            SwapError::RetryExhausted { source, .. } => source.is_operational(),
            _ => false,
        }
    }

    /// Durable-store failures. These fail the current job attempt so the
    /// queue's own retry policy can restart the pipeline.
    pub fn is_persistence(&self) -> bool {
        match self {
            SwapError::Database(_) | SwapError::Queue(_) => true,
            SwapError::RetryExhausted { source, .. } => source.is_persistence(),
            _ => false,
        }
    }

    /// HTTP status code used when this error reaches the API layer
    pub fn status_code(&self) -> u16 {
        match self {
            SwapError::Validation(_) => 400,
            SwapError::OrderNotFound(_) => 404,
            SwapError::RateLimited(_) => 429,
            SwapError::RetryExhausted { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// Stable error name reported in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::Validation(_) => "ValidationError",
            SwapError::OrderNotFound(_) => "OrderNotFoundError",
            SwapError::RateLimited(_) => "RateLimitError",
            SwapError::DexQuote { .. } => "DexQuoteError",
            SwapError::SwapExecution(_) => "SwapExecutionError",
            SwapError::RetryExhausted { source, .. } => source.kind(),
            _ => "InternalServerError",
        }
    }

    /// Strip retry annotations and return the error that actually happened
    pub fn root(&self) -> &SwapError {
        match self {
            SwapError::RetryExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<RetryError<SwapError>> for SwapError {
    fn from(err: RetryError<SwapError>) -> Self {
        match err {
            RetryError::Exhausted {
                label,
                attempts,
                source,
            } => SwapError::RetryExhausted {
                label,
                attempts,
                source: Box::new(source),
            },
            // A failing retry hook is a storage failure in its own right and
            // must surface unchanged.
            RetryError::Aborted { source, .. } => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_exhausted_keeps_underlying_message() {
        let err: SwapError = RetryError::Exhausted {
            label: "ExecuteSwap-abc".to_string(),
            attempts: 3,
            source: SwapError::SwapExecution("pool drained".to_string()),
        }
        .into();

        assert_eq!(err.to_string(), "Swap execution failed: pool drained");
        assert_eq!(err.kind(), "SwapExecutionError");
        assert!(err.is_operational());
        assert!(matches!(err.root(), SwapError::SwapExecution(_)));
    }

    #[test]
    fn aborted_retry_surfaces_hook_error() {
        let err: SwapError = RetryError::Aborted {
            label: "ExecuteSwap-abc".to_string(),
            attempt: 1,
            source: SwapError::Database(sqlx::Error::PoolTimedOut),
        }
        .into();

        assert!(matches!(err, SwapError::Database(_)));
        assert!(err.is_persistence());
        assert!(!err.is_operational());
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(SwapError::Validation("x".into()).status_code(), 400);
        assert_eq!(SwapError::OrderNotFound("x".into()).status_code(), 404);
        assert_eq!(SwapError::RateLimited("x".into()).status_code(), 429);
        assert_eq!(SwapError::Internal("x".into()).status_code(), 500);
        assert_eq!(
            SwapError::DexQuote {
                dex: "Raydium".into(),
                message: "down".into()
            }
            .to_string(),
            "Raydium quote failed: down"
        );
    }
}
