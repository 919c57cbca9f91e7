use axum::{
    middleware,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{
    handlers,
    rate_limit::rate_limit,
    state::AppState,
    websocket::{execute_order_ws, stream_order},
};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Order endpoints share the per-client request budget
    let orders = Router::new()
        .route(
            "/api/orders/execute",
            get(execute_order_ws).post(handlers::execute_order),
        )
        .route("/api/orders/active", get(handlers::get_active_orders))
        .route("/api/orders/:orderId", get(handlers::get_order))
        .route("/api/orders/:orderId/stream", get(stream_order))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(orders)
        // Queue endpoints
        .route("/api/queue/stats", get(handlers::get_queue_stats))
        // Health
        .route("/health", get(handlers::health_handler))
        // Add state, tracing and CORS
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
