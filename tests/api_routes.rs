use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use swapflow::adapters::{MemoryCache, MemoryJobQueue, MemoryOrderStore};
use swapflow::api::{create_router, AppState};
use swapflow::config::AppConfig;
use swapflow::domain::{CreateOrderRequest, Order, OrderType};
use swapflow::notify::ConnectionManager;
use swapflow::persistence::{OrderCache, OrderRepository};
use swapflow::queue::JobState;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    orders: Arc<MemoryOrderStore>,
    cache: Arc<MemoryCache>,
    queue: Arc<MemoryJobQueue>,
}

fn test_app_with(config: AppConfig) -> TestApp {
    let orders = Arc::new(MemoryOrderStore::new());
    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let state = AppState::new(
        orders.clone(),
        cache.clone(),
        cache.clone(),
        queue.clone(),
        Arc::new(ConnectionManager::new()),
        &config,
    );
    TestApp {
        router: create_router(state),
        orders,
        cache,
        queue,
    }
}

fn test_app() -> TestApp {
    test_app_with(AppConfig::local())
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn post_order(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/orders/execute")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn post_execute_queues_order() {
    let app = test_app();
    let (status, _, body) = send(
        &app.router,
        post_order(json!({
            "orderType": "market",
            "tokenIn": "SOL",
            "tokenOut": "USDC",
            "amountIn": 1.5
        })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    let order_id = body["orderId"].as_str().unwrap();
    assert_eq!(
        body["websocketUrl"],
        format!("/api/orders/{}/stream", order_id)
    );
    assert_eq!(app.queue.state_of(order_id), Some(JobState::Waiting));
}

#[tokio::test]
async fn get_execute_without_upgrade_does_not_queue() {
    let app = test_app();
    // Rejection body is plain text
    let response = app
        .router
        .clone()
        .oneshot(get(
            "/api/orders/execute?orderType=market&tokenIn=SOL&tokenOut=USDC&amountIn=1.5",
        ))
        .await
        .unwrap();

    let status = response.status();
    assert!(status.is_client_error(), "got {status}");
    assert_eq!(app.queue.snapshot_counts().waiting, 0);
}

#[tokio::test]
async fn post_execute_rejects_invalid_orders() {
    let app = test_app();

    let (status, _, body) = send(
        &app.router,
        post_order(json!({
            "orderType": "market",
            "tokenIn": "SOL",
            "tokenOut": "SOL",
            "amountIn": 1.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
    assert_eq!(body["message"], "tokenIn and tokenOut must be different");

    let (status, _, body) = send(
        &app.router,
        post_order(json!({
            "orderType": "market",
            "tokenIn": "SOL",
            "tokenOut": "USDC",
            "amountIn": 0.0000001
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "amountIn is too small (minimum: 0.000001)");

    let (status, _, body) = send(
        &app.router,
        post_order(json!({ "orderType": "market", "tokenIn": "SOL" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    assert_eq!(app.queue.snapshot_counts().waiting, 0);
}

#[tokio::test]
async fn get_order_returns_record_or_404() {
    let app = test_app();

    let (status, _, body) = send(&app.router, get("/api/orders/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "OrderNotFound");
    assert_eq!(body["message"], "Order missing not found");

    let request = CreateOrderRequest {
        order_type: OrderType::Market,
        token_in: "SOL".to_string(),
        token_out: "USDC".to_string(),
        amount_in: 3.0,
    };
    app.orders
        .create_or_restart(&Order::pending("known", &request))
        .await
        .unwrap();

    let (status, _, body) = send(&app.router, get("/api/orders/known")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "known");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amountIn"], 3.0);
}

#[tokio::test]
async fn active_orders_lists_cached_ids() {
    let app = test_app();
    let request = CreateOrderRequest {
        order_type: OrderType::Market,
        token_in: "SOL".to_string(),
        token_out: "USDC".to_string(),
        amount_in: 1.0,
    };
    app.cache
        .set_active(&Order::pending("live-1", &request))
        .await
        .unwrap();

    let (status, _, body) = send(&app.router, get("/api/orders/active")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["orderIds"], json!(["live-1"]));
}

#[tokio::test]
async fn health_reports_each_dependency() {
    let app = test_app();

    let (status, _, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["services"]["database"], "connected");
    assert_eq!(body["services"]["cache"], "connected");

    app.cache.set_fail(true);
    let (status, _, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["database"], "connected");
    assert_eq!(body["services"]["cache"], "disconnected");
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let mut config = AppConfig::local();
    config.rate_limit.max_requests = 2;
    let app = test_app_with(config);

    let (status, headers, _) = send(&app.router, get("/api/orders/a")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "1");
    assert!(headers.contains_key("x-ratelimit-reset"));

    send(&app.router, get("/api/orders/b")).await;

    let (status, headers, body) = send(&app.router, get("/api/orders/c")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert_eq!(body["error"], "RateLimitError");
    assert_eq!(body["message"], "Too many requests. Limit: 2 per minute");

    // Health is outside the order budget
    let (status, _, _) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_fails_open_when_store_is_down() {
    let mut config = AppConfig::local();
    config.rate_limit.max_requests = 1;
    let app = test_app_with(config);
    app.cache.set_fail(true);

    for _ in 0..3 {
        let (status, headers, _) = send(&app.router, get("/api/orders/x")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!headers.contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn queue_stats_counts_jobs() {
    let app = test_app();
    send(
        &app.router,
        post_order(json!({
            "orderType": "limit",
            "tokenIn": "BONK",
            "tokenOut": "USDC",
            "amountIn": 1000.0
        })),
    )
    .await;

    let (status, _, body) = send(&app.router, get("/api/queue/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["waiting"], 1);
    assert_eq!(body["counts"]["completed"], 0);
    assert_eq!(body["liveConnections"], 0);
}
