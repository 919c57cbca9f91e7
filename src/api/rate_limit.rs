use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::api::state::AppState;
use crate::error::SwapError;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Fixed-window limiter keyed by client address. A failing counter store lets
/// the request through.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = client_key(&req);
    let limit = state.rate_limit.max_requests;
    let window_secs = state.rate_limit.window_secs;

    let hit = match state.rate_limits.hit(&client, window_secs).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(client = %client, error = %e, "Rate limiter unavailable, allowing request");
            return next.run(req).await;
        }
    };

    let remaining = limit.saturating_sub(hit.count);
    let reset_at = chrono::Utc::now().timestamp_millis() + (hit.reset_in_secs as i64) * 1000;

    let mut response = if hit.count > limit {
        debug!(client = %client, count = hit.count, limit, "Rate limit exceeded");
        let message = if window_secs == 60 {
            format!("Too many requests. Limit: {} per minute", limit)
        } else {
            format!("Too many requests. Limit: {} per {}s", limit, window_secs)
        };
        state.api_error(SwapError::RateLimited(message)).into_response()
    } else {
        next.run(req).await
    };

    set_headers(response.headers_mut(), limit, remaining, reset_at);
    response
}

fn set_headers(headers: &mut HeaderMap, limit: u64, remaining: u64, reset_at: i64) {
    for (name, value) in [
        (LIMIT_HEADER, limit.to_string()),
        (REMAINING_HEADER, remaining.to_string()),
        (RESET_HEADER, reset_at.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

/// First X-Forwarded-For hop, then the socket peer
fn client_key(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
