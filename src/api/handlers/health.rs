use axum::{extract::State, http::StatusCode, Json};
use tracing::warn;

use crate::api::{
    state::AppState,
    types::{HealthResponse, ServiceHealth},
};

fn reachability(ok: bool) -> String {
    let state = if ok { "connected" } else { "disconnected" };
    state.to_string()
}

/// GET /health -- liveness and readiness check over the order store and cache
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let (db, cache) = tokio::join!(state.orders.ping(), state.cache.ping());

    if let Err(e) = &db {
        warn!(error = %e, "Health check: database unreachable");
    }
    if let Err(e) = &cache {
        warn!(error = %e, "Health check: cache unreachable");
    }

    let ok = db.is_ok() && cache.is_ok();
    let resp = HealthResponse {
        status: if ok { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        uptime: state.uptime_seconds(),
        services: ServiceHealth {
            database: reachability(db.is_ok()),
            cache: reachability(cache.is_ok()),
        },
    };

    if ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}
