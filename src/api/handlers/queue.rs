use axum::{extract::State, Json};

use crate::api::{error::ApiError, state::AppState, types::QueueStatsResponse};

/// GET /api/queue/stats
pub async fn get_queue_stats(
    State(state): State<AppState>,
) -> std::result::Result<Json<QueueStatsResponse>, ApiError> {
    let counts = state.queue.counts().await.map_err(|e| state.api_error(e))?;

    Ok(Json(QueueStatsResponse {
        counts,
        live_connections: state.connections.connection_count(),
    }))
}
