use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use crate::api::{
    error::ApiError,
    state::AppState,
    types::{ActiveOrdersResponse, OrderAcceptedResponse},
};
use crate::domain::{CreateOrderRequest, Order};
use crate::error::SwapError;

/// POST /api/orders/execute
pub async fn execute_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateOrderRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<OrderAcceptedResponse>), ApiError> {
    let Json(request) =
        payload.map_err(|r| ApiError::from_rejection(r, state.expose_internal_errors))?;

    let order_id = state.accept(&request).map_err(|e| state.api_error(e))?;
    state
        .enqueue(&order_id, request)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderAcceptedResponse::queued(&order_id)),
    ))
}

/// GET /api/orders/:orderId
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> std::result::Result<Json<Order>, ApiError> {
    match state.orders.find_by_id(&order_id).await {
        Ok(Some(order)) => Ok(Json(order)),
        Ok(None) => Err(state.api_error(SwapError::OrderNotFound(order_id))),
        Err(e) => Err(state.api_error(e)),
    }
}

/// GET /api/orders/active
pub async fn get_active_orders(
    State(state): State<AppState>,
) -> std::result::Result<Json<ActiveOrdersResponse>, ApiError> {
    let order_ids = state
        .cache
        .active_order_ids()
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(ActiveOrdersResponse {
        count: order_ids.len(),
        order_ids,
    }))
}
