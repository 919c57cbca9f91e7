use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::api::{
    error::ApiError,
    state::AppState,
    types::{ControlMessage, ExecuteOrderQuery},
};
use crate::domain::CreateOrderRequest;
use crate::error::SwapError;
use crate::notify::{LiveConnection, OrderEvent, WsConnection};

/// GET /api/orders/execute with an upgrade: validates the order carried in
/// the query string, then streams its progress on the new socket.
///
/// WebSocket handshakes are GET-only, so the order travels as query
/// parameters (`orderType`, `tokenIn`, `tokenOut`, `amountIn`). Clients that
/// upgraded a POST with a JSON body must move to this form. A plain POST to the
/// same path still queues the order and answers 202 without a socket.
pub async fn execute_order_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    query: std::result::Result<Query<ExecuteOrderQuery>, QueryRejection>,
) -> std::result::Result<Response, ApiError> {
    let Query(query) = query.map_err(|r| {
        state.api_error(SwapError::Validation(r.body_text()))
    })?;

    let request = CreateOrderRequest::from(query);
    let order_id = state.accept(&request).map_err(|e| state.api_error(e))?;

    info!(order_id = %order_id, "Order submitted over websocket");
    let greeting = ControlMessage::order_accepted(&order_id);

    Ok(ws
        .on_upgrade(move |socket| serve_socket(socket, state, order_id, greeting, Some(request)))
        .into_response())
}

/// GET /api/orders/:orderId/stream
pub async fn stream_order(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> impl IntoResponse {
    let greeting = ControlMessage::connection_established(&order_id);
    ws.on_upgrade(move |socket| serve_socket(socket, state, order_id, greeting, None))
}

/// Register the socket for `order_id`, send the greeting, optionally enqueue
/// the order, then forward events until the client goes away.
async fn serve_socket(
    socket: WebSocket,
    state: AppState,
    order_id: String,
    greeting: ControlMessage,
    job: Option<CreateOrderRequest>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let conn = Arc::new(WsConnection::new(tx));
    state.connections.add_connection(&order_id, conn.clone());

    match serde_json::to_string(&greeting) {
        Ok(json) => {
            conn.send_text(json);
        }
        Err(e) => error!("Failed to serialize WebSocket message: {}", e),
    }

    // Registered before enqueueing so no status event can miss the socket
    if let Some(request) = job {
        if let Err(e) = state.enqueue(&order_id, request).await {
            error!(order_id = %order_id, error = %e, "Failed to queue order");
            state.connections.send_to_order(
                &order_id,
                &OrderEvent::error(&order_id, "Failed to queue order", 0),
            );
        }
    }

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Text(text) => {
                debug!(order_id = %order_id, len = text.len(), "Ignoring client frame");
            }
            _ => {}
        }
    }

    conn.close();
    state.connections.release(&order_id, conn.id());
    send_task.abort();

    info!(order_id = %order_id, "WebSocket connection closed");
}
