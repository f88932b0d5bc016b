use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use turnstile_core::{CommittedOrder, Order, OrderStatusChange};
use uuid::Uuid;

use crate::{
    auth::{require_organizer, UserId},
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/status", post(update_order_status))
}

/// GET /v1/orders/{id}
/// The buyer's view of an order, its purchases and tickets
pub async fn get_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<CommittedOrder>, AppError> {
    Ok(Json(state.orders.get_order_for_user(id, user_id).await?))
}

/// POST /v1/orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<Uuid>,
    AppJson(change): AppJson<OrderStatusChange>,
) -> Result<Json<Order>, AppError> {
    let current = state.orders.get_order(id).await?;
    require_organizer(&state, current.order.event_id, user).await?;
    Ok(Json(state.orders.update_status(id, change).await?))
}
