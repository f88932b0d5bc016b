use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use turnstile_core::Ticket;
use turnstile_order::holders::TransferRequest;
use uuid::Uuid;

use crate::{auth::UserId, error::AppError, extract::AppJson, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TicketFilter {
    pub event_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/me/tickets", get(list_my_tickets))
        .route("/v1/tickets/{id}/transfer", post(transfer_ticket))
}

/// GET /v1/me/tickets?event_id=
pub async fn list_my_tickets(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(state.holders.list_for_user(user_id, filter.event_id).await?))
}

/// POST /v1/tickets/{id}/transfer
pub async fn transfer_ticket(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
    AppJson(request): AppJson<TransferRequest>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.holders.transfer(id, user_id, request).await?))
}
