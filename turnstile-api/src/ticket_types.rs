use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use turnstile_catalog::{Availability, NewTicketType, TicketType, TicketTypeUpdate};
use turnstile_core::PurgeSummary;
use uuid::Uuid;

use crate::{
    auth::{require_organizer, UserId},
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/events/{event_id}/ticket-types",
            get(list_ticket_types).post(create_ticket_type),
        )
        .route(
            "/v1/events/{event_id}/ticket-types/{id}/availability",
            get(get_availability),
        )
        .route(
            "/v1/ticket-types/{id}",
            patch(update_ticket_type).delete(delete_ticket_type),
        )
        .route("/v1/events/{event_id}/ticketing", delete(purge_event))
}

/// POST /v1/events/{event_id}/ticket-types
pub async fn create_ticket_type(
    State(state): State<AppState>,
    user: UserId,
    Path(event_id): Path<Uuid>,
    AppJson(def): AppJson<NewTicketType>,
) -> Result<(StatusCode, Json<TicketType>), AppError> {
    require_organizer(&state, event_id, user).await?;
    let created = state.ticket_types.create(event_id, def).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /v1/events/{event_id}/ticket-types
pub async fn list_ticket_types(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<TicketType>>, AppError> {
    Ok(Json(state.ticket_types.list(event_id).await?))
}

/// GET /v1/events/{event_id}/ticket-types/{id}/availability
pub async fn get_availability(
    State(state): State<AppState>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Availability>, AppError> {
    Ok(Json(state.ticket_types.get_available(event_id, id).await?))
}

/// PATCH /v1/ticket-types/{id}
pub async fn update_ticket_type(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<Uuid>,
    AppJson(update): AppJson<TicketTypeUpdate>,
) -> Result<Json<TicketType>, AppError> {
    let current = state.ticket_types.get(id).await?;
    require_organizer(&state, current.event_id, user).await?;
    Ok(Json(state.ticket_types.update(id, update).await?))
}

/// DELETE /v1/ticket-types/{id}
pub async fn delete_ticket_type(
    State(state): State<AppState>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let current = state.ticket_types.get(id).await?;
    require_organizer(&state, current.event_id, user).await?;
    state.ticket_types.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/events/{event_id}/ticketing
/// Remove all ticket types, orders and tickets of an event.
pub async fn purge_event(
    State(state): State<AppState>,
    user: UserId,
    Path(event_id): Path<Uuid>,
) -> Result<Json<PurgeSummary>, AppError> {
    require_organizer(&state, event_id, user).await?;
    Ok(Json(state.orders.purge_event(event_id).await?))
}
