use axum::{extract::FromRequestParts, http::request::Parts};
use turnstile_core::TicketingError;
use turnstile_order::deadline::bounded;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Header the upstream authentication gateway sets on every request.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?;

        raw.to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(UserId)
            .ok_or_else(|| AppError::Unauthorized("Malformed x-user-id header".to_string()))
    }
}

/// Whether `user` organizes the event. Unknown events are `EventNotFound`.
pub async fn is_organizer(state: &AppState, event_id: Uuid, user: UserId) -> Result<bool, AppError> {
    let event = bounded("event lookup", state.timeout, state.events.get_event(event_id))
        .await?
        .ok_or(TicketingError::EventNotFound(event_id))?;
    Ok(event.organizer_id == user.0)
}

/// Only the organizer of an event may manage its ticketing.
pub async fn require_organizer(state: &AppState, event_id: Uuid, user: UserId) -> Result<(), AppError> {
    if !is_organizer(state, event_id, user).await? {
        tracing::warn!(event_id = %event_id, user_id = %user.0, "Organizer check failed");
        return Err(AppError::Forbidden("Only the event organizer may do this".to_string()));
    }
    Ok(())
}
