use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use turnstile_core::Ticket;
use uuid::Uuid;

use crate::{
    auth::{require_organizer, UserId},
    error::AppError,
    extract::AppJson,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub qr_code: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/events/{event_id}/scans", post(scan_ticket))
}

/// POST /v1/events/{event_id}/scans
/// Admit the holder of a QR code. The scanning user is recorded.
pub async fn scan_ticket(
    State(state): State<AppState>,
    user: UserId,
    Path(event_id): Path<Uuid>,
    AppJson(body): AppJson<ScanBody>,
) -> Result<Json<Ticket>, AppError> {
    require_organizer(&state, event_id, user).await?;
    Ok(Json(state.scans.scan(&body.qr_code, event_id, user.0).await?))
}
