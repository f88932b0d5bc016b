use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use turnstile_core::{BillingInfo, CommittedOrder, PurchaseFilter, PurchasePage};
use turnstile_order::{PurchaseLine, PurchaseRequest};
use uuid::Uuid;

use crate::{
    auth::{is_organizer, UserId},
    error::AppError,
    extract::AppJson,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    pub lines: Vec<PurchaseLine>,
    pub billing: BillingInfo,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{event_id}/purchases", post(purchase))
        .route("/v1/purchases", get(list_purchases))
}

/// POST /v1/events/{event_id}/purchases
/// Buy tickets. The whole order is issued or nothing is.
pub async fn purchase(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(event_id): Path<Uuid>,
    AppJson(body): AppJson<PurchaseBody>,
) -> Result<(StatusCode, Json<CommittedOrder>), AppError> {
    let request = PurchaseRequest {
        event_id,
        user_id,
        lines: body.lines,
        billing: body.billing,
    };
    let committed = state.checkout.purchase(request).await?;
    Ok((StatusCode::CREATED, Json(committed)))
}

/// GET /v1/purchases?event_id=&user_id=&status=&date_from=&date_to=&page=&limit=
/// The organizer of `event_id` sees every buyer's lines; anyone else only
/// their own.
pub async fn list_purchases(
    State(state): State<AppState>,
    user: UserId,
    Query(mut filter): Query<PurchaseFilter>,
) -> Result<Json<PurchasePage>, AppError> {
    let organizer = match filter.event_id {
        Some(event_id) => is_organizer(&state, event_id, user).await?,
        None => false,
    };
    if !organizer {
        if filter.user_id.is_some_and(|id| id != user.0) {
            return Err(AppError::Forbidden("Only the event organizer may list other buyers".to_string()));
        }
        filter.user_id = Some(user.0);
    }
    Ok(Json(state.orders.list_purchases(&filter).await?))
}
