use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use turnstile_core::{ErrorKind, TicketingError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Ticketing(#[from] TicketingError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Ticketing(err) => match err {
                TicketingError::AttendeeMismatch { .. } | TicketingError::CurrencyMismatch { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => match err.kind() {
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::Capacity | ErrorKind::Race | ErrorKind::AlreadyUsed => StatusCode::CONFLICT,
                    ErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                },
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Ticketing(err) => match err {
                TicketingError::TicketTypeNotFound(_) => "TICKET_TYPE_NOT_FOUND",
                TicketingError::EventNotFound(_) => "EVENT_NOT_FOUND",
                TicketingError::OrderNotFound(_) => "ORDER_NOT_FOUND",
                TicketingError::TicketNotFound => "TICKET_NOT_FOUND",
                TicketingError::Validation(_) => "VALIDATION_ERROR",
                TicketingError::AttendeeMismatch { .. } => "ATTENDEE_MISMATCH",
                TicketingError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
                TicketingError::SoldOut(_) => "SOLD_OUT",
                TicketingError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
                TicketingError::PurchaseLimitExceeded { .. } => "PURCHASE_LIMIT_EXCEEDED",
                TicketingError::SaleNotStarted { .. } => "SALE_NOT_STARTED",
                TicketingError::SaleEnded { .. } => "SALE_ENDED",
                TicketingError::TicketTypeDisabled(_) => "TICKET_TYPE_DISABLED",
                TicketingError::InventoryRace { .. } => "INVENTORY_RACE",
                TicketingError::StaleOrder(_) => "STALE_ORDER",
                TicketingError::AlreadyUsed { .. } => "ALREADY_USED",
                TicketingError::Timeout { .. } => "TIMEOUT",
                TicketingError::Internal(_) => "INTERNAL_ERROR",
            },
        }
    }

    fn details(&self) -> Option<Value> {
        let AppError::Ticketing(err) = self else {
            return None;
        };
        match err {
            TicketingError::InsufficientInventory {
                ticket_type_id,
                requested,
                available,
            } => Some(json!({
                "ticket_type_id": ticket_type_id,
                "requested": requested,
                "available": available,
            })),
            TicketingError::PurchaseLimitExceeded {
                ticket_type_id,
                requested,
                max,
            } => Some(json!({
                "ticket_type_id": ticket_type_id,
                "requested": requested,
                "max_per_purchase": max,
            })),
            TicketingError::AttendeeMismatch {
                ticket_type_id,
                expected,
                provided,
            } => Some(json!({
                "ticket_type_id": ticket_type_id,
                "expected": expected,
                "provided": provided,
            })),
            TicketingError::SaleNotStarted { ticket_type_id, starts_at } => Some(json!({
                "ticket_type_id": ticket_type_id,
                "starts_at": starts_at,
            })),
            TicketingError::SaleEnded { ticket_type_id, ended_at } => Some(json!({
                "ticket_type_id": ticket_type_id,
                "ended_at": ended_at,
            })),
            TicketingError::SoldOut(id)
            | TicketingError::TicketTypeDisabled(id)
            | TicketingError::InventoryRace { ticket_type_id: id } => Some(json!({ "ticket_type_id": id })),
            TicketingError::AlreadyUsed {
                ticket_id,
                used_at,
                scanned_by,
            } => Some(json!({
                "ticket_id": ticket_id,
                "used_at": used_at,
                "scanned_by": scanned_by,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = matches!(&self, AppError::Ticketing(err) if err.is_retryable());

        let message = match &self {
            AppError::Ticketing(TicketingError::Internal(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": message,
            "code": self.code(),
            "retryable": retryable,
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}
