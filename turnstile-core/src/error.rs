use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use turnstile_catalog::CatalogError;
use uuid::Uuid;

/// Coarse classification callers use to decide what to do with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Capacity,
    Race,
    AlreadyUsed,
    Timeout,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum TicketingError {
    #[error("Ticket type not found: {0}")]
    TicketTypeNotFound(Uuid),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Ticket not found")]
    TicketNotFound,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Ticket type {ticket_type_id} needs {expected} attendee records, got {provided}")]
    AttendeeMismatch {
        ticket_type_id: Uuid,
        expected: u32,
        provided: usize,
    },

    #[error("Currency mismatch: order is in {expected}, line is in {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("Ticket type {0} is sold out")]
    SoldOut(Uuid),

    #[error("Only {available} tickets left for ticket type {ticket_type_id}, requested {requested}")]
    InsufficientInventory {
        ticket_type_id: Uuid,
        requested: i64,
        available: i32,
    },

    #[error("At most {max} tickets of type {ticket_type_id} per purchase, requested {requested}")]
    PurchaseLimitExceeded {
        ticket_type_id: Uuid,
        requested: i64,
        max: i32,
    },

    #[error("Sales for ticket type {ticket_type_id} open at {starts_at}")]
    SaleNotStarted {
        ticket_type_id: Uuid,
        starts_at: DateTime<Utc>,
    },

    #[error("Sales for ticket type {ticket_type_id} ended at {ended_at}")]
    SaleEnded {
        ticket_type_id: Uuid,
        ended_at: DateTime<Utc>,
    },

    #[error("Ticket type {0} is not on sale")]
    TicketTypeDisabled(Uuid),

    #[error("Inventory for ticket type {ticket_type_id} changed while the purchase was in flight")]
    InventoryRace { ticket_type_id: Uuid },

    #[error("Order {0} was modified concurrently")]
    StaleOrder(Uuid),

    #[error("Ticket {ticket_id} was already used")]
    AlreadyUsed {
        ticket_id: Uuid,
        used_at: Option<DateTime<Utc>>,
        scanned_by: Option<Uuid>,
    },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, TicketingError>;

impl TicketingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketingError::TicketTypeNotFound(_)
            | TicketingError::EventNotFound(_)
            | TicketingError::OrderNotFound(_)
            | TicketingError::TicketNotFound => ErrorKind::NotFound,
            TicketingError::Validation(_)
            | TicketingError::AttendeeMismatch { .. }
            | TicketingError::CurrencyMismatch { .. } => ErrorKind::Validation,
            TicketingError::SoldOut(_)
            | TicketingError::InsufficientInventory { .. }
            | TicketingError::PurchaseLimitExceeded { .. }
            | TicketingError::SaleNotStarted { .. }
            | TicketingError::SaleEnded { .. }
            | TicketingError::TicketTypeDisabled(_) => ErrorKind::Capacity,
            TicketingError::InventoryRace { .. } | TicketingError::StaleOrder(_) => ErrorKind::Race,
            TicketingError::AlreadyUsed { .. } => ErrorKind::AlreadyUsed,
            TicketingError::Timeout { .. } => ErrorKind::Timeout,
            TicketingError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Races and timeouts may succeed when retried with fresh data; capacity
    /// and validation failures will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Race | ErrorKind::Timeout)
    }
}

impl From<CatalogError> for TicketingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => TicketingError::TicketTypeNotFound(id),
            CatalogError::Validation(msg) => TicketingError::Validation(msg),
            CatalogError::Money(e) => TicketingError::Validation(e.to_string()),
            CatalogError::CurrencyMismatch { expected, found } => {
                TicketingError::CurrencyMismatch { expected, found }
            }
        }
    }
}
