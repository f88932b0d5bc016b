pub mod ticket_type;
pub mod pricing;
pub mod inventory;

pub use ticket_type::{NewTicketType, SaleWindow, SaleWindowState, TicketType, TicketTypeStatus, TicketTypeUpdate};
pub use pricing::{LinePrice, OrderTotal};
pub use inventory::{Availability, Remaining};

use uuid::Uuid;

/// Catalog-level errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("Ticket type not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid ticket type: {0}")]
    Validation(String),

    #[error(transparent)]
    Money(#[from] turnstile_shared::MoneyError),

    #[error("Currency mismatch: order is in {expected}, line is in {found}")]
    CurrencyMismatch {
        expected: String,
        found: String,
    },
}
