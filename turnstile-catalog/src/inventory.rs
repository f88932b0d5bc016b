use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use turnstile_shared::Currency;
use uuid::Uuid;

use crate::ticket_type::{SaleWindow, TicketType, TicketTypeStatus};
use crate::CatalogError;

/// Seats left on a ticket type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum Remaining {
    Limited(i32),
    Unlimited,
}

impl Remaining {
    /// Whether `requested` more seats fit.
    pub fn covers(&self, requested: i64) -> bool {
        match self {
            Remaining::Limited(left) => requested <= i64::from(*left),
            Remaining::Unlimited => true,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Remaining::Limited(0))
    }

    pub fn as_option(&self) -> Option<i32> {
        match self {
            Remaining::Limited(left) => Some(*left),
            Remaining::Unlimited => None,
        }
    }
}

/// Point-in-time view of what can be sold from one ticket type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Availability {
    pub ticket_type_id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub remaining: Remaining,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub max_per_purchase: Option<i32>,
    pub sale_window: SaleWindow,
    pub status: TicketTypeStatus,
}

impl Availability {
    /// Availability of `ticket_type` as seen from `event_id`. A ticket type
    /// that belongs to another event is reported as not found.
    pub fn of(ticket_type: &TicketType, event_id: Uuid) -> Result<Self, CatalogError> {
        if ticket_type.event_id != event_id {
            return Err(CatalogError::NotFound(ticket_type.id));
        }

        Ok(Self {
            ticket_type_id: ticket_type.id,
            event_id: ticket_type.event_id,
            name: ticket_type.name.clone(),
            remaining: ticket_type.remaining(),
            unit_price: ticket_type.price,
            currency: ticket_type.currency.clone(),
            max_per_purchase: ticket_type.max_per_purchase,
            sale_window: ticket_type.sale_window(),
            status: ticket_type.status,
        })
    }
}
