use async_trait::async_trait;
use chrono::{DateTime, Utc};
use turnstile_catalog::TicketType;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::plan::WritePlan;
use crate::records::{
    CommittedOrder, EventSummary, Order, OrderStatus, OrderStatusChange, PurchaseFilter, PurchasePage,
    PurgeSummary, Ticket,
};

/// Read-only lookup of events owned by the surrounding platform
#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn get_event(&self, id: Uuid) -> CoreResult<Option<EventSummary>>;
}

/// Ticket type storage
#[async_trait]
pub trait TicketTypeRepository: Send + Sync {
    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> CoreResult<()>;

    async fn get_ticket_type(&self, id: Uuid) -> CoreResult<Option<TicketType>>;

    /// Snapshot of several ticket types in one read. Missing ids are simply
    /// absent from the result.
    async fn get_ticket_types(&self, ids: &[Uuid]) -> CoreResult<Vec<TicketType>>;

    /// Ordered by `sort_order`, then creation time.
    async fn list_ticket_types(&self, event_id: Uuid) -> CoreResult<Vec<TicketType>>;

    /// Admin edit. Only applies while the stored `sold` still equals
    /// `expected_sold`; otherwise fails with `InventoryRace`.
    async fn update_ticket_type(&self, ticket_type: &TicketType, expected_sold: i32) -> CoreResult<()>;

    /// Refused with a validation error while purchases reference the type.
    async fn delete_ticket_type(&self, id: Uuid) -> CoreResult<()>;
}

/// Transactional writer and order storage
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Apply a write plan as one unit: conditional inventory decrements,
    /// then the order, purchase and ticket rows. Any failure leaves no trace.
    async fn commit(&self, plan: &WritePlan) -> CoreResult<CommittedOrder>;

    /// Purchase lines come back in request order.
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<CommittedOrder>>;

    /// Purchase lines matching the filter, newest first. The filter is
    /// expected to be validated already.
    async fn list_purchases(&self, filter: &PurchaseFilter) -> CoreResult<PurchasePage>;

    /// Conditional on the stored status still being `expected`; otherwise
    /// fails with `StaleOrder`.
    async fn update_order_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        change: &OrderStatusChange,
    ) -> CoreResult<Order>;

    /// Delete every ticketing row of an event in one transaction.
    async fn purge_event(&self, event_id: Uuid) -> CoreResult<PurgeSummary>;
}

/// Issued ticket storage
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_qr_code(&self, event_id: Uuid, qr_code: &str) -> CoreResult<Option<Ticket>>;

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>>;

    /// Single conditional write (`is_used = false`). Returns `false` when the
    /// ticket was already used, leaving the first scan untouched.
    async fn mark_used(&self, ticket_id: Uuid, used_at: DateTime<Utc>, scanned_by: Uuid) -> CoreResult<bool>;

    async fn list_tickets_for_user(&self, user_id: Uuid, event_id: Option<Uuid>) -> CoreResult<Vec<Ticket>>;

    /// Rewrite the attendee of an unused, transferable ticket owned by
    /// `owner_id`. Returns `false` when any of those conditions fails.
    async fn reassign_attendee(
        &self,
        ticket_id: Uuid,
        owner_id: Uuid,
        attendee_name: &str,
        attendee_email: &str,
    ) -> CoreResult<bool>;
}
