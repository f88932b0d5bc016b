use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use turnstile_catalog::{Availability, NewTicketType, TicketType, TicketTypeUpdate};
use turnstile_core::repository::{EventDirectory, TicketTypeRepository};
use turnstile_core::{CoreResult, EventSummary, TicketingError};
use uuid::Uuid;

use crate::deadline::bounded;

/// Catalog administration and availability reads
pub struct TicketTypeService {
    events: Arc<dyn EventDirectory>,
    ticket_types: Arc<dyn TicketTypeRepository>,
    timeout: Duration,
}

impl TicketTypeService {
    pub fn new(events: Arc<dyn EventDirectory>, ticket_types: Arc<dyn TicketTypeRepository>, timeout: Duration) -> Self {
        Self {
            events,
            ticket_types,
            timeout,
        }
    }

    pub async fn create(&self, event_id: Uuid, def: NewTicketType) -> CoreResult<TicketType> {
        let event = self.event(event_id).await?;
        let ticket_type = TicketType::from_definition(event_id, def, Utc::now())?;

        let existing = self.list(event_id).await?;
        check_event_capacity(&event, existing.iter().filter_map(|t| t.quantity), ticket_type.quantity)?;

        bounded("ticket type insert", self.timeout, self.ticket_types.insert_ticket_type(&ticket_type)).await?;
        tracing::info!(
            ticket_type_id = %ticket_type.id,
            event_id = %event_id,
            quantity = ?ticket_type.quantity,
            price = %ticket_type.price,
            "Ticket type created"
        );
        Ok(ticket_type)
    }

    pub async fn list(&self, event_id: Uuid) -> CoreResult<Vec<TicketType>> {
        bounded("ticket type listing", self.timeout, self.ticket_types.list_ticket_types(event_id)).await
    }

    pub async fn get(&self, id: Uuid) -> CoreResult<TicketType> {
        bounded("ticket type lookup", self.timeout, self.ticket_types.get_ticket_type(id))
            .await?
            .ok_or(TicketingError::TicketTypeNotFound(id))
    }

    /// Remaining seats, price and sale window as of now.
    pub async fn get_available(&self, event_id: Uuid, id: Uuid) -> CoreResult<Availability> {
        let ticket_type = self.get(id).await?;
        Ok(Availability::of(&ticket_type, event_id)?)
    }

    /// Apply an admin edit. The edit is conditional on `sold` not having
    /// moved since it was read, so it never overwrites a concurrent sale.
    pub async fn update(&self, id: Uuid, update: TicketTypeUpdate) -> CoreResult<TicketType> {
        let current = self.get(id).await?;
        let next = current.with_update(update, Utc::now())?;

        if next.quantity != current.quantity {
            let event = self.event(current.event_id).await?;
            let others = self.list(current.event_id).await?;
            check_event_capacity(
                &event,
                others.iter().filter(|t| t.id != id).filter_map(|t| t.quantity),
                next.quantity,
            )?;
        }

        bounded(
            "ticket type update",
            self.timeout,
            self.ticket_types.update_ticket_type(&next, current.sold),
        )
        .await?;
        tracing::info!(ticket_type_id = %id, status = next.status.as_str(), "Ticket type updated");
        Ok(next)
    }

    pub async fn delete(&self, id: Uuid) -> CoreResult<()> {
        bounded("ticket type delete", self.timeout, self.ticket_types.delete_ticket_type(id)).await?;
        tracing::info!(ticket_type_id = %id, "Ticket type deleted");
        Ok(())
    }

    async fn event(&self, event_id: Uuid) -> CoreResult<EventSummary> {
        bounded("event lookup", self.timeout, self.events.get_event(event_id))
            .await?
            .ok_or(TicketingError::EventNotFound(event_id))
    }
}

/// Bounded ticket types of one event may not promise more seats than the
/// venue holds.
fn check_event_capacity(
    event: &EventSummary,
    others: impl Iterator<Item = i32>,
    candidate: Option<i32>,
) -> CoreResult<()> {
    let (Some(capacity), Some(candidate)) = (event.capacity, candidate) else {
        return Ok(());
    };
    let promised: i64 = others.map(i64::from).sum::<i64>() + i64::from(candidate);
    if promised > i64::from(capacity) {
        return Err(TicketingError::Validation(format!(
            "Ticket quantities ({}) exceed event capacity ({})",
            promised, capacity
        )));
    }
    Ok(())
}
