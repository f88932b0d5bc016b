use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use turnstile_core::repository::{EventDirectory, OrderRepository, TicketTypeRepository};
use turnstile_core::{CommittedOrder, CoreResult, ErrorKind, TicketingError, WritePlan};
use uuid::Uuid;

use crate::allocation::{AllocationEngine, PurchaseRequest};
use crate::deadline::bounded;

/// Purchase pipeline: snapshot read, allocation, atomic commit.
///
/// A race lost at commit time is reported as `InventoryRace` and not retried
/// here; the caller decides whether to re-run the purchase with fresh data.
pub struct CheckoutService {
    events: Arc<dyn EventDirectory>,
    ticket_types: Arc<dyn TicketTypeRepository>,
    orders: Arc<dyn OrderRepository>,
    timeout: Duration,
}

impl CheckoutService {
    pub fn new(
        events: Arc<dyn EventDirectory>,
        ticket_types: Arc<dyn TicketTypeRepository>,
        orders: Arc<dyn OrderRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            events,
            ticket_types,
            orders,
            timeout,
        }
    }

    pub async fn purchase(&self, request: PurchaseRequest) -> CoreResult<CommittedOrder> {
        let plan = self.plan(&request).await?;
        self.commit(&plan).await
    }

    /// Read a snapshot and allocate against it without writing anything.
    pub async fn plan(&self, request: &PurchaseRequest) -> CoreResult<WritePlan> {
        bounded("event lookup", self.timeout, self.events.get_event(request.event_id))
            .await?
            .ok_or(TicketingError::EventNotFound(request.event_id))?;

        let mut ids: Vec<Uuid> = request.lines.iter().map(|l| l.ticket_type_id).collect();
        ids.sort();
        ids.dedup();
        let snapshot = bounded("inventory snapshot", self.timeout, self.ticket_types.get_ticket_types(&ids)).await?;

        AllocationEngine::allocate(request, &snapshot, Utc::now()).inspect_err(|err| {
            tracing::info!(
                event_id = %request.event_id,
                user_id = %request.user_id,
                kind = ?err.kind(),
                "Purchase rejected: {}", err
            );
        })
    }

    /// Hand a plan to the transactional writer.
    pub async fn commit(&self, plan: &WritePlan) -> CoreResult<CommittedOrder> {
        match bounded("checkout commit", self.timeout, self.orders.commit(plan)).await {
            Ok(committed) => {
                tracing::info!(
                    order_id = %committed.order.id,
                    order_number = %committed.order.order_number,
                    event_id = %committed.order.event_id,
                    tickets = committed.tickets.len(),
                    total = %committed.order.total_amount,
                    currency = %committed.order.currency,
                    "Order committed"
                );
                Ok(committed)
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::Race => tracing::warn!(event_id = %plan.order().event_id, "Checkout lost inventory race: {}", err),
                    ErrorKind::Internal => tracing::error!(event_id = %plan.order().event_id, "Checkout commit failed: {}", err),
                    _ => tracing::info!(event_id = %plan.order().event_id, "Checkout commit rejected: {}", err),
                }
                Err(err)
            }
        }
    }
}
