use std::sync::Arc;
use std::time::Duration;

use turnstile_core::repository::{EventDirectory, OrderRepository, TicketRepository, TicketTypeRepository};
use turnstile_order::{CheckoutService, OrderService, ScanService, TicketHolderService, TicketTypeService};
use turnstile_store::InMemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub events: Arc<dyn EventDirectory>,
    pub ticket_types: Arc<TicketTypeService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub scans: Arc<ScanService>,
    pub holders: Arc<TicketHolderService>,
    /// Bound on lookups the handlers make directly.
    pub timeout: Duration,
}

impl AppState {
    pub fn new(
        events: Arc<dyn EventDirectory>,
        ticket_types: Arc<dyn TicketTypeRepository>,
        orders: Arc<dyn OrderRepository>,
        tickets: Arc<dyn TicketRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            ticket_types: Arc::new(TicketTypeService::new(events.clone(), ticket_types.clone(), timeout)),
            checkout: Arc::new(CheckoutService::new(events.clone(), ticket_types, orders.clone(), timeout)),
            orders: Arc::new(OrderService::new(orders, timeout)),
            scans: Arc::new(ScanService::new(tickets.clone(), timeout)),
            holders: Arc::new(TicketHolderService::new(tickets, timeout)),
            events,
            timeout,
        }
    }

    /// State backed entirely by one in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>, timeout: Duration) -> Self {
        Self::new(store.clone(), store.clone(), store.clone(), store, timeout)
    }
}
