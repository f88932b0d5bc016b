use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use turnstile_catalog::{TicketType, TicketTypeStatus};
use turnstile_core::repository::{EventDirectory, OrderRepository, TicketRepository, TicketTypeRepository};
use turnstile_core::{
    CodeGenerator, CommittedOrder, CoreResult, EventSummary, Order, OrderStatus, OrderStatusChange, PurchaseFilter,
    PurchasePage, PurgeSummary, SecureCodeGenerator, Ticket, TicketPurchase, TicketingError, WritePlan,
};
use turnstile_shared::Masked;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, EventSummary>,
    ticket_types: HashMap<Uuid, TicketType>,
    orders: HashMap<Uuid, Order>,
    purchases: HashMap<Uuid, TicketPurchase>,
    tickets: HashMap<Uuid, Ticket>,
}

impl Tables {
    fn committed(&self, order: &Order) -> CommittedOrder {
        let mut purchases: Vec<TicketPurchase> = self
            .purchases
            .values()
            .filter(|p| p.order_id == order.id)
            .cloned()
            .collect();
        purchases.sort_by_key(|p| p.line_index);

        let mut tickets: Vec<Ticket> = self.tickets.values().filter(|t| t.order_id == order.id).cloned().collect();
        tickets.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));

        CommittedOrder {
            order: order.clone(),
            purchases,
            tickets,
        }
    }
}

/// Process-local backend implementing every repository trait.
///
/// One async mutex guards all tables, so each operation is serialized. A
/// commit stages its changes against the locked state and only applies them
/// once every inventory check has passed; a failed or cancelled commit
/// leaves nothing behind.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    codes: Arc<dyn CodeGenerator>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_codes(Arc::new(SecureCodeGenerator))
    }

    pub fn with_codes(codes: Arc<dyn CodeGenerator>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            codes,
        }
    }

    /// Events are owned elsewhere; this stands in for that directory.
    pub async fn register_event(&self, event: EventSummary) {
        self.tables.lock().await.events.insert(event.id, event);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventDirectory for InMemoryStore {
    async fn get_event(&self, id: Uuid) -> CoreResult<Option<EventSummary>> {
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }
}

#[async_trait]
impl TicketTypeRepository for InMemoryStore {
    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        if !tables.events.contains_key(&ticket_type.event_id) {
            return Err(TicketingError::EventNotFound(ticket_type.event_id));
        }
        if tables.ticket_types.contains_key(&ticket_type.id) {
            return Err(TicketingError::Internal(format!("duplicate ticket type id {}", ticket_type.id)));
        }
        tables.ticket_types.insert(ticket_type.id, ticket_type.clone());
        Ok(())
    }

    async fn get_ticket_type(&self, id: Uuid) -> CoreResult<Option<TicketType>> {
        Ok(self.tables.lock().await.ticket_types.get(&id).cloned())
    }

    async fn get_ticket_types(&self, ids: &[Uuid]) -> CoreResult<Vec<TicketType>> {
        let tables = self.tables.lock().await;
        Ok(ids.iter().filter_map(|id| tables.ticket_types.get(id).cloned()).collect())
    }

    async fn list_ticket_types(&self, event_id: Uuid) -> CoreResult<Vec<TicketType>> {
        let tables = self.tables.lock().await;
        let mut types: Vec<TicketType> = tables
            .ticket_types
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        types.sort_by_key(|t| (t.sort_order, t.created_at));
        Ok(types)
    }

    async fn update_ticket_type(&self, ticket_type: &TicketType, expected_sold: i32) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .ticket_types
            .get_mut(&ticket_type.id)
            .ok_or(TicketingError::TicketTypeNotFound(ticket_type.id))?;
        if stored.sold != expected_sold {
            return Err(TicketingError::InventoryRace {
                ticket_type_id: ticket_type.id,
            });
        }

        let sold = stored.sold;
        let created_at = stored.created_at;
        *stored = TicketType {
            sold,
            created_at,
            ..ticket_type.clone()
        };
        Ok(())
    }

    async fn delete_ticket_type(&self, id: Uuid) -> CoreResult<()> {
        let mut tables = self.tables.lock().await;
        if !tables.ticket_types.contains_key(&id) {
            return Err(TicketingError::TicketTypeNotFound(id));
        }
        if tables.purchases.values().any(|p| p.ticket_type_id == id) {
            return Err(TicketingError::Validation(
                "Ticket type has purchases and cannot be deleted".to_string(),
            ));
        }
        tables.ticket_types.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn commit(&self, plan: &WritePlan) -> CoreResult<CommittedOrder> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        // Stage the conditional decrements first.
        let mut staged: Vec<TicketType> = Vec::with_capacity(plan.inventory().len());
        for delta in plan.inventory() {
            let race = TicketingError::InventoryRace {
                ticket_type_id: delta.ticket_type_id,
            };
            let Some(current) = tables.ticket_types.get(&delta.ticket_type_id) else {
                return Err(race);
            };
            if current.status != TicketTypeStatus::Active {
                return Err(race);
            }
            let sold = current.sold + delta.quantity;
            if matches!(current.quantity, Some(cap) if sold > cap) {
                return Err(race);
            }

            let mut next = current.clone();
            next.sold = sold;
            next.status = TicketType::derive_status(next.quantity, sold, next.status);
            next.updated_at = now;
            staged.push(next);
        }

        let committed = plan.materialize(self.codes.as_ref(), now);

        let taken: HashSet<&str> = tables
            .tickets
            .values()
            .flat_map(|t| [t.ticket_number.as_str(), t.qr_code.as_str()])
            .chain(tables.orders.values().map(|o| o.order_number.as_str()))
            .collect();
        let collides = taken.contains(committed.order.order_number.as_str())
            || committed
                .tickets
                .iter()
                .any(|t| taken.contains(t.ticket_number.as_str()) || taken.contains(t.qr_code.as_str()));
        if collides {
            tracing::error!(order_number = %committed.order.order_number, "Generated identifier collided with an existing one");
            return Err(TicketingError::Internal("identifier collision".to_string()));
        }

        for ticket_type in staged {
            tables.ticket_types.insert(ticket_type.id, ticket_type);
        }
        tables.orders.insert(committed.order.id, committed.order.clone());
        for purchase in &committed.purchases {
            tables.purchases.insert(purchase.id, purchase.clone());
        }
        for ticket in &committed.tickets {
            tables.tickets.insert(ticket.id, ticket.clone());
        }

        Ok(committed)
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<CommittedOrder>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.get(&id).map(|order| tables.committed(order)))
    }

    async fn list_purchases(&self, filter: &PurchaseFilter) -> CoreResult<PurchasePage> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<&TicketPurchase> = tables.purchases.values().filter(|p| filter.matches(p)).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.order_id.cmp(&b.order_id))
                .then(a.line_index.cmp(&b.line_index))
        });

        let total = matching.len() as u64;
        let purchases = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok(PurchasePage::new(purchases, total, filter))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        change: &OrderStatusChange,
    ) -> CoreResult<Order> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        let order = tables.orders.get_mut(&id).ok_or(TicketingError::OrderNotFound(id))?;
        if order.status != expected {
            return Err(TicketingError::StaleOrder(id));
        }
        order.status = change.status;
        if change.payment_intent_id.is_some() {
            order.payment_intent_id = change.payment_intent_id.clone();
        }
        if change.payment_method.is_some() {
            order.payment_method = change.payment_method.clone();
        }
        if change.refund_amount.is_some() {
            order.refund_amount = change.refund_amount;
        }
        order.updated_at = now;
        let updated = order.clone();

        for purchase in tables.purchases.values_mut().filter(|p| p.order_id == id) {
            purchase.status = change.status;
            if change.refund_reason.is_some() {
                purchase.refund_reason = change.refund_reason.clone();
            }
            purchase.updated_at = now;
        }
        Ok(updated)
    }

    async fn purge_event(&self, event_id: Uuid) -> CoreResult<PurgeSummary> {
        let mut tables = self.tables.lock().await;

        fn drain<T>(map: &mut HashMap<Uuid, T>, keep: impl Fn(&T) -> bool) -> u64 {
            let before = map.len();
            map.retain(|_, v| keep(v));
            (before - map.len()) as u64
        }

        Ok(PurgeSummary {
            tickets: drain(&mut tables.tickets, |t| t.event_id != event_id),
            purchases: drain(&mut tables.purchases, |p| p.event_id != event_id),
            orders: drain(&mut tables.orders, |o| o.event_id != event_id),
            ticket_types: drain(&mut tables.ticket_types, |t| t.event_id != event_id),
        })
    }
}

#[async_trait]
impl TicketRepository for InMemoryStore {
    async fn find_by_qr_code(&self, event_id: Uuid, qr_code: &str) -> CoreResult<Option<Ticket>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .values()
            .find(|t| t.event_id == event_id && t.qr_code == qr_code)
            .cloned())
    }

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
        Ok(self.tables.lock().await.tickets.get(&id).cloned())
    }

    async fn mark_used(&self, ticket_id: Uuid, used_at: DateTime<Utc>, scanned_by: Uuid) -> CoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let ticket = tables.tickets.get_mut(&ticket_id).ok_or(TicketingError::TicketNotFound)?;
        Ok(ticket.mark_used(used_at, scanned_by).is_ok())
    }

    async fn list_tickets_for_user(&self, user_id: Uuid, event_id: Option<Uuid>) -> CoreResult<Vec<Ticket>> {
        let tables = self.tables.lock().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.user_id == user_id && event_id.map_or(true, |e| t.event_id == e))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| (a.created_at, &a.ticket_number).cmp(&(b.created_at, &b.ticket_number)));
        Ok(tickets)
    }

    async fn reassign_attendee(
        &self,
        ticket_id: Uuid,
        owner_id: Uuid,
        attendee_name: &str,
        attendee_email: &str,
    ) -> CoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(ticket) = tables.tickets.get_mut(&ticket_id) else {
            return Ok(false);
        };
        if ticket.user_id != owner_id || ticket.is_used || !ticket.is_transferable {
            return Ok(false);
        }
        ticket.attendee_name = attendee_name.to_string();
        ticket.attendee_email = Masked::new(attendee_email.to_string());
        ticket.updated_at = Utc::now();
        Ok(true)
    }
}
