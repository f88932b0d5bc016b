use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use turnstile_shared::{money, Currency, Masked};
use uuid::Uuid;

use crate::identifiers::CodeGenerator;
use crate::records::{Attendee, BillingInfo, CommittedOrder, Order, OrderStatus, Ticket, TicketPurchase};
use crate::TicketingError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlannedOrder {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub billing: BillingInfo,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlannedPurchase {
    pub ticket_type_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub currency: Currency,
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlannedTicket {
    /// Index into the plan's purchases.
    pub purchase_index: usize,
    pub ticket_type_id: Uuid,
    pub attendee: Attendee,
    pub is_transferable: bool,
}

/// Seats to take from one ticket type
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct InventoryDelta {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}

/// Everything a checkout will write, computed before any write happens.
/// Identifiers are not assigned yet; the writer does that when it
/// materializes the rows inside its transaction.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WritePlan {
    order: PlannedOrder,
    purchases: Vec<PlannedPurchase>,
    tickets: Vec<PlannedTicket>,
    inventory: Vec<InventoryDelta>,
}

impl WritePlan {
    /// Assemble a plan. Inventory deltas are merged per ticket type and
    /// sorted by id so every writer takes row locks in the same order.
    pub fn new(
        order: PlannedOrder,
        purchases: Vec<PlannedPurchase>,
        tickets: Vec<PlannedTicket>,
        inventory: Vec<InventoryDelta>,
    ) -> Result<Self, TicketingError> {
        if purchases.is_empty() {
            return Err(TicketingError::Validation("A purchase needs at least one line".to_string()));
        }
        money::check_storable(order.total_amount).map_err(|e| TicketingError::Validation(e.to_string()))?;
        if let Some(ticket) = tickets.iter().find(|t| t.purchase_index >= purchases.len()) {
            return Err(TicketingError::Internal(format!(
                "planned ticket for {} points at missing purchase line {}",
                ticket.ticket_type_id, ticket.purchase_index
            )));
        }

        let mut merged: Vec<InventoryDelta> = Vec::with_capacity(inventory.len());
        for delta in inventory {
            match merged.iter_mut().find(|d| d.ticket_type_id == delta.ticket_type_id) {
                Some(existing) => existing.quantity += delta.quantity,
                None => merged.push(delta),
            }
        }
        merged.sort_by_key(|d| d.ticket_type_id);

        Ok(Self {
            order,
            purchases,
            tickets,
            inventory: merged,
        })
    }

    pub fn order(&self) -> &PlannedOrder {
        &self.order
    }

    pub fn purchases(&self) -> &[PlannedPurchase] {
        &self.purchases
    }

    pub fn tickets(&self) -> &[PlannedTicket] {
        &self.tickets
    }

    pub fn inventory(&self) -> &[InventoryDelta] {
        &self.inventory
    }

    /// Turn the plan into concrete rows with fresh ids, numbers and QR codes.
    pub fn materialize(&self, codes: &dyn CodeGenerator, now: DateTime<Utc>) -> CommittedOrder {
        let order_id = Uuid::new_v4();
        let planned = &self.order;

        let order = Order {
            id: order_id,
            order_number: codes.order_number(),
            event_id: planned.event_id,
            user_id: planned.user_id,
            total_amount: planned.total_amount,
            currency: planned.currency.clone(),
            status: OrderStatus::Pending,
            payment_intent_id: planned.billing.payment_intent_id.clone(),
            payment_method: planned.billing.payment_method.clone(),
            billing_name: planned.billing.name.clone(),
            billing_email: planned.billing.email.clone(),
            billing_address: planned.billing.address.clone(),
            refund_amount: None,
            created_at: now,
            updated_at: now,
        };

        let purchases: Vec<TicketPurchase> = self
            .purchases
            .iter()
            .enumerate()
            .map(|(index, line)| TicketPurchase {
                id: Uuid::new_v4(),
                order_id,
                ticket_type_id: line.ticket_type_id,
                event_id: planned.event_id,
                user_id: planned.user_id,
                line_index: index as i32,
                quantity: line.quantity as i32,
                unit_price: line.unit_price,
                total_price: line.total_price,
                currency: line.currency.clone(),
                status: OrderStatus::Pending,
                attendees: line.attendees.clone(),
                is_used: false,
                refund_reason: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let tickets = self
            .tickets
            .iter()
            .map(|planned_ticket| Ticket {
                id: Uuid::new_v4(),
                order_id,
                ticket_purchase_id: purchases[planned_ticket.purchase_index].id,
                ticket_type_id: planned_ticket.ticket_type_id,
                event_id: planned.event_id,
                user_id: planned.user_id,
                ticket_number: codes.ticket_number(),
                qr_code: codes.qr_code(),
                attendee_name: planned_ticket.attendee.name.clone(),
                attendee_email: Masked::new(planned_ticket.attendee.email.expose().clone()),
                is_transferable: planned_ticket.is_transferable,
                is_used: false,
                used_at: None,
                scanned_by: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        CommittedOrder {
            order,
            purchases,
            tickets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::SecureCodeGenerator;
    use std::collections::HashSet;

    fn eur() -> Currency {
        Currency::parse("EUR").unwrap()
    }

    fn attendee(name: &str) -> Attendee {
        Attendee {
            name: name.to_string(),
            email: Masked::new(format!("{}@example.com", name.to_lowercase())),
            phone: None,
        }
    }

    fn plan(type_a: Uuid, type_b: Uuid) -> WritePlan {
        let order = PlannedOrder {
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            total_amount: "25.00".parse().unwrap(),
            currency: eur(),
            billing: BillingInfo {
                name: "Ada".to_string(),
                email: Masked::new("ada@example.com".to_string()),
                address: None,
                payment_intent_id: Some("pi_123".to_string()),
                payment_method: None,
            },
        };
        let purchases = vec![
            PlannedPurchase {
                ticket_type_id: type_a,
                quantity: 2,
                unit_price: "10.00".parse().unwrap(),
                total_price: "20.00".parse().unwrap(),
                currency: eur(),
                attendees: vec![attendee("Ada"), attendee("Bob")],
            },
            PlannedPurchase {
                ticket_type_id: type_b,
                quantity: 1,
                unit_price: "5.00".parse().unwrap(),
                total_price: "5.00".parse().unwrap(),
                currency: eur(),
                attendees: vec![attendee("Cy")],
            },
        ];
        let tickets = vec![
            PlannedTicket { purchase_index: 0, ticket_type_id: type_a, attendee: attendee("Ada"), is_transferable: true },
            PlannedTicket { purchase_index: 0, ticket_type_id: type_a, attendee: attendee("Bob"), is_transferable: true },
            PlannedTicket { purchase_index: 1, ticket_type_id: type_b, attendee: attendee("Cy"), is_transferable: true },
        ];
        let inventory = vec![
            InventoryDelta { ticket_type_id: type_b, quantity: 1 },
            InventoryDelta { ticket_type_id: type_a, quantity: 2 },
        ];
        WritePlan::new(order, purchases, tickets, inventory).unwrap()
    }

    #[test]
    fn test_inventory_deltas_are_sorted() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let plan = plan(a, b);
        let ids: Vec<Uuid> = plan.inventory().iter().map(|d| d.ticket_type_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_duplicate_deltas_are_merged() {
        let a = Uuid::new_v4();
        let plan = plan(a, a);
        assert_eq!(plan.inventory(), &[InventoryDelta { ticket_type_id: a, quantity: 3 }]);
    }

    #[test]
    fn test_materialize_links_tickets_to_purchases() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let committed = plan(a, b).materialize(&SecureCodeGenerator, Utc::now());

        assert_eq!(committed.order.status, OrderStatus::Pending);
        assert_eq!(committed.order.payment_intent_id.as_deref(), Some("pi_123"));
        assert!(committed.order.order_number.starts_with("ORD-"));
        assert_eq!(committed.purchases.len(), 2);
        assert_eq!(committed.tickets.len(), 3);

        let first_line = committed.purchases[0].id;
        let second_line = committed.purchases[1].id;
        assert_eq!(committed.tickets[0].ticket_purchase_id, first_line);
        assert_eq!(committed.tickets[1].ticket_purchase_id, first_line);
        assert_eq!(committed.tickets[2].ticket_purchase_id, second_line);
        assert_eq!(committed.purchases[0].line_index, 0);
        assert_eq!(committed.purchases[1].line_index, 1);
        assert!(committed.tickets.iter().all(|t| t.order_id == committed.order.id && !t.is_used));

        let codes: HashSet<&str> = committed.tickets.iter().map(|t| t.qr_code.as_str()).collect();
        assert_eq!(codes.len(), 3);
    }

    #[test]
    fn test_unstorable_total_is_rejected() {
        let mut order = plan(Uuid::new_v4(), Uuid::new_v4()).order().clone();
        order.total_amount = "100000000.00".parse().unwrap();
        let source = plan(Uuid::new_v4(), Uuid::new_v4());
        let err = WritePlan::new(
            order,
            source.purchases().to_vec(),
            source.tickets().to_vec(),
            source.inventory().to_vec(),
        )
        .unwrap_err();
        assert!(matches!(err, TicketingError::Validation(_)));
    }

    #[test]
    fn test_empty_plan_is_rejected() {
        let order = plan(Uuid::new_v4(), Uuid::new_v4()).order().clone();
        let err = WritePlan::new(order, vec![], vec![], vec![]).unwrap_err();
        assert!(matches!(err, TicketingError::Validation(_)));
    }
}
