use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use turnstile_shared::{Currency, Masked};
use uuid::Uuid;

use crate::error::{CoreResult, TicketingError};

/// Order status. Transitions after creation are driven by payment events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "completed" => Some(OrderStatus::Completed),
            "failed" => Some(OrderStatus::Failed),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Completed, OrderStatus::Refunded)
        )
    }
}

/// Person admitted by one ticket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attendee {
    pub name: String,
    pub email: Masked<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingInfo {
    pub name: String,
    pub email: Masked<String>,
    #[serde(default)]
    pub address: Option<BillingAddress>,
    /// Opaque reference handed out by the payment provider.
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// One checkout for one user against one event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub status: OrderStatus,
    pub payment_intent_id: Option<String>,
    pub payment_method: Option<String>,
    pub billing_name: String,
    pub billing_email: Masked<String>,
    pub billing_address: Option<BillingAddress>,
    pub refund_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line item: a ticket type and quantity within an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketPurchase {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ticket_type_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    /// Position of the line in the request that created the order.
    pub line_index: i32,
    pub quantity: i32,
    /// Price at purchase time; later price edits do not touch it.
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub currency: Currency,
    pub status: OrderStatus,
    pub attendees: Vec<Attendee>,
    pub is_used: bool,
    #[serde(default)]
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single admission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ticket_purchase_id: Uuid,
    pub ticket_type_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_number: String,
    pub qr_code: String,
    pub attendee_name: String,
    pub attendee_email: Masked<String>,
    pub is_transferable: bool,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub scanned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Flip `is_used` once. A second call reports the first scan.
    pub fn mark_used(&mut self, at: DateTime<Utc>, scanned_by: Uuid) -> CoreResult<()> {
        if self.is_used {
            return Err(self.already_used());
        }
        self.is_used = true;
        self.used_at = Some(at);
        self.scanned_by = Some(scanned_by);
        self.updated_at = at;
        Ok(())
    }

    pub fn already_used(&self) -> TicketingError {
        TicketingError::AlreadyUsed {
            ticket_id: self.id,
            used_at: self.used_at,
            scanned_by: self.scanned_by,
        }
    }
}

/// An order together with everything it owns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommittedOrder {
    pub order: Order,
    pub purchases: Vec<TicketPurchase>,
    pub tickets: Vec<Ticket>,
}

/// Externally driven order status change (payment confirmation, refund)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusChange {
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    /// Copied onto every purchase line of a refunded order.
    #[serde(default)]
    pub refund_reason: Option<String>,
}

/// Default page size for purchase listings
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Largest page a purchase listing returns
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filter and paging for purchase listings. Every filter is optional;
/// the date bounds are inclusive and apply to `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseFilter {
    #[serde(default)]
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub limit: u32,
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PurchaseFilter {
    fn default() -> Self {
        Self {
            event_id: None,
            user_id: None,
            status: None,
            date_from: None,
            date_to: None,
            page: first_page(),
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PurchaseFilter {
    pub fn validate(&self) -> CoreResult<()> {
        if self.page < 1 {
            return Err(TicketingError::Validation("Page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(TicketingError::Validation(format!(
                "Limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(TicketingError::Validation("date_from must not be after date_to".to_string()));
            }
        }
        Ok(())
    }

    /// Rows to skip before this page starts.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn matches(&self, purchase: &TicketPurchase) -> bool {
        self.event_id.map_or(true, |id| purchase.event_id == id)
            && self.user_id.map_or(true, |id| purchase.user_id == id)
            && self.status.map_or(true, |status| purchase.status == status)
            && self.date_from.map_or(true, |from| purchase.created_at >= from)
            && self.date_to.map_or(true, |to| purchase.created_at <= to)
    }
}

/// One page of purchase lines, newest first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchasePage {
    pub purchases: Vec<TicketPurchase>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u64,
}

impl PurchasePage {
    pub fn new(purchases: Vec<TicketPurchase>, total: u64, filter: &PurchaseFilter) -> Self {
        Self {
            purchases,
            total,
            page: filter.page,
            total_pages: total.div_ceil(u64::from(filter.limit.max(1))),
        }
    }
}

/// Read-only view of an event owned by the surrounding platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSummary {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub capacity: Option<i32>,
}

/// Row counts removed by an event cleanup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PurgeSummary {
    pub ticket_types: u64,
    pub orders: u64,
    pub purchases: u64,
    pub tickets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            ticket_purchase_id: Uuid::new_v4(),
            ticket_type_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticket_number: "TKT-TEST".to_string(),
            qr_code: "QR".to_string(),
            attendee_name: "Ada".to_string(),
            attendee_email: Masked::new("ada@example.com".to_string()),
            is_transferable: true,
            is_used: false,
            used_at: None,
            scanned_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_status_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(OrderStatus::Completed.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_order_status_round_trips_through_str() {
        for status in [OrderStatus::Pending, OrderStatus::Completed, OrderStatus::Failed, OrderStatus::Refunded] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("paid"), None);
    }

    #[test]
    fn test_mark_used_is_one_shot() {
        let mut ticket = ticket();
        let first_scanner = Uuid::new_v4();
        let at = Utc::now();
        ticket.mark_used(at, first_scanner).unwrap();

        let err = ticket.mark_used(Utc::now(), Uuid::new_v4()).unwrap_err();
        match err {
            TicketingError::AlreadyUsed { used_at, scanned_by, .. } => {
                assert_eq!(used_at, Some(at));
                assert_eq!(scanned_by, Some(first_scanner));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ticket.scanned_by, Some(first_scanner));
    }

    #[test]
    fn test_attendee_email_is_masked_in_debug() {
        let attendee = Attendee {
            name: "Ada".to_string(),
            email: Masked::new("ada@example.com".to_string()),
            phone: None,
        };
        assert!(!format!("{:?}", attendee).contains("ada@example.com"));
        let json = serde_json::to_value(&attendee).unwrap();
        assert_eq!(json["email"], "ada@example.com");
    }

    #[test]
    fn test_purchase_filter_bounds() {
        assert!(PurchaseFilter::default().validate().is_ok());
        let zero_page = PurchaseFilter { page: 0, ..Default::default() };
        assert!(matches!(zero_page.validate(), Err(TicketingError::Validation(_))));
        let huge = PurchaseFilter { limit: MAX_PAGE_SIZE + 1, ..Default::default() };
        assert!(matches!(huge.validate(), Err(TicketingError::Validation(_))));
        let empty = PurchaseFilter { limit: 0, ..Default::default() };
        assert!(matches!(empty.validate(), Err(TicketingError::Validation(_))));
        let third = PurchaseFilter { page: 3, limit: 20, ..Default::default() };
        assert_eq!(third.offset(), 40);
    }

    #[test]
    fn test_purchase_page_counts_pages() {
        let filter = PurchaseFilter { limit: 10, ..Default::default() };
        assert_eq!(PurchasePage::new(vec![], 0, &filter).total_pages, 0);
        assert_eq!(PurchasePage::new(vec![], 10, &filter).total_pages, 1);
        assert_eq!(PurchasePage::new(vec![], 11, &filter).total_pages, 2);
    }
}
