pub mod error;
pub mod records;
pub mod plan;
pub mod identifiers;
pub mod repository;

pub use error::{CoreResult, ErrorKind, TicketingError};
pub use identifiers::{CodeGenerator, SecureCodeGenerator};
pub use plan::{InventoryDelta, PlannedOrder, PlannedPurchase, PlannedTicket, WritePlan};
pub use records::{
    Attendee, BillingAddress, BillingInfo, CommittedOrder, EventSummary, Order, OrderStatus,
    OrderStatusChange, PurchaseFilter, PurchasePage, PurgeSummary, Ticket, TicketPurchase,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
