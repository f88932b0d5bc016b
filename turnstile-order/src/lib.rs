pub mod allocation;
pub mod checkout;
pub mod deadline;
pub mod holders;
pub mod manager;
pub mod scan;
pub mod ticket_types;

#[cfg(test)]
mod test_support;

pub use allocation::{AllocationEngine, PurchaseLine, PurchaseRequest};
pub use checkout::CheckoutService;
pub use holders::TicketHolderService;
pub use manager::OrderService;
pub use scan::ScanService;
pub use ticket_types::TicketTypeService;
