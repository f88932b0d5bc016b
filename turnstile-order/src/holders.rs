use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use turnstile_core::repository::TicketRepository;
use turnstile_core::{CoreResult, Ticket, TicketingError};
use turnstile_shared::pii::{looks_like_email, mask_email};
use turnstile_shared::Masked;
use uuid::Uuid;

use crate::deadline::bounded;

/// New attendee for a transferred ticket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRequest {
    pub attendee_name: String,
    pub attendee_email: Masked<String>,
}

/// What ticket holders can do with their own tickets
pub struct TicketHolderService {
    tickets: Arc<dyn TicketRepository>,
    timeout: Duration,
}

impl TicketHolderService {
    pub fn new(tickets: Arc<dyn TicketRepository>, timeout: Duration) -> Self {
        Self { tickets, timeout }
    }

    pub async fn list_for_user(&self, user_id: Uuid, event_id: Option<Uuid>) -> CoreResult<Vec<Ticket>> {
        bounded("ticket listing", self.timeout, self.tickets.list_tickets_for_user(user_id, event_id)).await
    }

    /// Reassign an unused, transferable ticket to another attendee. Tickets
    /// of other users are reported as missing.
    pub async fn transfer(&self, ticket_id: Uuid, owner_id: Uuid, request: TransferRequest) -> CoreResult<Ticket> {
        let name = request.attendee_name.trim();
        if name.is_empty() {
            return Err(TicketingError::Validation("Attendee name is required".to_string()));
        }
        let email = request.attendee_email.expose().trim();
        if !looks_like_email(email) {
            return Err(TicketingError::Validation("Attendee email is invalid".to_string()));
        }

        let ticket = self.owned_ticket(ticket_id, owner_id).await?;
        check_transferable(&ticket)?;

        let moved = bounded(
            "ticket transfer",
            self.timeout,
            self.tickets.reassign_attendee(ticket_id, owner_id, name, email),
        )
        .await?;

        let current = self.owned_ticket(ticket_id, owner_id).await?;
        if !moved {
            // Scanned between the read and the write.
            check_transferable(&current)?;
            return Err(TicketingError::Internal(format!("transfer of ticket {} was not applied", ticket_id)));
        }

        tracing::info!(
            ticket_id = %ticket_id,
            to = %mask_email(email),
            "Ticket transferred"
        );
        Ok(current)
    }

    async fn owned_ticket(&self, ticket_id: Uuid, owner_id: Uuid) -> CoreResult<Ticket> {
        bounded("ticket lookup", self.timeout, self.tickets.get_ticket(ticket_id))
            .await?
            .filter(|t| t.user_id == owner_id)
            .ok_or(TicketingError::TicketNotFound)
    }
}

fn check_transferable(ticket: &Ticket) -> CoreResult<()> {
    if ticket.is_used {
        return Err(ticket.already_used());
    }
    if !ticket.is_transferable {
        return Err(TicketingError::Validation("Ticket is not transferable".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{PurchaseLine, PurchaseRequest};
    use crate::checkout::CheckoutService;
    use crate::scan::ScanService;
    use crate::test_support::{attendees, billing, store_with_event, ticket_type};
    use turnstile_core::repository::TicketTypeRepository;
    use turnstile_core::{CommittedOrder, ErrorKind};
    use turnstile_store::memory::InMemoryStore;

    async fn order_with_tickets(quantity: u32) -> (Arc<InMemoryStore>, CommittedOrder) {
        let (store, event_id) = store_with_event().await;
        let tt = ticket_type(event_id, "12.00", None);
        store.insert_ticket_type(&tt).await.unwrap();
        let checkout = CheckoutService::new(store.clone(), store.clone(), store.clone(), Duration::from_secs(5));
        let committed = checkout
            .purchase(PurchaseRequest {
                event_id,
                user_id: Uuid::new_v4(),
                lines: vec![PurchaseLine {
                    ticket_type_id: tt.id,
                    quantity,
                    attendees: attendees(quantity),
                }],
                billing: billing(),
            })
            .await
            .unwrap();
        (store, committed)
    }

    fn transfer_to(name: &str, email: &str) -> TransferRequest {
        TransferRequest {
            attendee_name: name.to_string(),
            attendee_email: Masked::new(email.to_string()),
        }
    }

    #[tokio::test]
    async fn test_list_for_user_filters_by_event() {
        let (store, committed) = order_with_tickets(3).await;
        let holders = TicketHolderService::new(store, Duration::from_secs(5));
        let user = committed.order.user_id;

        assert_eq!(holders.list_for_user(user, None).await.unwrap().len(), 3);
        assert_eq!(
            holders.list_for_user(user, Some(committed.order.event_id)).await.unwrap().len(),
            3
        );
        assert!(holders.list_for_user(user, Some(Uuid::new_v4())).await.unwrap().is_empty());
        assert!(holders.list_for_user(Uuid::new_v4(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_rewrites_attendee() {
        let (store, committed) = order_with_tickets(1).await;
        let holders = TicketHolderService::new(store, Duration::from_secs(5));
        let ticket = &committed.tickets[0];

        let moved = holders
            .transfer(ticket.id, committed.order.user_id, transfer_to("Grace Hopper", "grace@example.com"))
            .await
            .unwrap();
        assert_eq!(moved.attendee_name, "Grace Hopper");
        assert_eq!(moved.attendee_email.expose(), "grace@example.com");
        assert_eq!(moved.qr_code, ticket.qr_code);
    }

    #[tokio::test]
    async fn test_transfer_requires_ownership() {
        let (store, committed) = order_with_tickets(1).await;
        let holders = TicketHolderService::new(store, Duration::from_secs(5));
        let err = holders
            .transfer(committed.tickets[0].id, Uuid::new_v4(), transfer_to("Eve", "eve@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_used_ticket_cannot_be_transferred() {
        let (store, committed) = order_with_tickets(1).await;
        let ticket = &committed.tickets[0];
        ScanService::new(store.clone(), Duration::from_secs(5))
            .scan(&ticket.qr_code, ticket.event_id, Uuid::new_v4())
            .await
            .unwrap();

        let holders = TicketHolderService::new(store, Duration::from_secs(5));
        let err = holders
            .transfer(ticket.id, committed.order.user_id, transfer_to("Grace", "grace@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyUsed);
    }

    #[tokio::test]
    async fn test_transfer_validates_attendee() {
        let (store, committed) = order_with_tickets(1).await;
        let holders = TicketHolderService::new(store, Duration::from_secs(5));
        let err = holders
            .transfer(committed.tickets[0].id, committed.order.user_id, transfer_to("Grace", "not-an-email"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
