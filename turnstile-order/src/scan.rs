use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use turnstile_core::repository::TicketRepository;
use turnstile_core::{CoreResult, Ticket, TicketingError};
use uuid::Uuid;

use crate::deadline::bounded;

/// Entry validation. A ticket flips from unused to used exactly once; the
/// first successful scan is the one recorded.
pub struct ScanService {
    tickets: Arc<dyn TicketRepository>,
    timeout: Duration,
}

impl ScanService {
    pub fn new(tickets: Arc<dyn TicketRepository>, timeout: Duration) -> Self {
        Self { tickets, timeout }
    }

    pub async fn scan(&self, qr_code: &str, event_id: Uuid, scanned_by: Uuid) -> CoreResult<Ticket> {
        let qr_code = qr_code.trim();
        if qr_code.is_empty() {
            return Err(TicketingError::Validation("QR code is required".to_string()));
        }

        let mut ticket = bounded("ticket lookup", self.timeout, self.tickets.find_by_qr_code(event_id, qr_code))
            .await?
            .ok_or(TicketingError::TicketNotFound)?;

        if ticket.is_used {
            tracing::info!(ticket_id = %ticket.id, event_id = %event_id, "Ticket scanned again");
            return Err(ticket.already_used());
        }

        let now = Utc::now();
        let flipped = bounded("ticket scan", self.timeout, self.tickets.mark_used(ticket.id, now, scanned_by)).await?;

        if !flipped {
            // Another gate got there first; report its scan.
            let current = bounded("ticket lookup", self.timeout, self.tickets.get_ticket(ticket.id))
                .await?
                .ok_or(TicketingError::TicketNotFound)?;
            tracing::info!(ticket_id = %ticket.id, event_id = %event_id, "Ticket scan lost to a concurrent scan");
            return Err(current.already_used());
        }

        ticket.mark_used(now, scanned_by)?;
        tracing::info!(
            ticket_id = %ticket.id,
            ticket_number = %ticket.ticket_number,
            event_id = %event_id,
            scanned_by = %scanned_by,
            "Ticket admitted"
        );
        Ok(ticket)
    }
}
