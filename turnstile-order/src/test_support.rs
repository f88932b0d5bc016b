use std::sync::Arc;

use chrono::{Duration, Utc};
use turnstile_catalog::{NewTicketType, TicketType};
use turnstile_core::{Attendee, BillingInfo, EventSummary};
use turnstile_shared::Masked;
use turnstile_store::memory::InMemoryStore;
use uuid::Uuid;

pub fn attendees(count: u32) -> Vec<Attendee> {
    (0..count)
        .map(|i| Attendee {
            name: format!("Guest {i}"),
            email: Masked::new(format!("guest{i}@example.com")),
            phone: None,
        })
        .collect()
}

pub fn billing() -> BillingInfo {
    BillingInfo {
        name: "Ada Lovelace".to_string(),
        email: Masked::new("ada@example.com".to_string()),
        address: None,
        payment_intent_id: Some("pi_test".to_string()),
        payment_method: Some("card".to_string()),
    }
}

pub fn ticket_type(event_id: Uuid, price: &str, quantity: Option<i32>) -> TicketType {
    let def = NewTicketType {
        name: "General Admission".to_string(),
        price: price.parse().unwrap(),
        currency: Some("EUR".to_string()),
        quantity,
        ..Default::default()
    };
    TicketType::from_definition(event_id, def, Utc::now()).unwrap()
}

/// Memory store with one registered event.
pub async fn store_with_event() -> (Arc<InMemoryStore>, Uuid) {
    let store = Arc::new(InMemoryStore::new());
    let event_id = Uuid::new_v4();
    store
        .register_event(EventSummary {
            id: event_id,
            organizer_id: Uuid::new_v4(),
            starts_at: Utc::now() + Duration::days(30),
            capacity: None,
        })
        .await;
    (store, event_id)
}
