use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_catalog::{Availability, LinePrice, OrderTotal, Remaining, SaleWindowState, TicketType, TicketTypeStatus};
use turnstile_core::{
    Attendee, BillingInfo, CoreResult, InventoryDelta, PlannedOrder, PlannedPurchase, PlannedTicket, TicketingError,
    WritePlan,
};
use turnstile_shared::pii::looks_like_email;
use uuid::Uuid;

/// Most tickets a single purchase line may issue.
pub const MAX_LINE_QUANTITY: u32 = 100;

/// One requested line: a ticket type, how many, and who is coming
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseLine {
    pub ticket_type_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRequest {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub lines: Vec<PurchaseLine>,
    pub billing: BillingInfo,
}

/// Turns a purchase request and a ticket type snapshot into a write plan.
///
/// Pure: no I/O, no clock reads. Every rule is checked against the snapshot,
/// so the result is only as fresh as the snapshot. The writer re-checks the
/// inventory part atomically when it commits.
///
/// Per line, checks run in a fixed order and the first failure wins:
/// existence, on-sale status, remaining inventory, purchase limit, sale
/// window, attendee count. Inventory and limits are cumulative across lines
/// naming the same ticket type.
pub struct AllocationEngine;

impl AllocationEngine {
    pub fn allocate(request: &PurchaseRequest, snapshot: &[TicketType], now: DateTime<Utc>) -> CoreResult<WritePlan> {
        validate_request(request)?;

        let by_id: HashMap<Uuid, &TicketType> = snapshot.iter().map(|t| (t.id, t)).collect();
        let mut requested: HashMap<Uuid, i64> = HashMap::new();
        let mut total = OrderTotal::new();
        let mut purchases = Vec::with_capacity(request.lines.len());
        let mut tickets = Vec::new();
        let mut inventory = Vec::with_capacity(request.lines.len());

        for (index, line) in request.lines.iter().enumerate() {
            let ticket_type = by_id
                .get(&line.ticket_type_id)
                .ok_or(TicketingError::TicketTypeNotFound(line.ticket_type_id))?;
            let availability = Availability::of(ticket_type, request.event_id)?;

            if availability.status == TicketTypeStatus::Disabled {
                return Err(TicketingError::TicketTypeDisabled(line.ticket_type_id));
            }

            let quantity = i64::from(line.quantity);
            let earlier = requested.get(&line.ticket_type_id).copied().unwrap_or(0);
            let cumulative = earlier + quantity;

            check_inventory(&availability, earlier, quantity)?;

            if let Some(max) = availability.max_per_purchase {
                if cumulative > i64::from(max) {
                    return Err(TicketingError::PurchaseLimitExceeded {
                        ticket_type_id: line.ticket_type_id,
                        requested: cumulative,
                        max,
                    });
                }
            }

            match availability.sale_window.state_at(now) {
                SaleWindowState::NotStarted => {
                    return Err(TicketingError::SaleNotStarted {
                        ticket_type_id: line.ticket_type_id,
                        starts_at: availability.sale_window.starts_at.unwrap_or(now),
                    })
                }
                SaleWindowState::Ended => {
                    return Err(TicketingError::SaleEnded {
                        ticket_type_id: line.ticket_type_id,
                        ended_at: availability.sale_window.ends_at.unwrap_or(now),
                    })
                }
                SaleWindowState::Open => {}
            }

            if line.attendees.len() != line.quantity as usize {
                return Err(TicketingError::AttendeeMismatch {
                    ticket_type_id: line.ticket_type_id,
                    expected: line.quantity,
                    provided: line.attendees.len(),
                });
            }
            validate_attendees(&line.attendees)?;

            let price = LinePrice::new(availability.unit_price, line.quantity, availability.currency.clone())?;
            total.add(&price)?;

            let delta = i32::try_from(line.quantity)
                .map_err(|_| TicketingError::Validation(format!("Quantity {} is too large", line.quantity)))?;
            requested.insert(line.ticket_type_id, cumulative);
            inventory.push(InventoryDelta {
                ticket_type_id: line.ticket_type_id,
                quantity: delta,
            });

            tickets.extend(line.attendees.iter().map(|attendee| PlannedTicket {
                purchase_index: index,
                ticket_type_id: line.ticket_type_id,
                attendee: attendee.clone(),
                is_transferable: true,
            }));

            purchases.push(PlannedPurchase {
                ticket_type_id: line.ticket_type_id,
                quantity: line.quantity,
                unit_price: price.unit_price,
                total_price: price.line_total,
                currency: price.currency,
                attendees: line.attendees.clone(),
            });
        }

        let currency = total
            .currency()
            .cloned()
            .ok_or_else(|| TicketingError::Internal("priced order has no currency".to_string()))?;

        let order = PlannedOrder {
            event_id: request.event_id,
            user_id: request.user_id,
            total_amount: total.amount(),
            currency,
            billing: request.billing.clone(),
        };

        WritePlan::new(order, purchases, tickets, inventory)
    }
}

/// `earlier` seats of this type are already claimed by previous lines of the
/// same request.
fn check_inventory(availability: &Availability, earlier: i64, quantity: i64) -> CoreResult<()> {
    let id = availability.ticket_type_id;
    match availability.remaining {
        Remaining::Unlimited => Ok(()),
        Remaining::Limited(left) => {
            let still_free = i64::from(left) - earlier;
            if still_free <= 0 || availability.status == TicketTypeStatus::SoldOut {
                return Err(TicketingError::SoldOut(id));
            }
            if quantity > still_free {
                return Err(TicketingError::InsufficientInventory {
                    ticket_type_id: id,
                    requested: quantity,
                    available: i32::try_from(still_free).unwrap_or(i32::MAX),
                });
            }
            Ok(())
        }
    }
}

fn validate_request(request: &PurchaseRequest) -> CoreResult<()> {
    if request.lines.is_empty() {
        return Err(TicketingError::Validation("At least one ticket line is required".to_string()));
    }
    if let Some(line) = request.lines.iter().find(|l| !(1..=MAX_LINE_QUANTITY).contains(&l.quantity)) {
        return Err(TicketingError::Validation(format!(
            "Quantity for ticket type {} must be between 1 and {}",
            line.ticket_type_id, MAX_LINE_QUANTITY
        )));
    }
    if request.billing.name.trim().is_empty() {
        return Err(TicketingError::Validation("Billing name is required".to_string()));
    }
    if !looks_like_email(request.billing.email.expose()) {
        return Err(TicketingError::Validation("Billing email is invalid".to_string()));
    }
    Ok(())
}

fn validate_attendees(attendees: &[Attendee]) -> CoreResult<()> {
    for attendee in attendees {
        if attendee.name.trim().is_empty() {
            return Err(TicketingError::Validation("Attendee name is required".to_string()));
        }
        if !looks_like_email(attendee.email.expose()) {
            return Err(TicketingError::Validation("Attendee email is invalid".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{attendees, billing, ticket_type};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use turnstile_core::ErrorKind;

    fn request(event_id: Uuid, lines: Vec<(Uuid, u32)>) -> PurchaseRequest {
        PurchaseRequest {
            event_id,
            user_id: Uuid::new_v4(),
            lines: lines
                .into_iter()
                .map(|(ticket_type_id, quantity)| PurchaseLine {
                    ticket_type_id,
                    quantity,
                    attendees: attendees(quantity),
                })
                .collect(),
            billing: billing(),
        }
    }

    #[test]
    fn test_allocates_lines_in_request_order() {
        let event_id = Uuid::new_v4();
        let ga = ticket_type(event_id, "10.00", Some(100));
        let vip = ticket_type(event_id, "45.50", Some(10));
        let req = request(event_id, vec![(ga.id, 3), (vip.id, 1)]);

        let plan = AllocationEngine::allocate(&req, &[ga.clone(), vip.clone()], Utc::now()).unwrap();

        assert_eq!(plan.purchases().len(), 2);
        assert_eq!(plan.purchases()[0].ticket_type_id, ga.id);
        assert_eq!(plan.purchases()[0].total_price, "30.00".parse::<Decimal>().unwrap());
        assert_eq!(plan.order().total_amount, "75.50".parse::<Decimal>().unwrap());
        assert_eq!(plan.tickets().len(), 4);
        assert_eq!(plan.inventory().len(), 2);
    }

    #[test]
    fn test_missing_ticket_type_is_not_found() {
        let event_id = Uuid::new_v4();
        let req = request(event_id, vec![(Uuid::new_v4(), 1)]);
        let err = AllocationEngine::allocate(&req, &[], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::TicketTypeNotFound(_)));
    }

    #[test]
    fn test_ticket_type_of_another_event_is_not_found() {
        let other = ticket_type(Uuid::new_v4(), "10.00", Some(5));
        let req = request(Uuid::new_v4(), vec![(other.id, 1)]);
        let err = AllocationEngine::allocate(&req, &[other], Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_sold_out_and_insufficient() {
        let event_id = Uuid::new_v4();
        let mut tt = ticket_type(event_id, "10.00", Some(5));
        tt.sold = 3;

        let err = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 3)]), &[tt.clone()], Utc::now())
            .unwrap_err();
        assert!(matches!(err, TicketingError::InsufficientInventory { requested: 3, available: 2, .. }));

        tt.sold = 5;
        tt.status = TicketTypeStatus::SoldOut;
        let err = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 1)]), &[tt], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::SoldOut(_)));
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn test_remaining_exactly_is_accepted() {
        let event_id = Uuid::new_v4();
        let mut tt = ticket_type(event_id, "10.00", Some(5));
        tt.sold = 3;
        let plan = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 2)]), &[tt], Utc::now()).unwrap();
        assert_eq!(plan.inventory()[0].quantity, 2);
    }

    #[test]
    fn test_inventory_is_cumulative_across_lines() {
        let event_id = Uuid::new_v4();
        let tt = ticket_type(event_id, "10.00", Some(3));
        let req = request(event_id, vec![(tt.id, 2), (tt.id, 2)]);
        let err = AllocationEngine::allocate(&req, &[tt], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::InsufficientInventory { requested: 2, available: 1, .. }));
    }

    #[test]
    fn test_purchase_limit_is_cumulative() {
        let event_id = Uuid::new_v4();
        let mut tt = ticket_type(event_id, "10.00", None);
        tt.max_per_purchase = Some(4);

        let ok = request(event_id, vec![(tt.id, 4)]);
        assert!(AllocationEngine::allocate(&ok, &[tt.clone()], Utc::now()).is_ok());

        let split = request(event_id, vec![(tt.id, 3), (tt.id, 2)]);
        let err = AllocationEngine::allocate(&split, &[tt], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::PurchaseLimitExceeded { requested: 5, max: 4, .. }));
    }

    #[test]
    fn test_inventory_is_checked_before_limit() {
        let event_id = Uuid::new_v4();
        let mut tt = ticket_type(event_id, "10.00", Some(2));
        tt.max_per_purchase = Some(1);
        let err = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 3)]), &[tt], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::InsufficientInventory { .. }));
    }

    #[test]
    fn test_sale_window() {
        let event_id = Uuid::new_v4();
        let now = Utc::now();
        let mut tt = ticket_type(event_id, "10.00", None);

        tt.sale_start = Some(now + Duration::hours(1));
        let err = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 1)]), &[tt.clone()], now).unwrap_err();
        assert!(matches!(err, TicketingError::SaleNotStarted { .. }));

        tt.sale_start = None;
        tt.sale_end = Some(now - Duration::hours(1));
        let err = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 1)]), &[tt], now).unwrap_err();
        assert!(matches!(err, TicketingError::SaleEnded { .. }));
    }

    #[test]
    fn test_attendee_count_must_match_quantity() {
        let event_id = Uuid::new_v4();
        let tt = ticket_type(event_id, "10.00", None);
        let mut req = request(event_id, vec![(tt.id, 2)]);
        req.lines[0].attendees.pop();

        let err = AllocationEngine::allocate(&req, &[tt], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::AttendeeMismatch { expected: 2, provided: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_disabled_type_is_not_sellable() {
        let event_id = Uuid::new_v4();
        let mut tt = ticket_type(event_id, "10.00", None);
        tt.status = TicketTypeStatus::Disabled;
        let err = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 1)]), &[tt], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::TicketTypeDisabled(_)));
    }

    #[test]
    fn test_mixed_currencies_are_rejected() {
        let event_id = Uuid::new_v4();
        let eur = ticket_type(event_id, "10.00", None);
        let mut usd = ticket_type(event_id, "10.00", None);
        usd.currency = turnstile_shared::Currency::parse("USD").unwrap();

        let err = AllocationEngine::allocate(&request(event_id, vec![(eur.id, 1), (usd.id, 1)]), &[eur, usd], Utc::now())
            .unwrap_err();
        assert!(matches!(err, TicketingError::CurrencyMismatch { .. }));
    }

    #[test]
    fn test_request_shape_is_validated() {
        let event_id = Uuid::new_v4();
        let tt = ticket_type(event_id, "10.00", None);

        let empty = request(event_id, vec![]);
        assert!(matches!(
            AllocationEngine::allocate(&empty, &[tt.clone()], Utc::now()),
            Err(TicketingError::Validation(_))
        ));

        let zero = request(event_id, vec![(tt.id, 0)]);
        assert!(matches!(
            AllocationEngine::allocate(&zero, &[tt.clone()], Utc::now()),
            Err(TicketingError::Validation(_))
        ));

        let mut bad_email = request(event_id, vec![(tt.id, 1)]);
        bad_email.lines[0].attendees[0].email = turnstile_shared::Masked::new("nobody".to_string());
        assert!(matches!(
            AllocationEngine::allocate(&bad_email, &[tt], Utc::now()),
            Err(TicketingError::Validation(_))
        ));
    }

    #[test]
    fn test_free_tickets_total_zero() {
        let event_id = Uuid::new_v4();
        let tt = ticket_type(event_id, "0", Some(10));
        let plan = AllocationEngine::allocate(&request(event_id, vec![(tt.id, 2)]), &[tt], Utc::now()).unwrap();
        assert!(plan.order().total_amount.is_zero());
        assert_eq!(plan.order().currency.as_str(), "EUR");
    }

    #[test]
    fn test_line_quantity_is_bounded() {
        let event_id = Uuid::new_v4();
        let uncapped = ticket_type(event_id, "1.00", None);

        let at_limit = request(event_id, vec![(uncapped.id, MAX_LINE_QUANTITY)]);
        let plan = AllocationEngine::allocate(&at_limit, &[uncapped.clone()], Utc::now()).unwrap();
        assert_eq!(plan.tickets().len(), MAX_LINE_QUANTITY as usize);

        let huge = request(event_id, vec![(uncapped.id, 5000)]);
        let err = AllocationEngine::allocate(&huge, &[uncapped], Utc::now()).unwrap_err();
        assert!(matches!(err, TicketingError::Validation(_)));
    }

    #[test]
    fn test_oversized_amounts_are_validation_errors() {
        let event_id = Uuid::new_v4();
        let mut absurd = ticket_type(event_id, "1.00", None);
        absurd.price = "500000000000000000000000000.00".parse().unwrap();
        let req = request(event_id, vec![(absurd.id, 100)]);
        let err = AllocationEngine::allocate(&req, &[absurd], Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let pricey = ticket_type(event_id, "99999999.99", None);
        let req = request(event_id, vec![(pricey.id, 1), (pricey.id, 1)]);
        let err = AllocationEngine::allocate(&req, &[pricey], Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
