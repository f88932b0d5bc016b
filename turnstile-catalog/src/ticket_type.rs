use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use turnstile_shared::money::{self, Currency};
use uuid::Uuid;

use crate::inventory::Remaining;
use crate::CatalogError;

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_PER_PURCHASE_CEILING: i32 = 100;

/// Sale status of a ticket type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketTypeStatus {
    Active,
    SoldOut,
    Disabled,
}

impl TicketTypeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketTypeStatus::Active => "active",
            TicketTypeStatus::SoldOut => "sold_out",
            TicketTypeStatus::Disabled => "disabled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(TicketTypeStatus::Active),
            "sold_out" => Some(TicketTypeStatus::SoldOut),
            "disabled" => Some(TicketTypeStatus::Disabled),
            _ => None,
        }
    }
}

/// Where `now` falls relative to a sale window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleWindowState {
    NotStarted,
    Open,
    Ended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleWindow {
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl SaleWindow {
    pub fn state_at(&self, now: DateTime<Utc>) -> SaleWindowState {
        if let Some(start) = self.starts_at {
            if now < start {
                return SaleWindowState::NotStarted;
            }
        }
        if let Some(end) = self.ends_at {
            if now > end {
                return SaleWindowState::Ended;
            }
        }
        SaleWindowState::Open
    }
}

/// A sellable category of admission for one event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: Currency,
    /// `None` means no cap.
    pub quantity: Option<i32>,
    pub sold: i32,
    pub max_per_purchase: Option<i32>,
    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
    pub refund_deadline: Option<DateTime<Utc>>,
    pub is_refundable: bool,
    pub sort_order: i32,
    pub status: TicketTypeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Definition submitted when an event publishes a ticket type
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NewTicketType {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub max_per_purchase: Option<i32>,
    #[serde(default)]
    pub sale_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sale_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refund_deadline: Option<DateTime<Utc>>,
    #[serde(default = "default_refundable")]
    pub is_refundable: bool,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

fn default_refundable() -> bool {
    true
}

/// Admin edit. Absent fields keep their current value.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TicketTypeUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub quantity: Option<i32>,
    pub max_per_purchase: Option<i32>,
    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
    pub refund_deadline: Option<DateTime<Utc>>,
    pub is_refundable: Option<bool>,
    pub sort_order: Option<i32>,
    /// Only `active` and `disabled` may be requested; `sold_out` is derived.
    pub status: Option<TicketTypeStatus>,
}

impl TicketType {
    /// Build and validate a new ticket type with nothing sold.
    pub fn from_definition(
        event_id: Uuid,
        def: NewTicketType,
        now: DateTime<Utc>,
    ) -> Result<Self, CatalogError> {
        let price = money::validate_price(def.price)?;
        let currency = match def.currency.as_deref() {
            Some(code) if !code.trim().is_empty() => Currency::parse(code)?,
            _ if price.is_zero() => Currency::default_for_free(),
            _ => {
                return Err(CatalogError::Validation(
                    "Currency is required for paid tickets".to_string(),
                ))
            }
        };

        let ticket_type = Self {
            id: Uuid::new_v4(),
            event_id,
            name: def.name.trim().to_string(),
            description: def.description,
            price,
            currency,
            quantity: def.quantity,
            sold: 0,
            max_per_purchase: def.max_per_purchase,
            sale_start: def.sale_start,
            sale_end: def.sale_end,
            refund_deadline: def.refund_deadline,
            is_refundable: def.is_refundable,
            sort_order: def.sort_order.unwrap_or(0),
            status: TicketTypeStatus::Active,
            created_at: now,
            updated_at: now,
        };

        ticket_type.validate()?;
        Ok(ticket_type)
    }

    /// Merge an admin edit into a copy of this ticket type. The sold count is
    /// carried over unchanged and the status is recomputed from it.
    pub fn with_update(&self, update: TicketTypeUpdate, now: DateTime<Utc>) -> Result<Self, CatalogError> {
        let mut next = self.clone();

        if let Some(name) = update.name {
            next.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            next.description = Some(description);
        }
        if let Some(price) = update.price {
            next.price = money::validate_price(price)?;
        }
        if let Some(code) = update.currency {
            next.currency = Currency::parse(&code)?;
        }
        if let Some(quantity) = update.quantity {
            if quantity < next.sold {
                return Err(CatalogError::Validation(format!(
                    "Quantity {} is below the {} tickets already sold",
                    quantity, next.sold
                )));
            }
            next.quantity = Some(quantity);
        }
        if let Some(max) = update.max_per_purchase {
            next.max_per_purchase = Some(max);
        }
        if update.sale_start.is_some() {
            next.sale_start = update.sale_start;
        }
        if update.sale_end.is_some() {
            next.sale_end = update.sale_end;
        }
        if update.refund_deadline.is_some() {
            next.refund_deadline = update.refund_deadline;
        }
        if let Some(refundable) = update.is_refundable {
            next.is_refundable = refundable;
        }
        if let Some(order) = update.sort_order {
            next.sort_order = order;
        }

        let requested = match update.status {
            Some(TicketTypeStatus::SoldOut) => {
                return Err(CatalogError::Validation(
                    "Status 'sold_out' is derived from inventory and cannot be set".to_string(),
                ))
            }
            Some(status) => status,
            None if self.status == TicketTypeStatus::Disabled => TicketTypeStatus::Disabled,
            None => TicketTypeStatus::Active,
        };
        next.status = Self::derive_status(next.quantity, next.sold, requested);
        next.updated_at = now;

        next.validate()?;
        Ok(next)
    }

    /// Status after a change to `quantity` or `sold`. Disabled types stay
    /// disabled; otherwise a type is sold out exactly when `sold == quantity`.
    pub fn derive_status(quantity: Option<i32>, sold: i32, requested: TicketTypeStatus) -> TicketTypeStatus {
        if requested == TicketTypeStatus::Disabled {
            return TicketTypeStatus::Disabled;
        }
        match quantity {
            Some(cap) if sold >= cap => TicketTypeStatus::SoldOut,
            _ => TicketTypeStatus::Active,
        }
    }

    pub fn remaining(&self) -> Remaining {
        match self.quantity {
            Some(cap) => Remaining::Limited((cap - self.sold).max(0)),
            None => Remaining::Unlimited,
        }
    }

    pub fn sale_window(&self) -> SaleWindow {
        SaleWindow {
            starts_at: self.sale_start,
            ends_at: self.sale_end,
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let name_len = self.name.chars().count();
        if name_len == 0 {
            return Err(CatalogError::Validation("Name is required".to_string()));
        }
        if name_len > MAX_NAME_LEN {
            return Err(CatalogError::Validation(format!(
                "Name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(CatalogError::Validation(format!(
                    "Description must be at most {} characters",
                    MAX_DESCRIPTION_LEN
                )));
            }
        }
        if let Some(quantity) = self.quantity {
            if quantity < 1 {
                return Err(CatalogError::Validation("Quantity must be at least 1".to_string()));
            }
            if self.sold > quantity {
                return Err(CatalogError::Validation(format!(
                    "Sold count {} exceeds quantity {}",
                    self.sold, quantity
                )));
            }
        }
        if let Some(max) = self.max_per_purchase {
            if !(1..=MAX_PER_PURCHASE_CEILING).contains(&max) {
                return Err(CatalogError::Validation(format!(
                    "Max per purchase must be between 1 and {}",
                    MAX_PER_PURCHASE_CEILING
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.sale_start, self.sale_end) {
            if start >= end {
                return Err(CatalogError::Validation(
                    "Sale start date must be before sale end date".to_string(),
                ));
            }
        }
        if let (Some(deadline), Some(end)) = (self.refund_deadline, self.sale_end) {
            if deadline > end {
                return Err(CatalogError::Validation(
                    "Refund deadline cannot be after sale end date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn paid(price: &str, currency: Option<&str>) -> NewTicketType {
        NewTicketType {
            name: "General Admission".to_string(),
            price: price.parse().unwrap(),
            currency: currency.map(String::from),
            quantity: Some(5),
            is_refundable: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_normalizes_price_and_currency() {
        let tt = TicketType::from_definition(Uuid::new_v4(), paid("10", Some("eur")), Utc::now()).unwrap();
        assert_eq!(tt.price.to_string(), "10.00");
        assert_eq!(tt.currency.as_str(), "EUR");
        assert_eq!(tt.sold, 0);
        assert_eq!(tt.status, TicketTypeStatus::Active);
        assert_eq!(tt.remaining(), Remaining::Limited(5));
    }

    #[test]
    fn test_paid_ticket_requires_currency() {
        let err = TicketType::from_definition(Uuid::new_v4(), paid("10.00", None), Utc::now()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let free = TicketType::from_definition(Uuid::new_v4(), paid("0", None), Utc::now()).unwrap();
        assert_eq!(free.currency.as_str(), "EUR");
    }

    #[test]
    fn test_sale_window_ordering() {
        let now = Utc::now();
        let mut def = paid("5.00", Some("USD"));
        def.sale_start = Some(now + Duration::days(2));
        def.sale_end = Some(now + Duration::days(1));
        assert!(TicketType::from_definition(Uuid::new_v4(), def, now).is_err());

        let mut def = paid("5.00", Some("USD"));
        def.sale_end = Some(now + Duration::days(1));
        def.refund_deadline = Some(now + Duration::days(3));
        assert!(TicketType::from_definition(Uuid::new_v4(), def, now).is_err());

        let mut def = paid("5.00", Some("USD"));
        def.sale_start = Some(now);
        def.sale_end = Some(now + Duration::days(1));
        def.refund_deadline = Some(now + Duration::days(1));
        assert!(TicketType::from_definition(Uuid::new_v4(), def, now).is_ok());
    }

    #[test]
    fn test_sale_window_state() {
        let now = Utc::now();
        let window = SaleWindow {
            starts_at: Some(now - Duration::hours(1)),
            ends_at: Some(now + Duration::hours(1)),
        };
        assert_eq!(window.state_at(now), SaleWindowState::Open);
        assert_eq!(window.state_at(now - Duration::hours(2)), SaleWindowState::NotStarted);
        assert_eq!(window.state_at(now + Duration::hours(2)), SaleWindowState::Ended);
    }

    #[test]
    fn test_update_cannot_drop_quantity_below_sold() {
        let mut tt = TicketType::from_definition(Uuid::new_v4(), paid("10.00", Some("EUR")), Utc::now()).unwrap();
        tt.sold = 4;
        let update = TicketTypeUpdate {
            quantity: Some(3),
            ..Default::default()
        };
        assert!(tt.with_update(update, Utc::now()).is_err());
    }

    #[test]
    fn test_update_recomputes_status() {
        let mut tt = TicketType::from_definition(Uuid::new_v4(), paid("10.00", Some("EUR")), Utc::now()).unwrap();
        tt.sold = 5;
        tt.status = TicketTypeStatus::SoldOut;

        let raised = tt
            .with_update(TicketTypeUpdate { quantity: Some(8), ..Default::default() }, Utc::now())
            .unwrap();
        assert_eq!(raised.status, TicketTypeStatus::Active);
        assert_eq!(raised.remaining(), Remaining::Limited(3));

        let disabled = raised
            .with_update(
                TicketTypeUpdate { status: Some(TicketTypeStatus::Disabled), ..Default::default() },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(disabled.status, TicketTypeStatus::Disabled);

        let still_disabled = disabled
            .with_update(TicketTypeUpdate { name: Some("VIP".to_string()), ..Default::default() }, Utc::now())
            .unwrap();
        assert_eq!(still_disabled.status, TicketTypeStatus::Disabled);
    }

    #[test]
    fn test_sold_out_cannot_be_requested() {
        let tt = TicketType::from_definition(Uuid::new_v4(), paid("10.00", Some("EUR")), Utc::now()).unwrap();
        let update = TicketTypeUpdate {
            status: Some(TicketTypeStatus::SoldOut),
            ..Default::default()
        };
        assert!(tt.with_update(update, Utc::now()).is_err());
    }
}
