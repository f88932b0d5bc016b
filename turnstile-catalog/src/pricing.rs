use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use turnstile_shared::money;
use turnstile_shared::Currency;

use crate::CatalogError;

/// Price of one purchase line, fixed at allocation time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinePrice {
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
    pub currency: Currency,
}

impl LinePrice {
    pub fn new(unit_price: Decimal, quantity: u32, currency: Currency) -> Result<Self, CatalogError> {
        let unit_price = money::round_money(unit_price);
        Ok(Self {
            unit_price,
            quantity,
            line_total: money::line_total(unit_price, quantity)?,
            currency,
        })
    }
}

/// Running order total. The first line fixes the order currency; the sum
/// never leaves the storable range.
#[derive(Debug, Clone, Default)]
pub struct OrderTotal {
    currency: Option<Currency>,
    amount: Decimal,
}

impl OrderTotal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, line: &LinePrice) -> Result<(), CatalogError> {
        match &self.currency {
            Some(currency) if *currency != line.currency => {
                return Err(CatalogError::CurrencyMismatch {
                    expected: currency.to_string(),
                    found: line.currency.to_string(),
                });
            }
            Some(_) => {}
            None => self.currency = Some(line.currency.clone()),
        }
        self.amount = money::add_amounts(self.amount, line.line_total)?;
        Ok(())
    }

    pub fn currency(&self) -> Option<&Currency> {
        self.currency.as_ref()
    }

    pub fn amount(&self) -> Decimal {
        money::round_money(self.amount)
    }
}
