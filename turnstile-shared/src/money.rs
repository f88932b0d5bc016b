use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places every stored amount carries.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(10,2)` column holds: 99,999,999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, MONEY_SCALE);

/// Currency applied to free ticket types created without one.
pub const DEFAULT_CURRENCY: &str = "EUR";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid currency code: '{0}' (expected a 3-letter ISO 4217 code)")]
    InvalidCurrency(String),

    #[error("Amount must not be negative: {0}")]
    Negative(Decimal),

    #[error("Amount has more than two decimal places: {0}")]
    TooPrecise(Decimal),

    #[error("Amount {0} exceeds the maximum of 99999999.99")]
    TooLarge(Decimal),

    #[error("Amount overflowed while computing a total")]
    Overflow,
}

/// ISO 4217 currency code, always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(MoneyError::InvalidCurrency(code.to_string()))
        }
    }

    pub fn default_for_free() -> Self {
        Self(DEFAULT_CURRENCY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// Round half-up (away from zero) to cents and pad to exactly two places,
/// so `10` and `10.0` both render as `10.00`.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Validate a configured price: non-negative, no sub-cent precision, and
/// within what storage can hold.
pub fn validate_price(price: Decimal) -> Result<Decimal, MoneyError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(MoneyError::Negative(price));
    }
    if price.normalize().scale() > MONEY_SCALE {
        return Err(MoneyError::TooPrecise(price));
    }
    check_storable(round_money(price))
}

/// Reject amounts that do not fit in storage.
pub fn check_storable(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount > MAX_AMOUNT {
        return Err(MoneyError::TooLarge(amount));
    }
    Ok(amount)
}

pub fn line_total(unit_price: Decimal, quantity: u32) -> Result<Decimal, MoneyError> {
    let total = unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or(MoneyError::Overflow)?;
    check_storable(round_money(total))
}

/// Sum two amounts, failing instead of overflowing.
pub fn add_amounts(left: Decimal, right: Decimal) -> Result<Decimal, MoneyError> {
    let sum = left.checked_add(right).ok_or(MoneyError::Overflow)?;
    check_storable(round_money(sum))
}
