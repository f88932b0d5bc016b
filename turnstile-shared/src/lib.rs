pub mod money;
pub mod pii;

pub use money::{Currency, MoneyError};
pub use pii::Masked;
