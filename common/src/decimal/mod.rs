//! Decimal type utilities for precise financial calculations

pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;

/// Monetary amount with exact decimal arithmetic
pub type Amount = Decimal;

/// Precision helpers for common operations
pub mod precision {
    use super::*;

    /// Default amount precision (8 decimal places)
    pub const AMOUNT_PRECISION: u32 = 8;

    /// Round amount to standard precision
    pub fn round_amount(amount: Amount) -> Amount {
        amount.round_dp(AMOUNT_PRECISION)
    }
}
