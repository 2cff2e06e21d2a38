//! Decimal constants for performance metric calculations.

use rust_decimal::Decimal;

pub const TWO: Decimal = Decimal::TWO;
pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;
/// Default annualization factor: one sample per trading day.
pub const TRADING_DAYS: u32 = 252;
pub const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 12); // 0.000000000001
