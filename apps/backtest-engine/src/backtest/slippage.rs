//! Fixed-rate slippage applied to every simulated fill.

use rust_decimal::Decimal;

use super::types::Side;

/// Basis points divisor (1 bp = 0.0001).
pub const BPS_DIVISOR: Decimal = Decimal::from_parts(10000, 0, 0, false, 0);

/// Direction of the exchange order that produces a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    /// Buy (opening a long, covering a short).
    Buy,
    /// Sell (opening a short, closing a long).
    Sell,
}

impl OrderSide {
    /// Order direction needed to open (`is_entry`) or close a position on `side`.
    #[must_use]
    pub const fn for_position(side: Side, is_entry: bool) -> Self {
        match (side, is_entry) {
            (Side::Long, true) | (Side::Short, false) => Self::Buy,
            (Side::Long, false) | (Side::Short, true) => Self::Sell,
        }
    }
}

/// Convert basis points to a decimal rate.
#[must_use]
pub fn bps_to_rate(bps: Decimal) -> Decimal {
    bps / BPS_DIVISOR
}

/// Apply slippage against the trader.
///
/// For buys: pay more (worse fill)
/// For sells: receive less (worse fill)
#[must_use]
pub fn apply_slippage(price: Decimal, side: OrderSide, rate: Decimal) -> Decimal {
    if rate.is_zero() {
        return price;
    }

    match side {
        OrderSide::Buy => price * (Decimal::ONE + rate),
        OrderSide::Sell => price * (Decimal::ONE - rate),
    }
}

/// Fill price for opening (`is_entry`) or closing a position on `side`.
#[must_use]
pub fn fill_price(price: Decimal, side: Side, is_entry: bool, rate: Decimal) -> Decimal {
    apply_slippage(price, OrderSide::for_position(side, is_entry), rate)
}
