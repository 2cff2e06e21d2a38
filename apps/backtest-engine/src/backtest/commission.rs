//! Taker fee calculation for simulated fills.

use rust_decimal::Decimal;

/// Fee charged on a fill of `quantity` units at `price`.
///
/// Fees are a flat rate on notional, charged on both entry and exit.
#[must_use]
pub fn calculate_fee(price: Decimal, quantity: Decimal, fee_rate: Decimal) -> Decimal {
    price * quantity * fee_rate
}

/// Share of an accumulated entry fee attributable to `closed` out of `held` units.
#[must_use]
pub fn proportional_fee(accumulated: Decimal, closed: Decimal, held: Decimal) -> Decimal {
    if held.is_zero() {
        return Decimal::ZERO;
    }
    accumulated * (closed / held)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_fee_on_notional() {
        // 0.01 BTC @ 50,000 with 4 bps
        assert_eq!(calculate_fee(dec!(50000), dec!(0.01), dec!(0.0004)), dec!(0.2));
    }

    #[test]
    fn test_proportional_fee() {
        assert_eq!(proportional_fee(dec!(0.4), dec!(1), dec!(4)), dec!(0.1));
        assert_eq!(proportional_fee(dec!(0.4), dec!(4), dec!(4)), dec!(0.4));
        assert_eq!(proportional_fee(dec!(0.4), dec!(1), Decimal::ZERO), Decimal::ZERO);
    }
}
