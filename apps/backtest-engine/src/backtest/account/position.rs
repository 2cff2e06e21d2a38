//! Leveraged position held by the simulated account.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::types::{Side, TimestampMs};

/// Ledger key of a position: one side of one symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Symbol.
    pub symbol: String,
    /// Side.
    pub side: Side,
}

impl PositionKey {
    /// Create a key for `symbol` and `side`.
    #[must_use]
    pub fn new(symbol: &str, side: Side) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.symbol, self.side)
    }
}

/// Price at which a position loses 100% of its margin.
///
/// Flat rule with no maintenance-margin tiers: long `entry*(1-1/lev)`,
/// short `entry*(1+1/lev)`.
#[must_use]
pub fn liquidation_price(side: Side, entry_price: Decimal, leverage: u32) -> Decimal {
    let inverse = Decimal::ONE / Decimal::from(leverage.max(1));
    match side {
        Side::Long => entry_price * (Decimal::ONE - inverse),
        Side::Short => entry_price * (Decimal::ONE + inverse),
    }
}

/// Simulated leveraged position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Symbol.
    pub symbol: String,
    /// Side.
    pub side: Side,
    /// Held quantity, always positive while the position exists.
    pub quantity: Decimal,
    /// Quantity-weighted average entry price.
    pub entry_price: Decimal,
    /// Leverage (>= 1).
    pub leverage: u32,
    /// Cash committed as collateral.
    pub margin: Decimal,
    /// Cumulative fill notional across adds.
    pub notional: Decimal,
    /// Price at which the position is force-closed.
    pub liquidation_price: Decimal,
    /// Time of the first fill.
    pub open_time: TimestampMs,
    /// Entry fees not yet attributed to a close.
    pub accumulated_fee: Decimal,
    /// Protective stop level.
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Protective target level.
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

impl Position {
    /// Ledger key of this position.
    #[must_use]
    pub fn key(&self) -> PositionKey {
        PositionKey::new(&self.symbol, self.side)
    }

    /// Unrealized P&L marked at `price`.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.side.pnl(self.entry_price, price, self.quantity)
    }

    /// Whether `price` breaches the liquidation price.
    #[must_use]
    pub fn is_liquidated_at(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price <= self.liquidation_price,
            Side::Short => price >= self.liquidation_price,
        }
    }

    /// Merge an additional fill, averaging the entry price.
    pub(crate) fn add_fill(
        &mut self,
        quantity: Decimal,
        fill_price: Decimal,
        margin: Decimal,
        notional: Decimal,
        fee: Decimal,
    ) {
        let total_quantity = self.quantity + quantity;
        self.entry_price =
            (self.entry_price * self.quantity + fill_price * quantity) / total_quantity;
        self.quantity = total_quantity;
        self.margin += margin;
        self.notional += notional;
        self.accumulated_fee += fee;
        self.liquidation_price = liquidation_price(self.side, self.entry_price, self.leverage);
    }

    /// Shrink by the closed fraction `ratio`, keeping entry and leverage.
    pub(crate) fn shrink(&mut self, quantity: Decimal, ratio: Decimal, attributed_fee: Decimal) {
        let remaining = Decimal::ONE - ratio;
        self.quantity -= quantity;
        self.margin *= remaining;
        self.notional *= remaining;
        self.accumulated_fee -= attributed_fee;
    }
}
