//! Core value types shared by the account, runner and metrics.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
pub type TimestampMs = i64;

/// Position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Long position (profits when price rises).
    Long,
    /// Short position (profits when price falls).
    Short,
}

impl Side {
    /// Lowercase label used in keys, events and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }

    /// Signed P&L of moving from `entry` to `exit` for `quantity` units.
    #[must_use]
    pub fn pnl(&self, entry: Decimal, exit: Decimal, quantity: Decimal) -> Decimal {
        match self {
            Self::Long => (exit - entry) * quantity,
            Self::Short => (entry - exit) * quantity,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kline {
    /// Candle open time (ms).
    pub open_time: TimestampMs,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    #[serde(default)]
    pub volume: Decimal,
}

impl Kline {
    /// Create a new candle.
    #[must_use]
    pub const fn new(
        open_time: TimestampMs,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Candle where every price equals `price`.
    #[must_use]
    pub const fn flat(open_time: TimestampMs, price: Decimal) -> Self {
        Self::new(open_time, price, price, price, price, Decimal::ZERO)
    }
}

/// Label of an executed trade action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    /// New position opened.
    Open,
    /// Existing position averaged into.
    Add,
    /// Decision-driven close (full or partial).
    Close,
    /// Forced close at the liquidation price.
    Liquidated,
    /// Protective stop-loss exit.
    StopLoss,
    /// Protective take-profit exit.
    TakeProfit,
}

impl TradeAction {
    /// Whether this action reduces a position and realizes P&L.
    #[must_use]
    pub const fn is_closing(&self) -> bool {
        !matches!(self, Self::Open | Self::Add)
    }

    /// Label as written to the trade log.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Add => "add",
            Self::Close => "close",
            Self::Liquidated => "liquidated",
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Simulated time of execution.
    pub timestamp: TimestampMs,
    /// Traded symbol.
    pub symbol: String,
    /// Action label.
    pub action: TradeAction,
    /// Position side affected.
    pub side: Side,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Fill price after slippage.
    pub price: Decimal,
    /// Fee charged (opening fee for opens, closing plus proportional opening fee for closes).
    pub fee: Decimal,
    /// Net realized P&L, zero for opens.
    pub realized_pnl: Decimal,
    /// Position leverage.
    pub leverage: u32,
    /// Simulation cycle that produced this event.
    pub cycle: u64,
    /// Set for forced liquidations.
    pub liquidation: bool,
    /// Free-text note.
    #[serde(default)]
    pub note: String,
}

/// One sample of the equity curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Simulated time of the sample.
    pub timestamp: TimestampMs,
    /// Total equity (cash + margin + unrealized).
    pub equity: Decimal,
    /// Free cash.
    #[serde(default)]
    pub cash: Decimal,
    /// Margin locked in open positions.
    #[serde(default)]
    pub margin: Decimal,
    /// Unrealized P&L across open positions.
    #[serde(default)]
    pub unrealized: Decimal,
    /// Number of open positions.
    #[serde(default)]
    pub position_count: usize,
}

impl EquityPoint {
    /// Equity sample without a breakdown.
    #[must_use]
    pub const fn new(timestamp: TimestampMs, equity: Decimal) -> Self {
        Self {
            timestamp,
            equity,
            cash: Decimal::ZERO,
            margin: Decimal::ZERO,
            unrealized: Decimal::ZERO,
            position_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn side_pnl_sign_convention() {
        assert_eq!(Side::Long.pnl(dec!(100), dec!(110), dec!(2)), dec!(20));
        assert_eq!(Side::Short.pnl(dec!(100), dec!(110), dec!(2)), dec!(-20));
    }

    #[test]
    fn closing_actions() {
        assert!(!TradeAction::Open.is_closing());
        assert!(!TradeAction::Add.is_closing());
        assert!(TradeAction::Close.is_closing());
        assert!(TradeAction::Liquidated.is_closing());
        assert!(TradeAction::StopLoss.is_closing());
    }

    #[test]
    fn trade_action_serializes_snake_case() {
        let json = serde_json::to_string(&TradeAction::TakeProfit).unwrap();
        assert_eq!(json, "\"take_profit\"");
        assert_eq!(serde_json::to_string(&Side::Short).unwrap(), "\"short\"");
    }
}
