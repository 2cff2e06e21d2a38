//! Stop/target trigger detection on candle ranges.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{Kline, Side, TradeAction};

/// Result of stop/target trigger evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerResult {
    /// No trigger occurred.
    None,
    /// Stop was triggered.
    Stop {
        /// Exit level.
        price: Decimal,
    },
    /// Target was triggered.
    Target {
        /// Exit level.
        price: Decimal,
    },
}

impl TriggerResult {
    /// Check if any trigger occurred.
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Exit level if triggered.
    #[must_use]
    pub const fn exit_price(&self) -> Option<Decimal> {
        match self {
            Self::None => None,
            Self::Stop { price } | Self::Target { price } => Some(*price),
        }
    }

    /// Trade action label for the resulting exit.
    #[must_use]
    pub const fn action(&self) -> Option<TradeAction> {
        match self {
            Self::None => None,
            Self::Stop { .. } => Some(TradeAction::StopLoss),
            Self::Target { .. } => Some(TradeAction::TakeProfit),
        }
    }
}

/// Check if a stop level is triggered.
///
/// Long positions: stop triggers when price falls to stop level (low <= stop).
/// Short positions: stop triggers when price rises to stop level (high >= stop).
#[must_use]
pub fn is_stop_triggered(side: Side, stop_level: Decimal, kline: &Kline) -> bool {
    match side {
        Side::Long => kline.low <= stop_level,
        Side::Short => kline.high >= stop_level,
    }
}

/// Check if a target level is triggered.
///
/// Long positions: target triggers when price rises to target level (high >= target).
/// Short positions: target triggers when price falls to target level (low <= target).
#[must_use]
pub fn is_target_triggered(side: Side, target_level: Decimal, kline: &Kline) -> bool {
    match side {
        Side::Long => kline.high >= target_level,
        Side::Short => kline.low <= target_level,
    }
}

/// Evaluate stop and target triggers for a position.
///
/// When both fire inside one candle the intra-bar path is unknown, so the
/// stop is taken.
#[must_use]
pub fn evaluate_triggers(
    side: Side,
    stop_level: Option<Decimal>,
    target_level: Option<Decimal>,
    kline: &Kline,
) -> TriggerResult {
    if let Some(price) = stop_level.filter(|level| is_stop_triggered(side, *level, kline)) {
        return TriggerResult::Stop { price };
    }
    if let Some(price) = target_level.filter(|level| is_target_triggered(side, *level, kline)) {
        return TriggerResult::Target { price };
    }
    TriggerResult::None
}

/// Stop and target levels from percentage distances off `entry`.
///
/// Non-positive percentages leave the level unset.
#[must_use]
pub fn protective_levels(
    side: Side,
    entry: Decimal,
    stop_loss_pct: Option<Decimal>,
    take_profit_pct: Option<Decimal>,
) -> (Option<Decimal>, Option<Decimal>) {
    let offset = |pct: Decimal| entry * pct / Decimal::ONE_HUNDRED;
    let stop = stop_loss_pct
        .filter(|pct| *pct > Decimal::ZERO)
        .map(|pct| match side {
            Side::Long => entry - offset(pct),
            Side::Short => entry + offset(pct),
        });
    let target = take_profit_pct
        .filter(|pct| *pct > Decimal::ZERO)
        .map(|pct| match side {
            Side::Long => entry + offset(pct),
            Side::Short => entry - offset(pct),
        });
    (stop, target)
}
