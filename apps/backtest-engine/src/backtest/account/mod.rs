//! Simulated leveraged-futures account.
//!
//! Holds cash, open positions keyed by `(symbol, side)` and cumulative
//! realized P&L. Every fill applies slippage against the trader and a
//! flat taker fee on notional.
//!
//! Cash accounting:
//!
//! - open: `cash -= margin + fee`
//! - close: `cash += margin * ratio + gross - closing_fee`
//!
//! The opening fee is paid from cash at open time. On close, its
//! proportional share is attributed to the realized P&L figure but is
//! not deducted from cash a second time.

mod error;
mod position;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::AccountError;
pub use position::{Position, PositionKey, liquidation_price};

use super::commission::{calculate_fee, proportional_fee};
use super::slippage::{bps_to_rate, fill_price};
use super::types::{Side, TimestampMs, TradeAction, TradeEvent};

/// Latest mark price per symbol.
pub type PriceMap = BTreeMap<String, Decimal>;

/// Result of a successful open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFill {
    /// Position after the fill.
    pub position: Position,
    /// Opening fee charged.
    pub fee: Decimal,
    /// Fill price after slippage.
    pub fill_price: Decimal,
    /// Margin committed by this fill.
    pub margin: Decimal,
    /// Whether the fill averaged into an existing position.
    pub added: bool,
}

/// Result of a successful close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFill {
    /// Gross P&L minus closing fee and proportional opening fee.
    pub net_realized: Decimal,
    /// Closing fee plus proportional opening fee.
    pub total_fee: Decimal,
    /// Fill price after slippage.
    pub fill_price: Decimal,
    /// P&L before fees.
    pub gross_realized: Decimal,
    /// Quantity actually closed.
    pub quantity: Decimal,
    /// Leverage of the closed position.
    pub leverage: u32,
    /// Whether the position was removed.
    pub fully_closed: bool,
}

/// Mark-to-market valuation of the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityBreakdown {
    /// `cash + margin + unrealized`.
    pub equity: Decimal,
    /// Free cash.
    pub cash: Decimal,
    /// Margin locked in positions.
    pub margin: Decimal,
    /// Unrealized P&L across positions.
    pub unrealized: Decimal,
    /// Unrealized P&L per position, keyed `symbol_side`.
    pub per_position: BTreeMap<String, Decimal>,
}

/// Outcome of a liquidation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidationReport {
    /// One event per liquidated position.
    pub events: Vec<TradeEvent>,
    /// Summary note, present when anything was liquidated.
    pub note: Option<String>,
}

impl LiquidationReport {
    /// Whether `symbol` had any position liquidated.
    #[must_use]
    pub fn contains_symbol(&self, symbol: &str) -> bool {
        self.events.iter().any(|e| e.symbol == symbol)
    }
}

/// Serializable deep copy of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Free cash.
    pub cash: Decimal,
    /// Cumulative net realized P&L.
    pub realized_pnl: Decimal,
    /// Open positions.
    pub positions: Vec<Position>,
}

/// Simulated margin account.
#[derive(Debug, Clone)]
pub struct SimulatedAccount {
    initial_balance: Decimal,
    cash: Decimal,
    positions: BTreeMap<PositionKey, Position>,
    realized_pnl: Decimal,
    fee_rate: Decimal,
    slippage_rate: Decimal,
}

impl SimulatedAccount {
    /// Create an account funded with `initial_balance`.
    ///
    /// Fee and slippage are given in basis points.
    #[must_use]
    pub fn new(initial_balance: Decimal, fee_bps: Decimal, slippage_bps: Decimal) -> Self {
        Self {
            initial_balance,
            cash: initial_balance,
            positions: BTreeMap::new(),
            realized_pnl: Decimal::ZERO,
            fee_rate: bps_to_rate(fee_bps),
            slippage_rate: bps_to_rate(slippage_bps),
        }
    }

    /// Starting balance.
    #[must_use]
    pub const fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    /// Free cash.
    #[must_use]
    pub const fn cash(&self) -> Decimal {
        self.cash
    }

    /// Cumulative net realized P&L.
    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Fee rate as a decimal.
    #[must_use]
    pub const fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    /// Slippage rate as a decimal.
    #[must_use]
    pub const fn slippage_rate(&self) -> Decimal {
        self.slippage_rate
    }

    /// Open position for `symbol` and `side`.
    #[must_use]
    pub fn position(&self, symbol: &str, side: Side) -> Option<&Position> {
        self.positions.get(&PositionKey::new(symbol, side))
    }

    /// All open positions in key order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Number of open positions.
    #[must_use]
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Margin locked across all positions.
    #[must_use]
    pub fn total_margin(&self) -> Decimal {
        self.positions.values().map(|p| p.margin).sum()
    }

    /// Open or add to a position.
    ///
    /// Leverage <= 0 is treated as 1. Fails without touching the ledger if
    /// `margin + fee` exceeds cash.
    pub fn open(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        leverage: i64,
        price: Decimal,
        timestamp: TimestampMs,
    ) -> Result<OpenFill, AccountError> {
        if quantity <= Decimal::ZERO {
            return Err(AccountError::InvalidQuantity { quantity });
        }
        if price <= Decimal::ZERO {
            return Err(AccountError::InvalidPrice { price });
        }
        let leverage = normalize_leverage(leverage);

        let fill = fill_price(price, side, true, self.slippage_rate);
        let notional = fill * quantity;
        let margin = notional / Decimal::from(leverage);
        let fee = calculate_fee(fill, quantity, self.fee_rate);
        let required = margin + fee;

        if required > self.cash {
            return Err(AccountError::InsufficientFunds {
                required,
                available: self.cash,
            });
        }
        self.cash -= required;

        let key = PositionKey::new(symbol, side);
        let added = self.positions.contains_key(&key);
        let position = self
            .positions
            .entry(key)
            .and_modify(|p| p.add_fill(quantity, fill, margin, notional, fee))
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                side,
                quantity,
                entry_price: fill,
                leverage,
                margin,
                notional,
                liquidation_price: liquidation_price(side, fill, leverage),
                open_time: timestamp,
                accumulated_fee: fee,
                stop_loss: None,
                take_profit: None,
            })
            .clone();

        debug!(
            symbol,
            side = %side,
            quantity = %quantity,
            fill_price = %fill,
            margin = %margin,
            fee = %fee,
            added,
            "Opened position"
        );

        Ok(OpenFill {
            position,
            fee,
            fill_price: fill,
            margin,
            added,
        })
    }

    /// Close some or all of a position.
    ///
    /// A quantity <= 0 or above the held quantity closes the whole position.
    pub fn close(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<CloseFill, AccountError> {
        if price < Decimal::ZERO {
            return Err(AccountError::InvalidPrice { price });
        }
        let key = PositionKey::new(symbol, side);
        let Some(position) = self.positions.get_mut(&key) else {
            return Err(AccountError::PositionNotFound {
                symbol: symbol.to_string(),
                side,
            });
        };

        let held = position.quantity;
        let quantity = if quantity <= Decimal::ZERO || quantity > held {
            held
        } else {
            quantity
        };
        let fully_closed = quantity >= held;
        let ratio = quantity / held;

        let fill = fill_price(price, side, false, self.slippage_rate);
        let gross = side.pnl(position.entry_price, fill, quantity);
        let closing_fee = calculate_fee(fill, quantity, self.fee_rate);
        let opening_fee = if fully_closed {
            position.accumulated_fee
        } else {
            proportional_fee(position.accumulated_fee, quantity, held)
        };
        let released_margin = if fully_closed {
            position.margin
        } else {
            position.margin * ratio
        };
        let total_fee = closing_fee + opening_fee;
        let net = gross - total_fee;
        let leverage = position.leverage;

        self.cash += released_margin + gross - closing_fee;
        self.realized_pnl += net;

        if fully_closed {
            self.positions.remove(&key);
        } else {
            position.shrink(quantity, ratio, opening_fee);
        }

        debug!(
            symbol,
            side = %side,
            quantity = %quantity,
            fill_price = %fill,
            gross = %gross,
            net = %net,
            fully_closed,
            "Closed position"
        );

        Ok(CloseFill {
            net_realized: net,
            total_fee,
            fill_price: fill,
            gross_realized: gross,
            quantity,
            leverage,
            fully_closed,
        })
    }

    /// Arm protective stop and target levels on an open position.
    pub fn set_protection(
        &mut self,
        symbol: &str,
        side: Side,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), AccountError> {
        let position = self
            .positions
            .get_mut(&PositionKey::new(symbol, side))
            .ok_or_else(|| AccountError::PositionNotFound {
                symbol: symbol.to_string(),
                side,
            })?;
        position.stop_loss = stop_loss;
        position.take_profit = take_profit;
        Ok(())
    }

    /// Mark the account to market.
    ///
    /// Symbols missing from `prices` are marked at their entry price.
    #[must_use]
    pub fn total_equity(&self, prices: &PriceMap) -> EquityBreakdown {
        let mut margin = Decimal::ZERO;
        let mut unrealized = Decimal::ZERO;
        let mut per_position = BTreeMap::new();

        for (key, position) in &self.positions {
            let mark = prices
                .get(&position.symbol)
                .copied()
                .unwrap_or(position.entry_price);
            let pnl = position.unrealized_pnl(mark);
            margin += position.margin;
            unrealized += pnl;
            per_position.insert(key.to_string(), pnl);
        }

        EquityBreakdown {
            equity: self.cash + margin + unrealized,
            cash: self.cash,
            margin,
            unrealized,
            per_position,
        }
    }

    /// Force-close every position whose mark breaches its liquidation price.
    ///
    /// Breached positions are closed in full at the liquidation price.
    /// Positions without a quote are skipped.
    pub fn check_liquidation(
        &mut self,
        prices: &PriceMap,
        timestamp: TimestampMs,
        cycle: u64,
    ) -> Result<LiquidationReport, AccountError> {
        let breached: Vec<(PositionKey, Decimal, Decimal, Decimal)> = self
            .positions
            .iter()
            .filter_map(|(key, p)| {
                let mark = prices.get(&p.symbol).copied()?;
                p.is_liquidated_at(mark)
                    .then(|| (key.clone(), mark, p.liquidation_price, p.quantity))
            })
            .collect();

        let mut report = LiquidationReport::default();
        let mut notes = Vec::new();

        for (key, mark, liq_price, quantity) in breached {
            let fill = self.close(&key.symbol, key.side, quantity, liq_price)?;
            report.events.push(TradeEvent {
                timestamp,
                symbol: key.symbol.clone(),
                action: TradeAction::Liquidated,
                side: key.side,
                quantity: fill.quantity,
                price: fill.fill_price,
                fee: fill.total_fee,
                realized_pnl: fill.net_realized,
                leverage: fill.leverage,
                cycle,
                liquidation: true,
                note: format!("Liquidated at {mark:.4} (liq price: {liq_price:.4})"),
            });
            notes.push(format!("{} {} liquidated", key.symbol, key.side));
        }

        if !notes.is_empty() {
            report.note = Some(format!("Liquidations: {}", notes.join(", ")));
        }
        Ok(report)
    }

    /// Deep copy of the ledger.
    #[must_use]
    pub fn snapshot_state(&self) -> AccountState {
        AccountState {
            cash: self.cash,
            realized_pnl: self.realized_pnl,
            positions: self.positions.values().cloned().collect(),
        }
    }

    /// Replace the ledger with a copy of `state`.
    pub fn restore_state(&mut self, state: &AccountState) {
        self.cash = state.cash;
        self.realized_pnl = state.realized_pnl;
        self.positions = state
            .positions
            .iter()
            .map(|p| (p.key(), p.clone()))
            .collect();
    }
}

/// Coerce a requested leverage to the supported range.
#[must_use]
pub fn normalize_leverage(leverage: i64) -> u32 {
    u32::try_from(leverage.max(1)).unwrap_or(u32::MAX)
}
