//! Core types for backtest performance metrics.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::format::{format_decimal, format_pct, format_ratio};

/// Per-symbol trade statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStats {
    /// Counted trades for this symbol.
    pub total_trades: u64,
    /// Trades with positive net P&L.
    pub winning_trades: u64,
    /// Trades with negative net P&L.
    pub losing_trades: u64,
    /// Winning trades / total trades, in percent.
    pub win_rate_pct: Decimal,
    /// Sum of net P&L.
    pub total_pnl: Decimal,
    /// Mean net P&L per trade.
    pub avg_pnl: Decimal,
    /// Trades closing long positions.
    pub long_trades: u64,
    /// Trades closing short positions.
    pub short_trades: u64,
    /// Long win rate, in percent.
    pub long_win_rate_pct: Decimal,
    /// Short win rate, in percent.
    pub short_win_rate_pct: Decimal,
}

/// Performance report for one run.
///
/// Percent fields are expressed in percent (15.0 = 15%). Ratios are
/// annualized with the calculator's periods-per-year factor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Starting balance.
    pub initial_balance: Decimal,
    /// Equity of the last curve point.
    pub final_equity: Decimal,
    /// `final_equity - initial_balance`.
    pub total_return: Decimal,
    /// Total return in percent of the initial balance.
    pub total_return_pct: Decimal,
    /// Largest peak-to-trough decline as an amount.
    pub max_drawdown: Decimal,
    /// Largest peak-to-trough decline in percent of the peak.
    pub max_drawdown_pct: Decimal,
    /// Annualized Sharpe ratio of per-step returns.
    pub sharpe_ratio: Decimal,
    /// Annualized Sortino ratio of per-step returns.
    pub sortino_ratio: Decimal,
    /// Counted closing trades.
    pub total_trades: u64,
    /// Trades with positive net P&L.
    pub winning_trades: u64,
    /// Trades with negative net P&L.
    pub losing_trades: u64,
    /// Winning trades / total trades, in percent.
    pub win_rate_pct: Decimal,
    /// Fees attributed to counted trades.
    pub total_fees: Decimal,
    /// Mean winning P&L.
    pub avg_win: Decimal,
    /// Mean losing P&L (negative).
    pub avg_loss: Decimal,
    /// Best trade.
    pub largest_win: Decimal,
    /// Worst trade (negative).
    pub largest_loss: Decimal,
    /// Sum of wins / |sum of losses|. `None` when there are no losses.
    pub profit_factor: Option<Decimal>,
    /// Forced liquidations (excluded from the trade statistics).
    pub liquidations: u64,
    /// Statistics per symbol.
    pub symbol_stats: BTreeMap<String, SymbolStats>,
}

impl Metrics {
    /// Human-readable multi-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        [
            format!("Final equity:   {}", format_decimal(self.final_equity)),
            format!(
                "Total return:   {} ({})",
                format_decimal(self.total_return),
                format_pct(self.total_return_pct)
            ),
            format!(
                "Max drawdown:   {} ({})",
                format_decimal(self.max_drawdown),
                format_pct(self.max_drawdown_pct)
            ),
            format!("Sharpe:         {}", format_decimal(self.sharpe_ratio)),
            format!("Sortino:        {}", format_decimal(self.sortino_ratio)),
            format!(
                "Trades:         {} (win rate {})",
                self.total_trades,
                format_pct(self.win_rate_pct)
            ),
            format!("Profit factor:  {}", format_ratio(self.profit_factor)),
            format!("Liquidations:   {}", self.liquidations),
        ]
        .join("\n")
    }
}
