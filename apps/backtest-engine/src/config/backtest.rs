//! Backtest run settings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::{RiskControls, RunConfig};

/// `backtest` section. Missing fields take [`RunConfig`] defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Fixed run id. Generated when empty.
    pub run_id: Option<String>,
    /// Symbols to trade. Empty means every configured kline file.
    pub symbols: Vec<String>,
    /// Starting cash.
    pub initial_balance: Decimal,
    /// Taker fee in basis points.
    pub fee_bps: Decimal,
    /// Slippage in basis points.
    pub slippage_bps: Decimal,
    /// Candles per symbol in each market snapshot.
    pub kline_window: usize,
    /// Request decisions every N ticks.
    pub decision_interval_bars: u64,
    /// Leverage for decisions that omit it.
    pub default_leverage: i64,
    /// Margin fraction of equity for decisions that omit it.
    pub default_position_fraction: Decimal,
    /// Equity samples per year for ratio annualization.
    pub periods_per_year: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        let run = RunConfig::default();
        Self {
            run_id: run.run_id,
            symbols: run.symbols,
            initial_balance: run.initial_balance,
            fee_bps: run.fee_bps,
            slippage_bps: run.slippage_bps,
            kline_window: run.kline_window,
            decision_interval_bars: run.decision_interval_bars,
            default_leverage: run.default_leverage,
            default_position_fraction: run.default_position_fraction,
            periods_per_year: run.periods_per_year,
        }
    }
}

impl BacktestConfig {
    /// Build the runner configuration.
    #[must_use]
    pub fn to_run_config(&self, risk_control: &RiskControls) -> RunConfig {
        RunConfig {
            run_id: self.run_id.clone().filter(|id| !id.trim().is_empty()),
            symbols: self.symbols.clone(),
            initial_balance: self.initial_balance,
            fee_bps: self.fee_bps,
            slippage_bps: self.slippage_bps,
            kline_window: self.kline_window,
            decision_interval_bars: self.decision_interval_bars,
            default_leverage: self.default_leverage,
            default_position_fraction: self.default_position_fraction,
            periods_per_year: self.periods_per_year,
            risk_control: risk_control.clone(),
        }
    }
}
