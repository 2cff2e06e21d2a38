//! Per-run configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::risk::{RiskControls, SizingDefaults};
use crate::backtest::metrics::TRADING_DAYS;

/// Configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run identifier. Generated when absent.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Symbols to trade. Empty means every symbol with loaded klines.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Starting cash.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Taker fee in basis points of notional.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: Decimal,
    /// Adverse slippage in basis points.
    #[serde(default)]
    pub slippage_bps: Decimal,
    /// Candles per symbol included in each market snapshot.
    #[serde(default = "default_kline_window")]
    pub kline_window: usize,
    /// Decisions are requested every N ticks.
    #[serde(default = "default_decision_interval_bars")]
    pub decision_interval_bars: u64,
    /// Leverage for decisions that omit it.
    #[serde(default = "default_leverage")]
    pub default_leverage: i64,
    /// Margin fraction of equity for decisions that omit it.
    #[serde(default = "default_position_fraction")]
    pub default_position_fraction: Decimal,
    /// Equity samples per year for Sharpe/Sortino annualization.
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
    /// Risk limits.
    #[serde(default)]
    pub risk_control: RiskControls,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: None,
            symbols: Vec::new(),
            initial_balance: default_initial_balance(),
            fee_bps: default_fee_bps(),
            slippage_bps: Decimal::ZERO,
            kline_window: default_kline_window(),
            decision_interval_bars: default_decision_interval_bars(),
            default_leverage: default_leverage(),
            default_position_fraction: default_position_fraction(),
            periods_per_year: default_periods_per_year(),
            risk_control: RiskControls::default(),
        }
    }
}

impl RunConfig {
    /// Config with the given run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Config trading the given symbols.
    #[must_use]
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Sizing defaults derived from this config.
    #[must_use]
    pub const fn sizing_defaults(&self) -> SizingDefaults {
        SizingDefaults {
            leverage: self.default_leverage,
            position_fraction: self.default_position_fraction,
        }
    }

    /// Whether a decision should be requested on `cycle`.
    #[must_use]
    pub const fn is_decision_cycle(&self, cycle: u64) -> bool {
        cycle % if self.decision_interval_bars == 0 {
            1
        } else {
            self.decision_interval_bars
        } == 0
    }
}

const fn default_initial_balance() -> Decimal {
    Decimal::from_parts(1000, 0, 0, false, 0)
}

const fn default_fee_bps() -> Decimal {
    Decimal::from_parts(4, 0, 0, false, 0)
}

const fn default_kline_window() -> usize {
    50
}

const fn default_decision_interval_bars() -> u64 {
    1
}

const fn default_leverage() -> i64 {
    5
}

const fn default_position_fraction() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 1) // 0.1
}

const fn default_periods_per_year() -> u32 {
    TRADING_DAYS
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.initial_balance, dec!(1000));
        assert_eq!(config.fee_bps, dec!(4));
        assert_eq!(config.default_position_fraction, dec!(0.1));
        assert_eq!(config.periods_per_year, 252);
        assert!(config.run_id.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RunConfig =
            serde_json::from_str(r#"{"symbols":["BTCUSDT"],"decision_interval_bars":4}"#).unwrap();
        assert_eq!(config.symbols, vec!["BTCUSDT".to_string()]);
        assert_eq!(config.decision_interval_bars, 4);
        assert_eq!(config.kline_window, 50);
        assert_eq!(config.risk_control, RiskControls::default());
    }

    #[test]
    fn test_decision_cadence() {
        let mut config = RunConfig::default();
        assert!(config.is_decision_cycle(7));

        config.decision_interval_bars = 3;
        assert!(config.is_decision_cycle(0));
        assert!(!config.is_decision_cycle(1));
        assert!(config.is_decision_cycle(6));

        config.decision_interval_bars = 0;
        assert!(config.is_decision_cycle(5));
    }
}
