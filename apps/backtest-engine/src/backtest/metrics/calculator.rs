//! Performance calculator for backtest results.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::constants::{HUNDRED, TRADING_DAYS};
use super::math::{mean, population_std_dev, sqrt_decimal};
use super::types::Metrics;
use crate::backtest::types::{EquityPoint, Side, TradeEvent};

/// Reduces an equity curve and trade log into [`Metrics`].
///
/// Sharpe and Sortino scale per-step ratios by `sqrt(periods_per_year)`.
/// The default of 252 treats every equity sample as one trading day, which
/// only matches reality for daily decision cadences.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator {
    periods_per_year: u32,
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self {
            periods_per_year: TRADING_DAYS,
        }
    }
}

impl MetricsCalculator {
    /// Calculator with the default annualization factor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the number of equity samples per year.
    #[must_use]
    pub fn with_periods_per_year(mut self, periods: u32) -> Self {
        self.periods_per_year = periods.max(1);
        self
    }

    /// Calculate all performance metrics. Inputs are not modified.
    #[must_use]
    pub fn calculate(
        &self,
        initial_balance: Decimal,
        equity_curve: &[EquityPoint],
        trades: &[TradeEvent],
    ) -> Metrics {
        let final_equity = equity_curve.last().map_or(initial_balance, |p| p.equity);
        let total_return = final_equity - initial_balance;
        let total_return_pct = if initial_balance > Decimal::ZERO {
            total_return / initial_balance * HUNDRED
        } else {
            Decimal::ZERO
        };

        let (max_drawdown, max_drawdown_pct) = drawdown(equity_curve);
        let returns = period_returns(equity_curve);
        let annualizer = sqrt_decimal(Decimal::from(self.periods_per_year)).unwrap_or(Decimal::ONE);

        let mut metrics = Metrics {
            initial_balance,
            final_equity,
            total_return,
            total_return_pct,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio: sharpe(&returns, annualizer),
            sortino_ratio: sortino(&returns, annualizer),
            liquidations: trades.iter().filter(|t| t.liquidation).count() as u64,
            ..Metrics::default()
        };
        accumulate_trades(&mut metrics, trades);
        metrics
    }
}

/// Closing events with non-zero net P&L, excluding liquidations.
fn counted_trades(trades: &[TradeEvent]) -> impl Iterator<Item = &TradeEvent> {
    trades
        .iter()
        .filter(|t| t.action.is_closing() && !t.liquidation && !t.realized_pnl.is_zero())
}

fn accumulate_trades(metrics: &mut Metrics, trades: &[TradeEvent]) {
    let mut gross_profit = Decimal::ZERO;
    let mut gross_loss = Decimal::ZERO;
    let mut long_wins: BTreeMap<&str, u64> = BTreeMap::new();
    let mut short_wins: BTreeMap<&str, u64> = BTreeMap::new();

    for trade in counted_trades(trades) {
        let pnl = trade.realized_pnl;
        let won = pnl > Decimal::ZERO;
        metrics.total_trades += 1;
        metrics.total_fees += trade.fee;

        if won {
            metrics.winning_trades += 1;
            gross_profit += pnl;
            metrics.largest_win = metrics.largest_win.max(pnl);
        } else {
            metrics.losing_trades += 1;
            gross_loss += pnl;
            metrics.largest_loss = metrics.largest_loss.min(pnl);
        }

        let stats = metrics.symbol_stats.entry(trade.symbol.clone()).or_default();
        stats.total_trades += 1;
        stats.total_pnl += pnl;
        if won {
            stats.winning_trades += 1;
        } else {
            stats.losing_trades += 1;
        }
        match trade.side {
            Side::Long => {
                stats.long_trades += 1;
                if won {
                    *long_wins.entry(&trade.symbol).or_default() += 1;
                }
            }
            Side::Short => {
                stats.short_trades += 1;
                if won {
                    *short_wins.entry(&trade.symbol).or_default() += 1;
                }
            }
        }
    }

    metrics.win_rate_pct = percent(metrics.winning_trades, metrics.total_trades);
    metrics.avg_win = average(gross_profit, metrics.winning_trades);
    metrics.avg_loss = average(gross_loss, metrics.losing_trades);
    metrics.profit_factor = (!gross_loss.is_zero()).then(|| gross_profit / gross_loss.abs());

    for (symbol, stats) in &mut metrics.symbol_stats {
        let symbol = symbol.as_str();
        stats.win_rate_pct = percent(stats.winning_trades, stats.total_trades);
        stats.avg_pnl = average(stats.total_pnl, stats.total_trades);
        stats.long_win_rate_pct =
            percent(long_wins.get(symbol).copied().unwrap_or(0), stats.long_trades);
        stats.short_win_rate_pct =
            percent(short_wins.get(symbol).copied().unwrap_or(0), stats.short_trades);
    }
}

fn percent(part: u64, whole: u64) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(part) / Decimal::from(whole) * HUNDRED
}

fn average(sum: Decimal, count: u64) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    sum / Decimal::from(count)
}

/// Max drawdown as `(peak_at_max * fraction, fraction * 100)`.
fn drawdown(curve: &[EquityPoint]) -> (Decimal, Decimal) {
    let Some(first) = curve.first() else {
        return (Decimal::ZERO, Decimal::ZERO);
    };

    let mut peak = first.equity;
    let mut max_fraction = Decimal::ZERO;
    let mut peak_at_max = Decimal::ZERO;

    for point in curve {
        if point.equity > peak {
            peak = point.equity;
        }
        if peak > Decimal::ZERO {
            let fraction = (peak - point.equity) / peak;
            if fraction > max_fraction {
                max_fraction = fraction;
                peak_at_max = peak;
            }
        }
    }

    (peak_at_max * max_fraction, max_fraction * HUNDRED)
}

fn period_returns(curve: &[EquityPoint]) -> Vec<Decimal> {
    curve
        .windows(2)
        .filter(|w| w[0].equity > Decimal::ZERO)
        .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
        .collect()
}

/// Sharpe = mean / std * annualizer.
fn sharpe(returns: &[Decimal], annualizer: Decimal) -> Decimal {
    let std = population_std_dev(returns);
    if std.is_zero() {
        return Decimal::ZERO;
    }
    mean(returns).map_or(Decimal::ZERO, |avg| avg / std * annualizer)
}

/// Sortino = mean / std(negative returns) * annualizer.
fn sortino(returns: &[Decimal], annualizer: Decimal) -> Decimal {
    let negatives: Vec<Decimal> = returns
        .iter()
        .filter(|r| **r < Decimal::ZERO)
        .copied()
        .collect();
    let downside = population_std_dev(&negatives);
    if downside.is_zero() {
        return Decimal::ZERO;
    }
    mean(returns).map_or(Decimal::ZERO, |avg| avg / downside * annualizer)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::backtest::types::TradeAction;

    fn curve(values: &[Decimal]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| EquityPoint::new(i as i64, *v))
            .collect()
    }

    fn trade(symbol: &str, side: Side, action: TradeAction, pnl: Decimal) -> TradeEvent {
        TradeEvent {
            timestamp: 0,
            symbol: symbol.to_string(),
            action,
            side,
            quantity: dec!(1),
            price: dec!(100),
            fee: dec!(0.1),
            realized_pnl: pnl,
            leverage: 5,
            cycle: 0,
            liquidation: action == TradeAction::Liquidated,
            note: String::new(),
        }
    }

    #[test]
    fn test_empty_inputs() {
        let metrics = MetricsCalculator::new().calculate(dec!(1000), &[], &[]);
        assert_eq!(metrics.final_equity, dec!(1000));
        assert_eq!(metrics.total_return, Decimal::ZERO);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate_pct, Decimal::ZERO);
        assert_eq!(metrics.profit_factor, None);
    }

    #[test]
    fn test_flat_curve() {
        let flat = curve(&[dec!(1000); 10]);
        let metrics = MetricsCalculator::new().calculate(dec!(1000), &flat, &[]);
        assert_eq!(metrics.sharpe_ratio, Decimal::ZERO);
        assert_eq!(metrics.sortino_ratio, Decimal::ZERO);
        assert_eq!(metrics.max_drawdown_pct, Decimal::ZERO);
        assert_eq!(metrics.max_drawdown, Decimal::ZERO);
    }

    #[test]
    fn test_single_point_has_no_ratios() {
        let metrics = MetricsCalculator::new().calculate(dec!(1000), &curve(&[dec!(1100)]), &[]);
        assert_eq!(metrics.sharpe_ratio, Decimal::ZERO);
        assert_eq!(metrics.total_return, dec!(100));
        assert_eq!(metrics.total_return_pct, dec!(10));
    }

    #[test]
    fn test_drawdown_calculation() {
        let points = curve(&[
            dec!(100000),
            dec!(110000),
            dec!(105000),
            dec!(108000),
            dec!(95000),
            dec!(100000),
        ]);
        let metrics = MetricsCalculator::new().calculate(dec!(100000), &points, &[]);

        let fraction = (dec!(110000) - dec!(95000)) / dec!(110000);
        assert_eq!(metrics.max_drawdown_pct, fraction * HUNDRED);
        assert!((metrics.max_drawdown - dec!(15000)).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_sharpe_and_sortino() {
        // Returns: +10%, -10%, +10%
        let points = curve(&[dec!(100), dec!(110), dec!(99), dec!(108.9)]);
        let metrics = MetricsCalculator::new()
            .with_periods_per_year(1)
            .calculate(dec!(100), &points, &[]);

        // mean = 1/30, population std = 0.0942809..., ratio = 0.35355...
        assert!((metrics.sharpe_ratio - dec!(0.353553)).abs() < dec!(0.00001));
        // One negative return has zero deviation
        assert_eq!(metrics.sortino_ratio, Decimal::ZERO);
    }

    #[test]
    fn test_sortino_uses_negative_returns() {
        // Returns: +10%, -10%, +20%, -20%
        let points = curve(&[dec!(100), dec!(110), dec!(99), dec!(118.8), dec!(95.04)]);
        let metrics = MetricsCalculator::new()
            .with_periods_per_year(1)
            .calculate(dec!(100), &points, &[]);

        // mean = 0, so both ratios vanish even with a non-zero downside deviation
        assert!(metrics.sortino_ratio.abs() < dec!(0.000001));

        let annualized = MetricsCalculator::new().calculate(dec!(100), &points, &[]);
        assert!(annualized.sharpe_ratio.abs() < dec!(0.00001));
    }

    #[test]
    fn test_sortino_with_downside_deviation() {
        // Returns: -10%, -20%, +50%
        let points = curve(&[dec!(100), dec!(90), dec!(72), dec!(108)]);
        let metrics = MetricsCalculator::new()
            .with_periods_per_year(1)
            .calculate(dec!(100), &points, &[]);

        // mean = 1/15, downside returns -0.1 and -0.2 have std 0.05
        assert!((metrics.sortino_ratio - dec!(1.333333)).abs() < dec!(0.00001));
        // population std over all three returns = 0.30912...
        assert!((metrics.sharpe_ratio - dec!(0.215666)).abs() < dec!(0.0001));
    }

    #[test]
    fn test_trade_statistics() {
        let trades = vec![
            trade("BTCUSDT", Side::Long, TradeAction::Open, Decimal::ZERO),
            trade("BTCUSDT", Side::Long, TradeAction::Close, dec!(30)),
            trade("BTCUSDT", Side::Short, TradeAction::Close, dec!(-10)),
            trade("ETHUSDT", Side::Long, TradeAction::TakeProfit, dec!(20)),
            trade("ETHUSDT", Side::Short, TradeAction::StopLoss, dec!(-20)),
            trade("ETHUSDT", Side::Long, TradeAction::Close, Decimal::ZERO),
            trade("ETHUSDT", Side::Long, TradeAction::Liquidated, dec!(-50)),
        ];

        let metrics = MetricsCalculator::new().calculate(dec!(1000), &[], &trades);
        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 2);
        assert_eq!(metrics.win_rate_pct, dec!(50));
        assert_eq!(metrics.total_fees, dec!(0.4));
        assert_eq!(metrics.avg_win, dec!(25));
        assert_eq!(metrics.avg_loss, dec!(-15));
        assert_eq!(metrics.largest_win, dec!(30));
        assert_eq!(metrics.largest_loss, dec!(-20));
        assert_eq!(metrics.profit_factor, Some(dec!(50) / dec!(30)));
        assert_eq!(metrics.liquidations, 1);

        let Some(btc) = metrics.symbol_stats.get("BTCUSDT") else {
            panic!("BTCUSDT stats missing");
        };
        assert_eq!(btc.total_trades, 2);
        assert_eq!(btc.win_rate_pct, dec!(50));
        assert_eq!(btc.total_pnl, dec!(20));
        assert_eq!(btc.avg_pnl, dec!(10));
        assert_eq!(btc.long_trades, 1);
        assert_eq!(btc.short_trades, 1);
        assert_eq!(btc.long_win_rate_pct, dec!(100));
        assert_eq!(btc.short_win_rate_pct, Decimal::ZERO);
    }

    #[test]
    fn test_per_symbol_win_rate_uses_symbol_counts() {
        let trades = vec![
            trade("BTCUSDT", Side::Long, TradeAction::Close, dec!(5)),
            trade("ETHUSDT", Side::Long, TradeAction::Close, dec!(5)),
            trade("ETHUSDT", Side::Long, TradeAction::Close, dec!(-5)),
            trade("ETHUSDT", Side::Long, TradeAction::Close, dec!(-5)),
            trade("ETHUSDT", Side::Long, TradeAction::Close, dec!(5)),
        ];
        let metrics = MetricsCalculator::new().calculate(dec!(1000), &[], &trades);
        assert_eq!(metrics.symbol_stats["BTCUSDT"].win_rate_pct, dec!(100));
        assert_eq!(metrics.symbol_stats["ETHUSDT"].win_rate_pct, dec!(50));
    }

    #[test]
    fn test_profit_factor_none_without_losses() {
        let trades = vec![trade("BTCUSDT", Side::Long, TradeAction::Close, dec!(5))];
        let metrics = MetricsCalculator::new().calculate(dec!(1000), &[], &trades);
        assert_eq!(metrics.profit_factor, None);
        assert_eq!(metrics.win_rate_pct, dec!(100));
    }

    #[test]
    fn test_summary_mentions_key_figures() {
        let metrics = MetricsCalculator::new().calculate(dec!(1000), &curve(&[dec!(1100)]), &[]);
        let summary = metrics.summary();
        assert!(summary.contains("Final equity:   1100.00"));
        assert!(summary.contains("Profit factor:  N/A"));
    }
}
