//! Simulation clock over loaded kline series.
//!
//! Ticks are the sorted union of every candle open time across symbols.
//! Series may have gaps; at each tick a symbol is priced from its latest
//! candle at or before that time.

use std::collections::BTreeMap;

use crate::backtest::types::{Kline, TimestampMs};

/// Ordered tick schedule.
#[derive(Debug, Clone, Default)]
pub struct SimulationClock {
    ticks: Vec<TimestampMs>,
}

impl SimulationClock {
    /// Build from per-symbol series.
    #[must_use]
    pub fn new(series: &BTreeMap<String, Vec<Kline>>) -> Self {
        let mut ticks: Vec<TimestampMs> = series
            .values()
            .flat_map(|klines| klines.iter().map(|k| k.open_time))
            .collect();
        ticks.sort_unstable();
        ticks.dedup();
        Self { ticks }
    }

    /// Number of ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Whether there is nothing to simulate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Ticks in order.
    pub fn ticks(&self) -> impl Iterator<Item = TimestampMs> + '_ {
        self.ticks.iter().copied()
    }
}

/// Number of candles in `klines` opened at or before `at`.
///
/// `klines` must be sorted by open time.
#[must_use]
pub fn visible_len(klines: &[Kline], at: TimestampMs) -> usize {
    klines.partition_point(|k| k.open_time <= at)
}

/// Latest candle at or before `at`.
#[must_use]
pub fn latest_at(klines: &[Kline], at: TimestampMs) -> Option<&Kline> {
    visible_len(klines, at)
        .checked_sub(1)
        .and_then(|i| klines.get(i))
}

/// Up to `window` most recent candles at or before `at`, oldest first.
#[must_use]
pub fn window_at(klines: &[Kline], at: TimestampMs, window: usize) -> &[Kline] {
    let end = visible_len(klines, at);
    &klines[end.saturating_sub(window)..end]
}

/// Sort by open time and drop duplicate open times, keeping the last one supplied.
pub fn normalize_series(klines: &mut Vec<Kline>) {
    klines.reverse();
    klines.sort_by_key(|k| k.open_time);
    klines.dedup_by_key(|k| k.open_time);
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn series(times: &[TimestampMs]) -> Vec<Kline> {
        times.iter().map(|t| Kline::flat(*t, dec!(100))).collect()
    }

    #[test]
    fn test_union_of_open_times() {
        let map = BTreeMap::from([
            ("BTCUSDT".to_string(), series(&[1, 2, 4])),
            ("ETHUSDT".to_string(), series(&[2, 3])),
        ]);
        let clock = SimulationClock::new(&map);
        assert_eq!(clock.ticks().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(clock.len(), 4);
    }

    #[test]
    fn test_empty() {
        assert!(SimulationClock::new(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_latest_and_window_with_gaps() {
        let klines = series(&[10, 20, 40]);
        assert!(latest_at(&klines, 5).is_none());
        assert_eq!(latest_at(&klines, 30).map(|k| k.open_time), Some(20));
        assert_eq!(latest_at(&klines, 40).map(|k| k.open_time), Some(40));

        let window = window_at(&klines, 40, 2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].open_time, 20);
        assert!(window_at(&klines, 5, 3).is_empty());
    }

    #[test]
    fn test_normalize_series() {
        let mut klines = vec![
            Kline::flat(3, dec!(1)),
            Kline::flat(1, dec!(1)),
            Kline::flat(3, dec!(2)),
        ];
        normalize_series(&mut klines);
        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].open_time, 1);
        assert_eq!(klines[1].close, dec!(2));
    }
}
