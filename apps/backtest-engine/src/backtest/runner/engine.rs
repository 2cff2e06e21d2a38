//! Decision-driven simulation loop.
//!
//! Each tick of the [`SimulationClock`] is one cycle:
//!
//! 1. Liquidation checks against the latest closes
//! 2. Protective stop-loss / take-profit exits on the current candle
//! 3. Decision requests, one per symbol, on decision cycles
//! 4. Risk-checked opens and closes against the account
//! 5. Sink writes, then an equity point and a published state copy
//!
//! Symbols liquidated or stopped out in steps 1-2 are not asked for a
//! decision that cycle. The account lives inside the loop; callers only
//! see copies published at cycle boundaries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::clock::{SimulationClock, latest_at, normalize_series, window_at};
use super::config::RunConfig;
use super::error::RunnerError;
use super::metadata::{RunMetadata, RunStatus};
use super::risk::AccountView;
use crate::application::ports::{
    DecisionSourcePort, EquitySnapshot, EquitySnapshotSink, FillRecord, NoOpSink, OrderRecord,
    OrderSink,
};
use crate::backtest::account::{AccountState, EquityBreakdown, PriceMap, SimulatedAccount};
use crate::backtest::decision::{Decision, DecisionAction, MarketSnapshot};
use crate::backtest::metrics::{Metrics, MetricsCalculator};
use crate::backtest::triggers::{evaluate_triggers, protective_levels};
use crate::backtest::types::{EquityPoint, Kline, Side, TimestampMs, TradeAction, TradeEvent};
use crate::error::ErrorReport;

/// Collaborators injected into every runner.
#[derive(Clone)]
pub struct RunnerPorts {
    /// Source of trading decisions.
    pub decision_source: Arc<dyn DecisionSourcePort>,
    /// Equity snapshot sink.
    pub snapshot_sink: Arc<dyn EquitySnapshotSink>,
    /// Order and fill sink.
    pub order_sink: Arc<dyn OrderSink>,
}

impl RunnerPorts {
    /// Ports with the given decision source and discarding sinks.
    #[must_use]
    pub fn new(decision_source: Arc<dyn DecisionSourcePort>) -> Self {
        Self {
            decision_source,
            snapshot_sink: Arc::new(NoOpSink),
            order_sink: Arc::new(NoOpSink),
        }
    }

    /// Replace both sinks.
    #[must_use]
    pub fn with_sinks(
        mut self,
        snapshot_sink: Arc<dyn EquitySnapshotSink>,
        order_sink: Arc<dyn OrderSink>,
    ) -> Self {
        self.snapshot_sink = snapshot_sink;
        self.order_sink = order_sink;
        self
    }
}

impl std::fmt::Debug for RunnerPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerPorts").finish_non_exhaustive()
    }
}

/// State visible outside the loop.
#[derive(Debug)]
struct PublishedState {
    metadata: RunMetadata,
    equity_curve: Vec<EquityPoint>,
    trades: Vec<TradeEvent>,
    account: AccountState,
}

/// Loop-private state.
struct Simulation {
    account: SimulatedAccount,
    series: BTreeMap<String, Vec<Kline>>,
    symbols: Vec<String>,
    order_seq: u64,
}

impl Simulation {
    fn prices_at(&self, at: TimestampMs) -> PriceMap {
        self.symbols
            .iter()
            .filter_map(|symbol| {
                let kline = latest_at(self.series.get(symbol)?, at)?;
                Some((symbol.clone(), kline.close))
            })
            .collect()
    }

    /// Candle opened exactly at `at`. Stale candles are not re-evaluated.
    fn candle_at(&self, symbol: &str, at: TimestampMs) -> Option<&Kline> {
        latest_at(self.series.get(symbol)?, at).filter(|k| k.open_time == at)
    }

    fn snapshot(&self, tick: Tick, window: usize, equity: &EquityBreakdown) -> MarketSnapshot {
        let klines = self
            .symbols
            .iter()
            .filter_map(|symbol| {
                let recent = window_at(self.series.get(symbol)?, tick.timestamp, window);
                (!recent.is_empty()).then(|| (symbol.clone(), recent.to_vec()))
            })
            .collect();
        MarketSnapshot {
            timestamp: tick.timestamp,
            cycle: tick.cycle,
            klines,
            positions: self.account.positions().cloned().collect(),
            equity: equity.equity,
            cash: equity.cash,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tick {
    timestamp: TimestampMs,
    cycle: u64,
}

enum Outcome {
    Completed,
    Cancelled,
}

/// One backtest run.
pub struct Runner {
    run_id: String,
    config: RunConfig,
    ports: RunnerPorts,
    klines: RwLock<BTreeMap<String, Vec<Kline>>>,
    state: RwLock<PublishedState>,
    status_tx: watch::Sender<RunStatus>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("run_id", &self.run_id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Create a pending run.
    #[must_use]
    pub fn new(run_id: impl Into<String>, config: RunConfig, ports: RunnerPorts) -> Self {
        let run_id = run_id.into();
        let account =
            SimulatedAccount::new(config.initial_balance, config.fee_bps, config.slippage_bps);
        let symbols = config
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .collect();
        let (status_tx, _) = watch::channel(RunStatus::Pending);

        Self {
            state: RwLock::new(PublishedState {
                metadata: RunMetadata::new(&run_id, symbols, config.initial_balance),
                equity_curve: Vec::new(),
                trades: Vec::new(),
                account: account.snapshot_state(),
            }),
            run_id,
            config,
            ports,
            klines: RwLock::new(BTreeMap::new()),
            status_tx,
        }
    }

    /// Run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run configuration.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.state.read().metadata.status
    }

    /// Copy of the run metadata.
    #[must_use]
    pub fn metadata(&self) -> RunMetadata {
        self.state.read().metadata.clone()
    }

    /// Copy of the equity curve so far.
    #[must_use]
    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.state.read().equity_curve.clone()
    }

    /// Copy of the trade log so far.
    #[must_use]
    pub fn trades(&self) -> Vec<TradeEvent> {
        self.state.read().trades.clone()
    }

    /// Copy of the ledger as of the last completed cycle.
    #[must_use]
    pub fn account_state(&self) -> AccountState {
        self.state.read().account.clone()
    }

    /// Metrics over the logs collected so far.
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        let state = self.state.read();
        MetricsCalculator::new()
            .with_periods_per_year(self.config.periods_per_year)
            .calculate(
                self.config.initial_balance,
                &state.equity_curve,
                &state.trades,
            )
    }

    /// Symbols with loaded klines.
    #[must_use]
    pub fn loaded_symbols(&self) -> Vec<String> {
        self.klines.read().keys().cloned().collect()
    }

    /// Add historical candles for `symbol`. Only allowed while pending.
    ///
    /// Candles are merged with any already loaded, sorted by open time,
    /// and de-duplicated. Returns the number of candles held for the symbol.
    pub fn load_klines(&self, symbol: &str, klines: Vec<Kline>) -> Result<usize, RunnerError> {
        let state = self.state.read();
        if state.metadata.status != RunStatus::Pending {
            return Err(RunnerError::InvalidState {
                run_id: self.run_id.clone(),
                status: state.metadata.status,
            });
        }

        let mut loaded = self.klines.write();
        let series = loaded.entry(symbol.trim().to_uppercase()).or_default();
        series.extend(klines);
        normalize_series(series);
        debug!(run_id = %self.run_id, symbol, candles = series.len(), "Klines loaded");
        Ok(series.len())
    }

    /// Move a pending run to running.
    pub fn mark_running(&self) -> Result<(), RunnerError> {
        self.transition(RunStatus::Running, None)
            .map(|_| ())
            .map_err(|status| RunnerError::InvalidState {
                run_id: self.run_id.clone(),
                status,
            })
    }

    /// Cancel a run that never started. Returns false if it already left `Pending`.
    pub fn cancel_pending(&self) -> bool {
        self.transition_from(RunStatus::Pending, RunStatus::Cancelled)
    }

    /// Wait until the run reaches a terminal status.
    pub async fn wait(&self) -> RunStatus {
        let mut rx = self.status_tx.subscribe();
        if let Ok(status) = rx.wait_for(RunStatus::is_terminal).await {
            return *status;
        }
        self.status()
    }

    /// Execute the simulation loop to a terminal status.
    ///
    /// Accepts a pending or already running run. Cancellation is observed
    /// at cycle boundaries and while waiting on the decision source.
    pub async fn run(&self, cancel: CancellationToken) -> RunStatus {
        if self.status() == RunStatus::Pending && self.mark_running().is_err() {
            return self.status();
        }
        if self.status() != RunStatus::Running {
            return self.status();
        }

        let (status, report) = match self.simulate(&cancel).await {
            Ok(Outcome::Completed) => (RunStatus::Completed, None),
            Ok(Outcome::Cancelled) => (RunStatus::Cancelled, None),
            Err(err) => {
                error!(run_id = %self.run_id, code = %err.code(), error = %err, "Backtest failed");
                let report = ErrorReport::new(err.code(), err.to_string())
                    .with_context("run_id", self.run_id.clone());
                (RunStatus::Failed, Some(report))
            }
        };

        match self.transition(status, report) {
            Ok(status) | Err(status) => status,
        }
    }

    fn transition(
        &self,
        next: RunStatus,
        report: Option<ErrorReport>,
    ) -> Result<RunStatus, RunStatus> {
        let mut state = self.state.write();
        if !state.metadata.transition(next) {
            return Err(state.metadata.status);
        }
        if report.is_some() {
            state.metadata.error = report;
        }
        drop(state);
        self.status_tx.send_replace(next);
        Ok(next)
    }

    /// Move from `from` to `next` only if the run is still in `from`.
    /// The check and the move happen under one write lock.
    fn transition_from(&self, from: RunStatus, next: RunStatus) -> bool {
        let mut state = self.state.write();
        if state.metadata.status != from || !state.metadata.transition(next) {
            return false;
        }
        drop(state);
        self.status_tx.send_replace(next);
        true
    }

    fn prepare(&self) -> Result<Simulation, RunnerError> {
        let loaded = self.klines.read().clone();
        if loaded.values().all(Vec::is_empty) {
            return Err(RunnerError::StructuralFailure {
                message: "no klines loaded".to_string(),
            });
        }

        let configured = self.state.read().metadata.symbols.clone();
        let symbols: Vec<String> = if configured.is_empty() {
            loaded
                .iter()
                .filter(|(_, k)| !k.is_empty())
                .map(|(s, _)| s.clone())
                .collect()
        } else {
            configured
        };

        let mut series = BTreeMap::new();
        for symbol in &symbols {
            match loaded.get(symbol) {
                Some(klines) if !klines.is_empty() => {
                    series.insert(symbol.clone(), klines.clone());
                }
                _ => {
                    return Err(RunnerError::StructuralFailure {
                        message: format!("no klines loaded for {symbol}"),
                    });
                }
            }
        }

        Ok(Simulation {
            account: SimulatedAccount::new(
                self.config.initial_balance,
                self.config.fee_bps,
                self.config.slippage_bps,
            ),
            series,
            symbols,
            order_seq: 0,
        })
    }

    async fn simulate(&self, cancel: &CancellationToken) -> Result<Outcome, RunnerError> {
        let mut sim = self.prepare()?;
        let clock = SimulationClock::new(&sim.series);
        {
            let mut state = self.state.write();
            state.metadata.symbols.clone_from(&sim.symbols);
            state.metadata.total_cycles = clock.len() as u64;
        }

        info!(
            run_id = %self.run_id,
            symbols = ?sim.symbols,
            ticks = clock.len(),
            initial_balance = %self.config.initial_balance,
            "Backtest started"
        );

        let mut cycle: u64 = 0;
        for timestamp in clock.ticks() {
            if cancel.is_cancelled() {
                info!(run_id = %self.run_id, cycle, "Backtest cancelled");
                return Ok(Outcome::Cancelled);
            }
            let tick = Tick { timestamp, cycle };
            if !self.step(&mut sim, tick, cancel).await? {
                info!(run_id = %self.run_id, cycle, "Backtest cancelled mid-cycle");
                return Ok(Outcome::Cancelled);
            }
            cycle += 1;
        }

        let state = self.state.read();
        info!(
            run_id = %self.run_id,
            cycles = cycle,
            final_equity = %state.metadata.last_equity,
            trades = state.trades.len(),
            "Backtest completed"
        );
        Ok(Outcome::Completed)
    }

    /// Run one cycle. Returns false when cancelled before the cycle finished,
    /// in which case nothing from this cycle is published.
    async fn step(
        &self,
        sim: &mut Simulation,
        tick: Tick,
        cancel: &CancellationToken,
    ) -> Result<bool, RunnerError> {
        let prices = sim.prices_at(tick.timestamp);
        let mut events = Vec::new();
        let mut skip = BTreeSet::new();

        let report = sim
            .account
            .check_liquidation(&prices, tick.timestamp, tick.cycle)?;
        if let Some(note) = &report.note {
            warn!(run_id = %self.run_id, cycle = tick.cycle, %note, "Positions liquidated");
        }
        skip.extend(report.events.iter().map(|e| e.symbol.clone()));
        events.extend(report.events);

        events.extend(self.protective_exits(sim, tick, &mut skip));

        if self.config.is_decision_cycle(tick.cycle) {
            let equity = sim.account.total_equity(&prices);
            let snapshot = sim.snapshot(tick, self.config.kline_window, &equity);

            for symbol in sim.symbols.clone() {
                if skip.contains(&symbol) {
                    continue;
                }
                let Some(&price) = prices.get(&symbol) else {
                    continue;
                };

                // A cancel here abandons the cycle; nothing from it is published.
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(false),
                    result = self.ports.decision_source.decide(&snapshot, &symbol) => result,
                };
                let decisions = match result {
                    Ok(decisions) => decisions,
                    Err(err) => {
                        warn!(
                            run_id = %self.run_id,
                            cycle = tick.cycle,
                            symbol = %symbol,
                            error = %err,
                            "Decision source failed, holding"
                        );
                        continue;
                    }
                };

                for decision in decisions {
                    if !decision.symbol.is_empty() && decision.symbol != symbol {
                        debug!(
                            run_id = %self.run_id,
                            requested = %symbol,
                            returned = %decision.symbol,
                            "Ignoring decision for another symbol"
                        );
                        continue;
                    }
                    events.extend(self.apply_decision(sim, &symbol, price, &prices, &decision, tick));
                }
            }
        }

        let equity = sim.account.total_equity(&prices);
        self.write_sinks(sim, &events, tick, &equity).await;
        self.publish(sim, events, tick, &equity);
        Ok(true)
    }

    fn protective_exits(
        &self,
        sim: &mut Simulation,
        tick: Tick,
        skip: &mut BTreeSet<String>,
    ) -> Vec<TradeEvent> {
        let armed: Vec<(String, Side, Option<Decimal>, Option<Decimal>)> = sim
            .account
            .positions()
            .filter(|p| p.stop_loss.is_some() || p.take_profit.is_some())
            .map(|p| (p.symbol.clone(), p.side, p.stop_loss, p.take_profit))
            .collect();

        let mut events = Vec::new();
        for (symbol, side, stop, target) in armed {
            if skip.contains(&symbol) {
                continue;
            }
            let Some(kline) = sim.candle_at(&symbol, tick.timestamp) else {
                continue;
            };
            let trigger = evaluate_triggers(side, stop, target, kline);
            let (Some(level), Some(action)) = (trigger.exit_price(), trigger.action()) else {
                continue;
            };

            let note = format!("{action} triggered at {level}");
            if let Some(event) = self.close_position(sim, &symbol, side, level, action, note, tick)
            {
                info!(
                    run_id = %self.run_id,
                    cycle = tick.cycle,
                    symbol = %symbol,
                    side = %side,
                    action = %action,
                    level = %level,
                    pnl = %event.realized_pnl,
                    "Protective exit"
                );
                skip.insert(symbol);
                events.push(event);
            }
        }
        events
    }

    fn apply_decision(
        &self,
        sim: &mut Simulation,
        symbol: &str,
        price: Decimal,
        prices: &PriceMap,
        decision: &Decision,
        tick: Tick,
    ) -> Vec<TradeEvent> {
        let close = |sim: &mut Simulation, side: Side| {
            self.close_position(
                sim,
                symbol,
                side,
                price,
                TradeAction::Close,
                decision.reasoning.clone(),
                tick,
            )
        };

        match decision.action {
            DecisionAction::Hold => Vec::new(),
            DecisionAction::OpenLong | DecisionAction::OpenShort => self
                .open_position(sim, symbol, price, prices, decision, tick)
                .into_iter()
                .collect(),
            DecisionAction::CloseLong => close(sim, Side::Long).into_iter().collect(),
            DecisionAction::CloseShort => close(sim, Side::Short).into_iter().collect(),
            DecisionAction::Close => {
                let held: Vec<Side> = [Side::Long, Side::Short]
                    .into_iter()
                    .filter(|side| sim.account.position(symbol, *side).is_some())
                    .collect();
                if held.is_empty() {
                    debug!(run_id = %self.run_id, symbol, "Close requested with no open position");
                }
                held.into_iter()
                    .filter_map(|side| close(sim, side))
                    .collect()
            }
        }
    }

    fn open_position(
        &self,
        sim: &mut Simulation,
        symbol: &str,
        price: Decimal,
        prices: &PriceMap,
        decision: &Decision,
        tick: Tick,
    ) -> Option<TradeEvent> {
        let side = decision.action.open_side()?;
        let view = AccountView {
            price,
            equity: sim.account.total_equity(prices).equity,
            total_margin: sim.account.total_margin(),
            position_count: sim.account.position_count(),
            adds_to_existing: sim.account.position(symbol, side).is_some(),
        };

        let plan = match self.config.risk_control.plan_open(
            decision,
            &view,
            &self.config.sizing_defaults(),
        ) {
            Ok(plan) => plan,
            Err(reason) => {
                warn!(
                    run_id = %self.run_id,
                    cycle = tick.cycle,
                    symbol,
                    action = %decision.action,
                    %reason,
                    "Decision rejected by risk controls"
                );
                return None;
            }
        };

        let fill = match sim.account.open(
            symbol,
            side,
            plan.quantity,
            i64::from(plan.leverage),
            price,
            tick.timestamp,
        ) {
            Ok(fill) => fill,
            Err(err) => {
                warn!(
                    run_id = %self.run_id,
                    cycle = tick.cycle,
                    symbol,
                    code = %err.code(),
                    error = %err,
                    "Open rejected by account"
                );
                return None;
            }
        };

        if decision.stop_loss_pct.is_some() || decision.take_profit_pct.is_some() {
            let (stop, target) = protective_levels(
                side,
                fill.position.entry_price,
                decision.stop_loss_pct,
                decision.take_profit_pct,
            );
            if let Err(err) = sim.account.set_protection(symbol, side, stop, target) {
                warn!(run_id = %self.run_id, symbol, error = %err, "Failed to arm protection");
            }
        }

        Some(TradeEvent {
            timestamp: tick.timestamp,
            symbol: symbol.to_string(),
            action: if fill.added {
                TradeAction::Add
            } else {
                TradeAction::Open
            },
            side,
            quantity: plan.quantity,
            price: fill.fill_price,
            fee: fill.fee,
            realized_pnl: Decimal::ZERO,
            leverage: plan.leverage,
            cycle: tick.cycle,
            liquidation: false,
            note: decision.reasoning.clone(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn close_position(
        &self,
        sim: &mut Simulation,
        symbol: &str,
        side: Side,
        price: Decimal,
        action: TradeAction,
        note: String,
        tick: Tick,
    ) -> Option<TradeEvent> {
        match sim.account.close(symbol, side, Decimal::ZERO, price) {
            Ok(fill) => Some(TradeEvent {
                timestamp: tick.timestamp,
                symbol: symbol.to_string(),
                action,
                side,
                quantity: fill.quantity,
                price: fill.fill_price,
                fee: fill.total_fee,
                realized_pnl: fill.net_realized,
                leverage: fill.leverage,
                cycle: tick.cycle,
                liquidation: false,
                note,
            }),
            Err(err) => {
                warn!(
                    run_id = %self.run_id,
                    cycle = tick.cycle,
                    symbol,
                    side = %side,
                    code = %err.code(),
                    error = %err,
                    "Close rejected by account"
                );
                None
            }
        }
    }

    async fn write_sinks(
        &self,
        sim: &mut Simulation,
        events: &[TradeEvent],
        tick: Tick,
        equity: &EquityBreakdown,
    ) {
        for event in events {
            sim.order_seq += 1;
            let order_id = format!("{}-{}-{}", self.run_id, tick.cycle, sim.order_seq);

            let order = OrderRecord {
                run_id: self.run_id.clone(),
                order_id: order_id.clone(),
                symbol: event.symbol.clone(),
                side: event.side,
                action: event.action,
                quantity: event.quantity,
                leverage: event.leverage,
                timestamp: event.timestamp,
                cycle: event.cycle,
            };
            if let Err(err) = self.ports.order_sink.create_order(order).await {
                warn!(run_id = %self.run_id, %order_id, error = %err, "Failed to persist order");
            }

            let fill = FillRecord {
                run_id: self.run_id.clone(),
                order_id: order_id.clone(),
                symbol: event.symbol.clone(),
                price: event.price,
                quantity: event.quantity,
                fee: event.fee,
                realized_pnl: event.realized_pnl,
                timestamp: event.timestamp,
            };
            if let Err(err) = self.ports.order_sink.create_fill(fill).await {
                warn!(run_id = %self.run_id, %order_id, error = %err, "Failed to persist fill");
            }
        }

        let margin_usage_pct = if equity.equity > Decimal::ZERO {
            equity.margin / equity.equity * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        let snapshot = EquitySnapshot {
            run_id: self.run_id.clone(),
            timestamp: tick.timestamp,
            total_equity: equity.equity,
            balance: equity.cash,
            unrealized_pnl: equity.unrealized,
            position_count: sim.account.position_count(),
            margin_usage_pct,
        };
        if let Err(err) = self.ports.snapshot_sink.save(snapshot).await {
            warn!(run_id = %self.run_id, cycle = tick.cycle, error = %err, "Failed to persist equity snapshot");
        }
    }

    fn publish(
        &self,
        sim: &Simulation,
        events: Vec<TradeEvent>,
        tick: Tick,
        equity: &EquityBreakdown,
    ) {
        let point = EquityPoint {
            timestamp: tick.timestamp,
            equity: equity.equity,
            cash: equity.cash,
            margin: equity.margin,
            unrealized: equity.unrealized,
            position_count: sim.account.position_count(),
        };

        let mut state = self.state.write();
        state.equity_curve.push(point);
        state.trades.extend(events);
        state.account = sim.account.snapshot_state();
        state.metadata.current_cycle = tick.cycle + 1;
        state.metadata.last_equity = equity.equity;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::{DecisionSourceError, HoldDecisionSource};
    use crate::backtest::runner::risk::RiskControls;
    use crate::infrastructure::InMemoryPersistence;

    /// Serves fixed decisions keyed by cycle.
    struct ScriptedSource {
        script: HashMap<u64, Vec<Decision>>,
    }

    #[async_trait]
    impl DecisionSourcePort for ScriptedSource {
        async fn decide(
            &self,
            snapshot: &MarketSnapshot,
            _symbol: &str,
        ) -> Result<Vec<Decision>, DecisionSourceError> {
            Ok(self.script.get(&snapshot.cycle).cloned().unwrap_or_default())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl DecisionSourcePort for FailingSource {
        async fn decide(
            &self,
            _snapshot: &MarketSnapshot,
            _symbol: &str,
        ) -> Result<Vec<Decision>, DecisionSourceError> {
            Err(DecisionSourceError::Unavailable {
                message: "offline".to_string(),
            })
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            fee_bps: dec!(4),
            risk_control: RiskControls {
                min_confidence: dec!(50),
                ..RiskControls::default()
            },
            ..RunConfig::default()
        }
        .with_symbols(["BTCUSDT"])
    }

    fn closes(prices: &[Decimal]) -> Vec<Kline> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| Kline::flat(i as i64 * 60_000, *p))
            .collect()
    }

    fn scripted(script: Vec<(u64, Decision)>) -> RunnerPorts {
        let mut map: HashMap<u64, Vec<Decision>> = HashMap::new();
        for (cycle, decision) in script {
            map.entry(cycle).or_default().push(decision);
        }
        RunnerPorts::new(Arc::new(ScriptedSource { script: map }))
    }

    fn open_long() -> Decision {
        Decision::new("BTCUSDT", DecisionAction::OpenLong)
            .with_confidence(dec!(80))
            .with_leverage(10)
            .with_position_fraction(dec!(0.05))
    }

    #[tokio::test]
    async fn test_hold_run_keeps_balance() {
        let runner = Runner::new(
            "bt_hold",
            config(),
            RunnerPorts::new(Arc::new(HoldDecisionSource)),
        );
        runner
            .load_klines("btcusdt", closes(&[dec!(100), dec!(101), dec!(99)]))
            .unwrap();

        let status = runner.run(CancellationToken::new()).await;
        assert_eq!(status, RunStatus::Completed);

        let curve = runner.equity_curve();
        assert_eq!(curve.len(), 3);
        assert!(curve.iter().all(|p| p.equity == dec!(1000)));
        assert!(runner.trades().is_empty());

        let meta = runner.metadata();
        assert_eq!(meta.current_cycle, 3);
        assert_eq!(meta.total_cycles, 3);
        assert_eq!(meta.progress_pct(), dec!(100));
        assert!(meta.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_open_then_close_round_trip() {
        let ports = scripted(vec![
            (0, open_long()),
            (
                1,
                Decision::new("BTCUSDT", DecisionAction::CloseLong).with_confidence(dec!(80)),
            ),
        ]);
        let runner = Runner::new("bt_trip", config(), ports);
        runner
            .load_klines("BTCUSDT", closes(&[dec!(50000), dec!(55000), dec!(55000)]))
            .unwrap();

        assert_eq!(runner.run(CancellationToken::new()).await, RunStatus::Completed);

        let trades = runner.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].action, TradeAction::Open);
        assert_eq!(trades[0].quantity, dec!(0.01));
        assert_eq!(trades[0].leverage, 10);
        assert_eq!(trades[1].action, TradeAction::Close);
        assert_eq!(trades[1].realized_pnl, dec!(49.58));

        let account = runner.account_state();
        assert!(account.positions.is_empty());
        assert_eq!(account.cash, dec!(1049.58));
        assert_eq!(runner.metadata().last_equity, dec!(1049.58));

        let metrics = runner.metrics();
        assert_eq!(metrics.total_trades, 1);
        assert_eq!(metrics.winning_trades, 1);
    }

    #[tokio::test]
    async fn test_liquidation_skips_decision() {
        let ports = scripted(vec![
            (0, open_long()),
            (
                1,
                Decision::new("BTCUSDT", DecisionAction::OpenLong).with_confidence(dec!(80)),
            ),
        ]);
        let runner = Runner::new("bt_liq", config(), ports);
        runner
            .load_klines("BTCUSDT", closes(&[dec!(50000), dec!(44000)]))
            .unwrap();

        assert_eq!(runner.run(CancellationToken::new()).await, RunStatus::Completed);

        let trades = runner.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].action, TradeAction::Liquidated);
        assert!(trades[1].liquidation);
        assert!(runner.account_state().positions.is_empty());
    }

    #[tokio::test]
    async fn test_stop_loss_exit() {
        let decision = open_long().with_protection(Some(dec!(2)), None);
        let ports = scripted(vec![(0, decision)]);
        let runner = Runner::new("bt_stop", config(), ports);

        let klines = vec![
            Kline::flat(0, dec!(50000)),
            Kline::new(60_000, dec!(50000), dec!(50100), dec!(48500), dec!(48800), dec!(1)),
        ];
        runner.load_klines("BTCUSDT", klines).unwrap();

        assert_eq!(runner.run(CancellationToken::new()).await, RunStatus::Completed);

        let trades = runner.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].action, TradeAction::StopLoss);
        assert_eq!(trades[1].price, dec!(49000));
        assert!(trades[1].realized_pnl < Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_low_confidence_open_ignored() {
        let decision = open_long().with_confidence(dec!(10));
        let runner = Runner::new("bt_conf", config(), scripted(vec![(0, decision)]));
        runner
            .load_klines("BTCUSDT", closes(&[dec!(100), dec!(100)]))
            .unwrap();

        runner.run(CancellationToken::new()).await;
        assert!(runner.trades().is_empty());
    }

    #[tokio::test]
    async fn test_decision_source_failure_holds() {
        let runner = Runner::new(
            "bt_fail_src",
            config(),
            RunnerPorts::new(Arc::new(FailingSource)),
        );
        runner
            .load_klines("BTCUSDT", closes(&[dec!(100), dec!(100)]))
            .unwrap();

        assert_eq!(runner.run(CancellationToken::new()).await, RunStatus::Completed);
        assert_eq!(runner.equity_curve().len(), 2);
    }

    #[tokio::test]
    async fn test_no_klines_fails() {
        let runner = Runner::new(
            "bt_empty",
            config(),
            RunnerPorts::new(Arc::new(HoldDecisionSource)),
        );

        assert_eq!(runner.run(CancellationToken::new()).await, RunStatus::Failed);
        let Some(report) = runner.metadata().error else {
            panic!("expected error report");
        };
        assert_eq!(report.code, crate::error::ErrorCode::StructuralFailure);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_cycle() {
        let runner = Runner::new(
            "bt_cancel",
            config(),
            RunnerPorts::new(Arc::new(HoldDecisionSource)),
        );
        runner
            .load_klines("BTCUSDT", closes(&[dec!(100), dec!(100)]))
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(runner.run(cancel).await, RunStatus::Cancelled);
        assert!(runner.equity_curve().is_empty());
    }

    #[test]
    fn test_cancel_pending_only_touches_pending_runs() {
        let running = Runner::new(
            "bt_running",
            config(),
            RunnerPorts::new(Arc::new(HoldDecisionSource)),
        );
        running.mark_running().unwrap();
        assert!(!running.cancel_pending());
        assert_eq!(running.status(), RunStatus::Running);

        let pending = Runner::new(
            "bt_pending",
            config(),
            RunnerPorts::new(Arc::new(HoldDecisionSource)),
        );
        assert!(pending.cancel_pending());
        assert_eq!(pending.status(), RunStatus::Cancelled);
        assert!(matches!(
            pending.mark_running(),
            Err(RunnerError::InvalidState {
                status: RunStatus::Cancelled,
                ..
            })
        ));
        assert!(!pending.cancel_pending());
    }

    #[tokio::test]
    async fn test_load_klines_rejected_after_start() {
        let runner = Runner::new(
            "bt_state",
            config(),
            RunnerPorts::new(Arc::new(HoldDecisionSource)),
        );
        runner.load_klines("BTCUSDT", closes(&[dec!(100)])).unwrap();
        runner.run(CancellationToken::new()).await;

        let err = runner
            .load_klines("BTCUSDT", closes(&[dec!(100)]))
            .unwrap_err();
        assert!(matches!(err, RunnerError::InvalidState { .. }));
        assert_eq!(runner.wait().await, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_sinks_receive_orders_and_snapshots() {
        let store = Arc::new(InMemoryPersistence::new());
        let ports = scripted(vec![(0, open_long())]).with_sinks(store.clone(), store.clone());
        let runner = Runner::new("bt_sink", config(), ports);
        runner
            .load_klines("BTCUSDT", closes(&[dec!(50000), dec!(50000)]))
            .unwrap();

        runner.run(CancellationToken::new()).await;

        assert_eq!(store.snapshots(Some("bt_sink")).len(), 2);
        let orders = store.orders(Some("bt_sink"));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "bt_sink-0-1");
        assert_eq!(store.fills(Some("bt_sink")).len(), 1);
    }
}
