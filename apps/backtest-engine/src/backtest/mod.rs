//! Leveraged-futures backtest engine.
//!
//! This module provides the simulation core:
//!
//! - **Account**: Cash, margin and positions keyed by `(symbol, side)` with
//!   slippage, taker fees and flat-rule liquidation
//! - **Metrics**: Return, drawdown, Sharpe/Sortino and per-symbol trade stats
//! - **Runner**: Kline-clocked loop driven by an external decision source
//! - **Manager**: Registry of concurrent runs with cooperative cancellation
//!
//! # Example
//!
//! ```
//! use backtest_engine::backtest::{Side, SimulatedAccount};
//! use rust_decimal_macros::dec;
//!
//! let mut account = SimulatedAccount::new(dec!(1000), dec!(4), dec!(0));
//! let fill = account
//!     .open("BTCUSDT", Side::Long, dec!(0.01), 10, dec!(50000), 0)
//!     .unwrap();
//! assert_eq!(fill.margin, dec!(50));
//! assert_eq!(account.cash(), dec!(949.8));
//!
//! let close = account
//!     .close("BTCUSDT", Side::Long, dec!(0.01), dec!(55000))
//!     .unwrap();
//! assert_eq!(close.net_realized, dec!(49.58));
//! assert_eq!(account.cash(), dec!(1049.58));
//! ```

pub mod account;
mod commission;
pub mod decision;
pub mod manager;
pub mod metrics;
pub mod runner;
mod slippage;
mod triggers;
pub mod types;

pub use account::{
    AccountError, AccountState, CloseFill, EquityBreakdown, LiquidationReport, OpenFill,
    Position, PositionKey, PriceMap, SimulatedAccount, liquidation_price, normalize_leverage,
};
pub use commission::{calculate_fee, proportional_fee};
pub use decision::{Decision, DecisionAction, DecisionParseError, MarketSnapshot, parse_decisions};
pub use manager::{Manager, ManagerError};
pub use metrics::{Metrics, MetricsCalculator, SymbolStats};
pub use runner::{
    RiskControls, RiskRejection, RunConfig, RunMetadata, RunStatus, Runner, RunnerError,
    RunnerPorts, SimulationClock,
};
pub use slippage::{OrderSide, apply_slippage, bps_to_rate, fill_price};
pub use triggers::{TriggerResult, evaluate_triggers, protective_levels};
pub use types::{EquityPoint, Kline, Side, TimestampMs, TradeAction, TradeEvent};
