// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::cast_possible_wrap
    )
)]

//! Backtest Engine - Rust Core Library
//!
//! Deterministic leveraged-futures backtesting driven by an external
//! decision source (typically a language model).
//!
//! # Architecture
//!
//! ## Layers (inside → outside)
//!
//! - **Backtest**: Simulation core
//!   - `account`: Simulated margin account, fills, liquidation
//!   - `metrics`: Performance metrics over equity curves and trade logs
//!   - `runner`: Per-run cycle loop, risk controls, lifecycle
//!   - `manager`: Concurrent run registry
//!   - `decision`: Decision model and response parsing
//!
//! - **Application**: Port definitions
//!   - `ports`: `DecisionSourcePort`, `EquitySnapshotSink`, `OrderSink`
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `persistence`: In-memory sinks
//!   - `decision`: Recorded-response replay
//!
//! Money is `rust_decimal::Decimal` throughout; simulated time is Unix
//! milliseconds.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Simulation core.
pub mod backtest;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters.
pub mod infrastructure;

/// Configuration loading and validation.
pub mod config;

/// Stable error codes.
pub mod error;

/// Tracing subscriber setup.
pub mod telemetry;

pub use backtest::{
    Decision, DecisionAction, Kline, Manager, ManagerError, Metrics, MetricsCalculator, RunConfig,
    RunMetadata, RunStatus, Runner, RunnerPorts, Side, SimulatedAccount, TradeAction, TradeEvent,
};
pub use error::{ErrorCode, ErrorReport};
