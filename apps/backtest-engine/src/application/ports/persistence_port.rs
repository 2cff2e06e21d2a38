//! Persistence Sink Ports (Driven Ports)
//!
//! Append-only interfaces for equity snapshots, orders and fills. The
//! simulation writes through them but never reads back, so nothing
//! persisted can influence the in-memory ledger.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::{Side, TimestampMs, TradeAction};

/// Sink write error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// Storage rejected or failed the write.
    #[error("Sink write failed: {message}")]
    WriteFailed { message: String },
}

/// Account valuation written once per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    /// Run identifier.
    pub run_id: String,
    /// Simulated time.
    pub timestamp: TimestampMs,
    /// Total equity.
    pub total_equity: Decimal,
    /// Free cash.
    pub balance: Decimal,
    /// Unrealized P&L.
    pub unrealized_pnl: Decimal,
    /// Open positions.
    pub position_count: usize,
    /// Locked margin in percent of equity.
    pub margin_usage_pct: Decimal,
}

/// Simulated order, one per executed trade event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Run identifier.
    pub run_id: String,
    /// Order identifier, unique within the run.
    pub order_id: String,
    /// Symbol.
    pub symbol: String,
    /// Position side affected.
    pub side: Side,
    /// Action that produced the order.
    pub action: TradeAction,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Leverage.
    pub leverage: u32,
    /// Simulated time.
    pub timestamp: TimestampMs,
    /// Cycle index.
    pub cycle: u64,
}

/// Fill of a simulated order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRecord {
    /// Run identifier.
    pub run_id: String,
    /// Parent order identifier.
    pub order_id: String,
    /// Symbol.
    pub symbol: String,
    /// Fill price after slippage.
    pub price: Decimal,
    /// Filled quantity.
    pub quantity: Decimal,
    /// Fee charged.
    pub fee: Decimal,
    /// Net realized P&L, zero for opens.
    pub realized_pnl: Decimal,
    /// Simulated time.
    pub timestamp: TimestampMs,
}

/// Port for equity snapshot persistence.
#[async_trait]
pub trait EquitySnapshotSink: Send + Sync {
    /// Append a snapshot.
    async fn save(&self, snapshot: EquitySnapshot) -> Result<(), SinkError>;
}

/// Port for order and fill persistence.
#[async_trait]
pub trait OrderSink: Send + Sync {
    /// Append an order.
    async fn create_order(&self, order: OrderRecord) -> Result<(), SinkError>;

    /// Append a fill.
    async fn create_fill(&self, fill: FillRecord) -> Result<(), SinkError>;
}

/// Sink that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpSink;

#[async_trait]
impl EquitySnapshotSink for NoOpSink {
    async fn save(&self, _snapshot: EquitySnapshot) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl OrderSink for NoOpSink {
    async fn create_order(&self, _order: OrderRecord) -> Result<(), SinkError> {
        Ok(())
    }

    async fn create_fill(&self, _fill: FillRecord) -> Result<(), SinkError> {
        Ok(())
    }
}
