//! In-memory persistence sinks for testing and local runs.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{
    EquitySnapshot, EquitySnapshotSink, FillRecord, OrderRecord, OrderSink, SinkError,
};

/// In-memory implementation of `EquitySnapshotSink` and `OrderSink`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    snapshots: RwLock<Vec<EquitySnapshot>>,
    orders: RwLock<Vec<OrderRecord>>,
    fills: RwLock<Vec<FillRecord>>,
}

impl InMemoryPersistence {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored snapshots, optionally filtered by run.
    #[must_use]
    pub fn snapshots(&self, run_id: Option<&str>) -> Vec<EquitySnapshot> {
        self.snapshots
            .read()
            .iter()
            .filter(|s| run_id.is_none_or(|id| s.run_id == id))
            .cloned()
            .collect()
    }

    /// Stored orders, optionally filtered by run.
    #[must_use]
    pub fn orders(&self, run_id: Option<&str>) -> Vec<OrderRecord> {
        self.orders
            .read()
            .iter()
            .filter(|o| run_id.is_none_or(|id| o.run_id == id))
            .cloned()
            .collect()
    }

    /// Stored fills, optionally filtered by run.
    #[must_use]
    pub fn fills(&self, run_id: Option<&str>) -> Vec<FillRecord> {
        self.fills
            .read()
            .iter()
            .filter(|f| run_id.is_none_or(|id| f.run_id == id))
            .cloned()
            .collect()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.snapshots.write().clear();
        self.orders.write().clear();
        self.fills.write().clear();
    }
}

#[async_trait]
impl EquitySnapshotSink for InMemoryPersistence {
    async fn save(&self, snapshot: EquitySnapshot) -> Result<(), SinkError> {
        self.snapshots.write().push(snapshot);
        Ok(())
    }
}

#[async_trait]
impl OrderSink for InMemoryPersistence {
    async fn create_order(&self, order: OrderRecord) -> Result<(), SinkError> {
        self.orders.write().push(order);
        Ok(())
    }

    async fn create_fill(&self, fill: FillRecord) -> Result<(), SinkError> {
        self.fills.write().push(fill);
        Ok(())
    }
}
