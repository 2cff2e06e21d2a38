//! Application Ports (Driven)
//!
//! Driven (secondary/outbound) ports define how the simulation uses
//! external systems. Adapters live in `infrastructure`.

mod decision_source_port;
mod persistence_port;

pub use decision_source_port::{DecisionSourceError, DecisionSourcePort, HoldDecisionSource};
pub use persistence_port::{
    EquitySnapshot, EquitySnapshotSink, FillRecord, NoOpSink, OrderRecord, OrderSink, SinkError,
};
