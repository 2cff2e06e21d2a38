//! Infrastructure Layer
//!
//! Adapters implementing the ports defined in the application layer:
//!
//! - `persistence/`: Equity snapshot and order sinks
//! - `decision/`: Decision sources (recorded-response replay)

pub mod decision;
pub mod persistence;

pub use decision::{RecordedResponse, ReplayDecisionSource, ReplayLoadError};
pub use persistence::InMemoryPersistence;
