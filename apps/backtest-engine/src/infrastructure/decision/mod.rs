//! Decision Source Adapters

pub mod replay;

pub use replay::{RecordedResponse, ReplayDecisionSource, ReplayLoadError};
