//! Application Layer
//!
//! Ports through which the simulation core reaches its external
//! collaborators: the decision source and the persistence sinks.

pub mod ports;

pub use ports::*;
