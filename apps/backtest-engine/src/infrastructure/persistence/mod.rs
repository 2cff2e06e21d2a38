//! Persistence Adapters
//!
//! Implementations of the snapshot and order sink ports.

pub mod in_memory;

pub use in_memory::InMemoryPersistence;
