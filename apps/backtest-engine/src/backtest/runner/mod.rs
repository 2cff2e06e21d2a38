//! Single-run simulation: clock, risk controls, lifecycle and the cycle loop.

mod clock;
mod config;
mod engine;
mod error;
mod metadata;
mod risk;

pub use clock::SimulationClock;
pub use config::RunConfig;
pub use engine::{Runner, RunnerPorts};
pub use error::RunnerError;
pub use metadata::{RunMetadata, RunStatus};
pub use risk::{AccountView, OrderPlan, RiskControls, RiskRejection, SizingDefaults};
