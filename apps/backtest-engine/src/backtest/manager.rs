//! Multi-run supervisor.
//!
//! Keeps every run's [`Runner`] and cancellation token in one registry
//! behind a single read/write lock. Each launched run executes on its own
//! tokio task; `start` and `launch` return as soon as the task is spawned.
//! All queries hand back copies.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::account::AccountState;
use super::metrics::Metrics;
use super::runner::{RunConfig, RunMetadata, RunStatus, Runner, RunnerError, RunnerPorts};
use super::types::{EquityPoint, Kline, TradeEvent};
use crate::error::ErrorCode;

/// Errors returned synchronously by [`Manager`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// A run with this id is already registered.
    #[error("Run already exists: {run_id}")]
    AlreadyExists {
        /// Duplicate id.
        run_id: String,
    },

    /// No run with this id.
    #[error("Run not found: {run_id}")]
    NotFound {
        /// Unknown id.
        run_id: String,
    },

    /// The run is executing.
    #[error("Cannot delete running run: {run_id}")]
    CannotDeleteRunning {
        /// Running id.
        run_id: String,
    },

    /// The run's status does not allow the operation.
    #[error("Run {run_id} is {status}")]
    InvalidState {
        /// Run id.
        run_id: String,
        /// Status at the time of the call.
        status: RunStatus,
    },

    /// The runner rejected the operation.
    #[error("Run {run_id}: {source}")]
    Runner {
        /// Run id.
        run_id: String,
        /// Runner error.
        #[source]
        source: RunnerError,
    },
}

impl ManagerError {
    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::CannotDeleteRunning { .. } => ErrorCode::CannotDeleteRunning,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::Runner { source, .. } => source.code(),
        }
    }

    fn from_runner(run_id: &str, err: RunnerError) -> Self {
        match err {
            RunnerError::InvalidState { status, .. } => Self::InvalidState {
                run_id: run_id.to_string(),
                status,
            },
            source => Self::Runner {
                run_id: run_id.to_string(),
                source,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct RunHandle {
    runner: Arc<Runner>,
    cancel: CancellationToken,
}

/// Registry and launcher for concurrent backtest runs.
#[derive(Debug)]
pub struct Manager {
    runs: RwLock<HashMap<String, RunHandle>>,
    ports: RunnerPorts,
}

impl Manager {
    /// Manager whose runs share `ports`.
    #[must_use]
    pub fn new(ports: RunnerPorts) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            ports,
        }
    }

    fn generate_run_id() -> String {
        format!("bt_{}", Uuid::new_v4().simple())
    }

    fn handle(&self, run_id: &str) -> Result<RunHandle, ManagerError> {
        self.runs
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound {
                run_id: run_id.to_string(),
            })
    }

    fn runner(&self, run_id: &str) -> Result<Arc<Runner>, ManagerError> {
        self.handle(run_id).map(|h| h.runner)
    }

    /// Register a pending run. Generates an id when the config has none.
    ///
    /// A duplicate id is rejected and the existing run is left untouched.
    pub fn create(&self, config: RunConfig) -> Result<String, ManagerError> {
        let run_id = config
            .run_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(Self::generate_run_id, str::to_string);

        let mut runs = self.runs.write();
        if runs.contains_key(&run_id) {
            warn!(run_id = %run_id, "Duplicate backtest run id");
            return Err(ManagerError::AlreadyExists { run_id });
        }

        let config = config.with_run_id(run_id.clone());
        let runner = Arc::new(Runner::new(run_id.clone(), config, self.ports.clone()));
        runs.insert(
            run_id.clone(),
            RunHandle {
                runner,
                cancel: CancellationToken::new(),
            },
        );
        drop(runs);

        info!(run_id = %run_id, "Backtest run created");
        Ok(run_id)
    }

    /// Feed historical candles into a pending run.
    pub fn load_klines(
        &self,
        run_id: &str,
        symbol: &str,
        klines: Vec<Kline>,
    ) -> Result<usize, ManagerError> {
        self.runner(run_id)?
            .load_klines(symbol, klines)
            .map_err(|err| ManagerError::from_runner(run_id, err))
    }

    /// Start a pending run on its own task and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self, run_id: &str) -> Result<(), ManagerError> {
        let RunHandle { runner, cancel } = self.handle(run_id)?;
        runner
            .mark_running()
            .map_err(|err| ManagerError::from_runner(run_id, err))?;

        info!(run_id = %run_id, "Backtest run launched");
        tokio::spawn(async move {
            runner.run(cancel).await;
        });
        Ok(())
    }

    /// Register and launch a run in one step.
    pub fn start(&self, config: RunConfig) -> Result<String, ManagerError> {
        let run_id = self.create(config)?;
        self.launch(&run_id)?;
        Ok(run_id)
    }

    /// Request cancellation. Returns immediately.
    ///
    /// A pending run is cancelled on the spot; a running one stops at its
    /// next cycle boundary.
    pub fn stop(&self, run_id: &str) -> Result<(), ManagerError> {
        let RunHandle { runner, cancel } = self.handle(run_id)?;
        runner.cancel_pending();
        cancel.cancel();
        info!(run_id = %run_id, "Backtest stop requested");
        Ok(())
    }

    /// Copy of the run's metadata.
    pub fn get_status(&self, run_id: &str) -> Result<RunMetadata, ManagerError> {
        Ok(self.runner(run_id)?.metadata())
    }

    /// Metrics over the run's logs so far.
    pub fn get_metrics(&self, run_id: &str) -> Result<Metrics, ManagerError> {
        Ok(self.runner(run_id)?.metrics())
    }

    /// Copy of the run's equity curve.
    pub fn get_equity_curve(&self, run_id: &str) -> Result<Vec<EquityPoint>, ManagerError> {
        Ok(self.runner(run_id)?.equity_curve())
    }

    /// Copy of the run's trade log.
    pub fn get_trades(&self, run_id: &str) -> Result<Vec<TradeEvent>, ManagerError> {
        Ok(self.runner(run_id)?.trades())
    }

    /// Copy of the run's ledger as of its last completed cycle.
    pub fn get_account_state(&self, run_id: &str) -> Result<AccountState, ManagerError> {
        Ok(self.runner(run_id)?.account_state())
    }

    /// Remove a run that is not executing.
    pub fn delete(&self, run_id: &str) -> Result<(), ManagerError> {
        let mut runs = self.runs.write();
        let Some(handle) = runs.get(run_id) else {
            return Err(ManagerError::NotFound {
                run_id: run_id.to_string(),
            });
        };
        if handle.runner.status() == RunStatus::Running {
            return Err(ManagerError::CannotDeleteRunning {
                run_id: run_id.to_string(),
            });
        }
        if let Some(handle) = runs.remove(run_id) {
            handle.cancel.cancel();
        }
        drop(runs);

        info!(run_id = %run_id, "Backtest run deleted");
        Ok(())
    }

    /// Metadata copies for every registered run, oldest first.
    #[must_use]
    pub fn list_runs(&self) -> Vec<RunMetadata> {
        let mut runs: Vec<RunMetadata> = self
            .runs
            .read()
            .values()
            .map(|h| h.runner.metadata())
            .collect();
        runs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        runs
    }

    /// Wait for a run to reach a terminal status.
    ///
    /// Never returns for a pending run that is neither launched nor stopped.
    pub async fn wait(&self, run_id: &str) -> Result<RunStatus, ManagerError> {
        let runner = self.runner(run_id)?;
        Ok(runner.wait().await)
    }

    /// Cancel every run and wait for the running ones to wind down.
    pub async fn shutdown(&self) {
        let handles: Vec<RunHandle> = self.runs.read().values().cloned().collect();
        info!(runs = handles.len(), "Shutting down backtest manager");

        for handle in &handles {
            handle.runner.cancel_pending();
            handle.cancel.cancel();
        }
        for handle in handles {
            handle.runner.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::HoldDecisionSource;

    fn manager() -> Manager {
        Manager::new(RunnerPorts::new(Arc::new(HoldDecisionSource)))
    }

    fn config(run_id: &str) -> RunConfig {
        RunConfig::default()
            .with_run_id(run_id)
            .with_symbols(["BTCUSDT"])
    }

    #[test]
    fn test_create_generates_id() {
        let manager = manager();
        let run_id = manager.create(RunConfig::default()).unwrap();
        assert!(run_id.starts_with("bt_"));
        assert_eq!(manager.get_status(&run_id).unwrap().status, RunStatus::Pending);
    }

    #[test]
    fn test_duplicate_id_rejected_without_mutation() {
        let manager = manager();
        manager.create(config("bt_dup")).unwrap();
        manager
            .load_klines("bt_dup", "BTCUSDT", vec![Kline::flat(0, dec!(100))])
            .unwrap();

        let err = manager.create(config("bt_dup")).unwrap_err();
        assert_eq!(
            err,
            ManagerError::AlreadyExists {
                run_id: "bt_dup".to_string()
            }
        );
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        assert_eq!(manager.list_runs().len(), 1);

        let Ok(runner) = manager.runner("bt_dup") else {
            panic!("run should still be registered");
        };
        assert_eq!(runner.loaded_symbols(), vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn test_unknown_run_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.get_status("missing"),
            Err(ManagerError::NotFound { .. })
        ));
        assert!(matches!(
            manager.get_metrics("missing"),
            Err(ManagerError::NotFound { .. })
        ));
        assert!(matches!(
            manager.get_equity_curve("missing"),
            Err(ManagerError::NotFound { .. })
        ));
        assert!(matches!(
            manager.get_trades("missing"),
            Err(ManagerError::NotFound { .. })
        ));
        assert!(matches!(
            manager.stop("missing"),
            Err(ManagerError::NotFound { .. })
        ));
        assert!(matches!(
            manager.delete("missing"),
            Err(ManagerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_stop_pending_cancels_immediately() {
        let manager = manager();
        manager.create(config("bt_pending")).unwrap();
        manager.stop("bt_pending").unwrap();

        assert_eq!(
            manager.get_status("bt_pending").unwrap().status,
            RunStatus::Cancelled
        );
        assert!(matches!(
            manager.load_klines("bt_pending", "BTCUSDT", Vec::new()),
            Err(ManagerError::InvalidState {
                status: RunStatus::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn test_delete_pending_removes_run() {
        let manager = manager();
        manager.create(config("bt_del")).unwrap();
        manager.delete("bt_del").unwrap();
        assert!(manager.list_runs().is_empty());
        assert!(manager.get_status("bt_del").is_err());
    }

    #[tokio::test]
    async fn test_start_and_wait() {
        let manager = manager();
        let run_id = manager.create(config("bt_run")).unwrap();
        manager
            .load_klines(
                &run_id,
                "BTCUSDT",
                vec![Kline::flat(0, dec!(100)), Kline::flat(60_000, dec!(101))],
            )
            .unwrap();
        manager.launch(&run_id).unwrap();

        assert_eq!(manager.wait(&run_id).await.unwrap(), RunStatus::Completed);
        assert_eq!(manager.get_equity_curve(&run_id).unwrap().len(), 2);

        let err = manager.launch(&run_id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending() {
        let manager = manager();
        manager.create(config("bt_a")).unwrap();
        manager.create(config("bt_b")).unwrap();
        manager.shutdown().await;

        assert!(
            manager
                .list_runs()
                .iter()
                .all(|m| m.status == RunStatus::Cancelled)
        );
    }
}
