//! Backtest Engine Binary
//!
//! Runs one backtest from a YAML configuration and prints the metrics.
//!
//! # Usage
//!
//! ```bash
//! BACKTEST_CONFIG=config.yaml cargo run --bin backtest-engine
//! ```
//!
//! # Environment Variables
//!
//! - `BACKTEST_CONFIG`: Path to the YAML config (default: config.yaml)
//! - `RUST_LOG`: Log filter, overrides `observability.logging.level`
//!
//! Kline files are JSON arrays of candles
//! (`open_time`, `open`, `high`, `low`, `close`, `volume`). The decision file
//! is a JSON array of recorded responses (`timestamp`, `symbol`, `response`).
//! Without a decision file every cycle holds.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use backtest_engine::application::ports::{DecisionSourcePort, HoldDecisionSource};
use backtest_engine::backtest::{Kline, Manager, RunStatus, RunnerPorts};
use backtest_engine::config::{Config, load_config};
use backtest_engine::infrastructure::{InMemoryPersistence, ReplayDecisionSource};
use backtest_engine::telemetry::init_tracing;
use serde::Serialize;
use tokio::signal;

/// Default configuration path.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Serialize)]
struct Report<'a> {
    run_id: &'a str,
    status: RunStatus,
    metrics: backtest_engine::Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("BACKTEST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(Some(&config_path))
        .with_context(|| format!("loading configuration from {config_path}"))?;

    init_tracing(&config.observability.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing: {e}"))?;

    tracing::info!(config = %config_path, "Starting backtest engine");

    let decision_source = create_decision_source(&config)?;
    let persistence = Arc::new(InMemoryPersistence::new());
    let ports = RunnerPorts::new(decision_source).with_sinks(persistence.clone(), persistence);
    let manager = Manager::new(ports);

    let run_id = manager
        .create(config.run_config())
        .context("registering backtest run")?;

    for (symbol, path) in &config.data.klines {
        let klines = read_klines(path)?;
        let held = manager.load_klines(&run_id, symbol, klines)?;
        tracing::info!(symbol = %symbol, candles = held, path = %path.display(), "Klines loaded");
    }

    manager.launch(&run_id)?;

    let status = tokio::select! {
        status = manager.wait(&run_id) => status?,
        _ = signal::ctrl_c() => {
            tracing::info!(run_id = %run_id, "Interrupt received, stopping backtest");
            manager.stop(&run_id)?;
            manager.wait(&run_id).await?
        }
    };

    let metadata = manager.get_status(&run_id)?;
    if let Some(error) = &metadata.error {
        tracing::error!(run_id = %run_id, error = %error, "Backtest did not complete");
    }

    let metrics = manager.get_metrics(&run_id)?;
    eprintln!("{}", metrics.summary());

    let report = Report {
        run_id: &run_id,
        status,
        metrics,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serializing report")?
    );

    tracing::info!(run_id = %run_id, status = %status, "Backtest engine stopped");
    if status == RunStatus::Failed {
        anyhow::bail!("backtest {run_id} failed");
    }
    Ok(())
}

/// Replay recorded responses when a decision file is configured, otherwise hold.
fn create_decision_source(config: &Config) -> Result<Arc<dyn DecisionSourcePort>> {
    match &config.data.decisions {
        Some(path) => {
            let source = ReplayDecisionSource::from_file(path)
                .with_context(|| format!("loading decisions from {}", path.display()))?;
            tracing::info!(responses = source.len(), path = %path.display(), "Replay decision source ready");
            Ok(Arc::new(source))
        }
        None => {
            tracing::warn!("No decision file configured, every cycle will hold");
            Ok(Arc::new(HoldDecisionSource))
        }
    }
}

fn read_klines(path: &Path) -> Result<Vec<Kline>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading klines from {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing klines in {}", path.display()))
}
