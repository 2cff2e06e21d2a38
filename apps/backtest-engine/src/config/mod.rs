//! Configuration module for the backtest engine.
//!
//! Loads YAML configuration with environment variable interpolation and
//! validates it before anything runs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use backtest_engine::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Build a runner configuration
//! let run = config.run_config();
//! println!("initial balance: {}", run.initial_balance);
//! ```

mod backtest;
mod data;
mod observability;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backtest::BacktestConfig;
pub use data::DataConfig;
pub use observability::{LogFormat, LoggingConfig, ObservabilityConfig};

use crate::backtest::{RiskControls, RunConfig};
use crate::error::ErrorCode;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidConfig
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Run settings.
    #[serde(default)]
    pub backtest: BacktestConfig,
    /// Risk limits applied to opens.
    #[serde(default)]
    pub risk_control: RiskControls,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Input data locations.
    #[serde(default)]
    pub data: DataConfig,
}

impl Config {
    /// Runner configuration from the `backtest` and `risk_control` sections.
    ///
    /// When no symbols are listed, every symbol with a kline file is traded.
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        let mut run = self.backtest.to_run_config(&self.risk_control);
        if run.symbols.is_empty() {
            run.symbols = self.data.klines.keys().cloned().collect();
        }
        run
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match cap.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(v)) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let bt = &config.backtest;

    if bt.initial_balance <= Decimal::ZERO {
        return Err(invalid("backtest.initial_balance must be positive"));
    }
    if bt.fee_bps < Decimal::ZERO || bt.slippage_bps < Decimal::ZERO {
        return Err(invalid(
            "backtest.fee_bps and backtest.slippage_bps must not be negative",
        ));
    }
    if bt.kline_window == 0 {
        return Err(invalid("backtest.kline_window must be at least 1"));
    }
    if bt.decision_interval_bars == 0 {
        return Err(invalid("backtest.decision_interval_bars must be at least 1"));
    }
    if bt.default_leverage < 1 {
        return Err(invalid("backtest.default_leverage must be at least 1"));
    }
    if bt.default_position_fraction <= Decimal::ZERO || bt.default_position_fraction > Decimal::ONE
    {
        return Err(invalid(
            "backtest.default_position_fraction must be in (0, 1]",
        ));
    }
    if bt.periods_per_year == 0 {
        return Err(invalid("backtest.periods_per_year must be at least 1"));
    }

    let risk = &config.risk_control;
    if risk.max_positions == 0 {
        return Err(invalid("risk_control.max_positions must be at least 1"));
    }
    if risk.max_leverage == 0 {
        return Err(invalid("risk_control.max_leverage must be at least 1"));
    }
    if risk.max_position_fraction <= Decimal::ZERO || risk.max_position_fraction > Decimal::ONE {
        return Err(invalid(
            "risk_control.max_position_fraction must be in (0, 1]",
        ));
    }
    if risk.max_margin_usage_pct <= Decimal::ZERO
        || risk.max_margin_usage_pct > Decimal::ONE_HUNDRED
    {
        return Err(invalid(
            "risk_control.max_margin_usage_pct must be in (0, 100]",
        ));
    }
    if risk.min_confidence < Decimal::ZERO || risk.min_confidence > Decimal::ONE_HUNDRED {
        return Err(invalid(
            "risk_control.min_confidence must be between 0 and 100",
        ));
    }
    if risk.min_position_usd < Decimal::ZERO {
        return Err(invalid("risk_control.min_position_usd must not be negative"));
    }

    if config.observability.logging.level.trim().is_empty() {
        return Err(invalid("observability.logging.level must not be empty"));
    }

    for symbol in &bt.symbols {
        if symbol.trim().is_empty() {
            return Err(invalid("backtest.symbols must not contain empty names"));
        }
    }

    Ok(())
}
