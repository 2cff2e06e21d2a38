//! Decision Source Port (Driven Port)
//!
//! Interface to whatever produces trading decisions: a model client,
//! a recorded session, or a rule set. Called once per symbol per cycle
//! and shared across concurrent runs, so implementations must tolerate
//! concurrent calls.

use async_trait::async_trait;

use crate::backtest::{Decision, DecisionParseError, MarketSnapshot};
use crate::error::ErrorCode;

/// Decision source error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecisionSourceError {
    /// Source could not be reached.
    #[error("Decision source unavailable: {message}")]
    Unavailable { message: String },

    /// Source answered with something unusable.
    #[error("Invalid decision response: {message}")]
    InvalidResponse { message: String },

    /// Response could not be parsed into decisions.
    #[error(transparent)]
    Parse(#[from] DecisionParseError),
}

impl DecisionSourceError {
    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::DecisionSource
    }
}

/// Port for requesting trading decisions.
#[async_trait]
pub trait DecisionSourcePort: Send + Sync {
    /// Decisions for `symbol` given the current market snapshot.
    ///
    /// An empty list means hold.
    async fn decide(
        &self,
        snapshot: &MarketSnapshot,
        symbol: &str,
    ) -> Result<Vec<Decision>, DecisionSourceError>;
}

/// Decision source that always holds.
#[derive(Debug, Clone, Default)]
pub struct HoldDecisionSource;

#[async_trait]
impl DecisionSourcePort for HoldDecisionSource {
    async fn decide(
        &self,
        _snapshot: &MarketSnapshot,
        _symbol: &str,
    ) -> Result<Vec<Decision>, DecisionSourceError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::*;

    #[tokio::test]
    async fn hold_source_returns_nothing() {
        let snapshot = MarketSnapshot {
            timestamp: 0,
            cycle: 0,
            klines: BTreeMap::new(),
            positions: Vec::new(),
            equity: Decimal::ONE_HUNDRED,
            cash: Decimal::ONE_HUNDRED,
        };

        let decisions = HoldDecisionSource.decide(&snapshot, "BTCUSDT").await.unwrap();
        assert!(decisions.is_empty());
    }

    #[test]
    fn parse_errors_convert() {
        let err: DecisionSourceError = DecisionParseError::NoPayload.into();
        assert!(matches!(err, DecisionSourceError::Parse(_)));
        assert_eq!(err.code(), ErrorCode::DecisionSource);
    }
}
