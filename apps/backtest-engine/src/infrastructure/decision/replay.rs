//! Replays recorded decision-source responses.
//!
//! Each record holds the raw text a decision source returned for one symbol
//! at one simulated timestamp. Replaying the same records over the same
//! klines reproduces a run exactly.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::application::ports::{DecisionSourceError, DecisionSourcePort};
use crate::backtest::{Decision, MarketSnapshot, TimestampMs, parse_decisions};

/// One recorded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    /// Simulated time the response was produced for.
    pub timestamp: TimestampMs,
    /// Symbol the response was produced for.
    pub symbol: String,
    /// Raw response text.
    pub response: String,
}

/// Failure to load recorded responses.
#[derive(Debug, Error)]
pub enum ReplayLoadError {
    /// File could not be read.
    #[error("Failed to read decisions file '{path}': {source}")]
    Read {
        /// File path.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// File is not a JSON array of records.
    #[error("Failed to parse decisions file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Decision source backed by recorded responses.
///
/// Missing entries mean hold. Unparseable entries surface as
/// [`DecisionSourceError::Parse`].
#[derive(Debug, Clone, Default)]
pub struct ReplayDecisionSource {
    responses: HashMap<(TimestampMs, String), String>,
}

impl ReplayDecisionSource {
    /// Build from records. Later duplicates replace earlier ones.
    pub fn new(records: impl IntoIterator<Item = RecordedResponse>) -> Self {
        let responses = records
            .into_iter()
            .map(|r| ((r.timestamp, r.symbol.trim().to_uppercase()), r.response))
            .collect();
        Self { responses }
    }

    /// Parse a JSON array of records.
    pub fn from_json(json: &str) -> Result<Self, ReplayLoadError> {
        let records: Vec<RecordedResponse> = serde_json::from_str(json)?;
        Ok(Self::new(records))
    }

    /// Load a JSON array of records from disk.
    pub fn from_file(path: &Path) -> Result<Self, ReplayLoadError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ReplayLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Number of recorded responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Whether no responses are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[async_trait]
impl DecisionSourcePort for ReplayDecisionSource {
    async fn decide(
        &self,
        snapshot: &MarketSnapshot,
        symbol: &str,
    ) -> Result<Vec<Decision>, DecisionSourceError> {
        let key = (snapshot.timestamp, symbol.to_uppercase());
        let Some(response) = self.responses.get(&key) else {
            debug!(timestamp = snapshot.timestamp, symbol, "No recorded response");
            return Ok(Vec::new());
        };
        Ok(parse_decisions(response)?)
    }
}
