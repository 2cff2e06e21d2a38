//! Input data locations.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the binary reads klines and recorded decisions from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DataConfig {
    /// Kline JSON file per symbol.
    #[serde(default)]
    pub klines: BTreeMap<String, PathBuf>,
    /// Recorded decision responses (JSON array).
    #[serde(default)]
    pub decisions: Option<PathBuf>,
}
