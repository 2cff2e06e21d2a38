//! Stable error codes for the backtest engine.
//!
//! Every error enum in the crate exposes `code()` returning an [`ErrorCode`].
//! Codes serialize as SCREAMING_SNAKE_CASE reason strings and are safe to
//! persist or match on from outside the process.
//!
//! # Categories
//!
//! | Category | Codes |
//! |----------|-------|
//! | Validation | `INVALID_QUANTITY`, `INVALID_PRICE`, `INVALID_CONFIG` |
//! | Funds | `INSUFFICIENT_FUNDS` |
//! | Not found | `POSITION_NOT_FOUND`, `NOT_FOUND` |
//! | Conflict | `ALREADY_EXISTS`, `CANNOT_DELETE_RUNNING`, `INVALID_STATE` |
//! | Failure | `STRUCTURAL_FAILURE`, `DECISION_SOURCE` |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes for the backtest engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Ledger validation
    /// Order quantity not positive.
    InvalidQuantity,
    /// Order price not usable.
    InvalidPrice,
    /// Margin plus fee exceeds cash.
    InsufficientFunds,
    /// No position for the symbol and side.
    PositionNotFound,

    // Run registry
    /// Duplicate run identifier.
    AlreadyExists,
    /// Unknown run identifier.
    NotFound,
    /// Run is still executing.
    CannotDeleteRunning,
    /// Operation not allowed in the run's status.
    InvalidState,

    // Run failures
    /// Run aborted, e.g. no data loaded.
    StructuralFailure,
    /// Decision source failed or answered garbage.
    DecisionSource,

    // Setup
    /// Configuration rejected.
    InvalidConfig,
}

/// Coarse grouping of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed input.
    Validation,
    /// Not enough cash.
    Funds,
    /// Missing entity.
    NotFound,
    /// Entity exists or is in the wrong state.
    Conflict,
    /// Operation failed.
    Failure,
}

impl ErrorCode {
    /// Category of this code.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidQuantity | Self::InvalidPrice | Self::InvalidConfig => {
                ErrorCategory::Validation
            }
            Self::InsufficientFunds => ErrorCategory::Funds,
            Self::PositionNotFound | Self::NotFound => ErrorCategory::NotFound,
            Self::AlreadyExists | Self::CannotDeleteRunning | Self::InvalidState => {
                ErrorCategory::Conflict
            }
            Self::StructuralFailure | Self::DecisionSource => ErrorCategory::Failure,
        }
    }

    /// Reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::InvalidPrice => "INVALID_PRICE",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::PositionNotFound => "POSITION_NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::CannotDeleteRunning => "CANNOT_DELETE_RUNNING",
            Self::InvalidState => "INVALID_STATE",
            Self::StructuralFailure => "STRUCTURAL_FAILURE",
            Self::DecisionSource => "DECISION_SOURCE",
            Self::InvalidConfig => "INVALID_CONFIG",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Error retained for later inspection, e.g. in run metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Additional context (key-value pairs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<(String, String)>,
}

impl ErrorReport {
    /// Create a report.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the report.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.context.is_empty() {
            let ctx: Vec<String> = self
                .context
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " ({})", ctx.join(", "))?;
        }
        Ok(())
    }
}
