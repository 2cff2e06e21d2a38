//! Runner errors.

use thiserror::Error;

use super::metadata::RunStatus;
use crate::backtest::account::AccountError;
use crate::error::ErrorCode;

/// Errors that abort a run or reject a runner operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// The run cannot proceed, e.g. no klines loaded.
    #[error("Structural failure: {message}")]
    StructuralFailure {
        /// Cause.
        message: String,
    },

    /// Operation not allowed in the current status.
    #[error("Run {run_id} is {status}")]
    InvalidState {
        /// Run identifier.
        run_id: String,
        /// Status at the time of the call.
        status: RunStatus,
    },

    /// Ledger invariant broken during a forced close.
    #[error(transparent)]
    Account(#[from] AccountError),
}

impl RunnerError {
    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::StructuralFailure { .. } | Self::Account(_) => ErrorCode::StructuralFailure,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
        }
    }
}
