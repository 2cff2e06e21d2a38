//! Simulated account error types.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::backtest::types::Side;
use crate::error::ErrorCode;

/// Errors rejecting a single ledger operation. The ledger is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    /// Quantity must be positive.
    #[error("invalid quantity: {quantity}")]
    InvalidQuantity {
        /// Rejected quantity.
        quantity: Decimal,
    },

    /// Price must be positive for opens and non-negative for closes.
    #[error("invalid price: {price}")]
    InvalidPrice {
        /// Rejected price.
        price: Decimal,
    },

    /// Margin plus fee exceeds available cash.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Margin plus opening fee.
        required: Decimal,
        /// Cash at the time of the request.
        available: Decimal,
    },

    /// No position for the requested symbol and side.
    #[error("position not found: {symbol} {side}")]
    PositionNotFound {
        /// Symbol.
        symbol: String,
        /// Side.
        side: Side,
    },
}

impl AccountError {
    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidQuantity { .. } => ErrorCode::InvalidQuantity,
            Self::InvalidPrice { .. } => ErrorCode::InvalidPrice,
            Self::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            Self::PositionNotFound { .. } => ErrorCode::PositionNotFound,
        }
    }
}
