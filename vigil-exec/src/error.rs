//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Price lookup failed for a symbol
    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable {
        /// Trading pair
        symbol: String,
        /// Underlying cause
        reason: String,
    },

    /// Protective close could not be executed
    #[error("Close execution failed for {symbol}: {reason}")]
    ExecutionFailed {
        /// Trading pair
        symbol: String,
        /// Underlying cause
        reason: String,
    },

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] vigil_domain::DomainError),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
