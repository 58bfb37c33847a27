//! Daemon error types.

use thiserror::Error;
use vigil_domain::{DomainError, TradingMode};
use vigil_exec::ExecError;
use vigil_pnl::PnlError;
use vigil_portfolio::OpenRejection;
use vigil_store::StoreError;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// PnL bookkeeping error
    #[error("PnL error: {0}")]
    Pnl(#[from] PnlError),

    /// Position open request rejected by the portfolio manager
    #[error("Open rejected: {0}")]
    OpenRejected(#[from] OpenRejection),

    /// New positions are not allowed in the current trading mode
    #[error("Trading halted: mode is {0}")]
    TradingHalted(TradingMode),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
