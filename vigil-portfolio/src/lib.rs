//! Vigil Portfolio Manager
//!
//! Owns the mapping from total capital to per-symbol allocations and gates
//! new exposure against capital, active-symbol, aggregate-risk, and
//! correlation limits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocation;
pub mod correlation;
pub mod manager;

pub use allocation::SymbolAllocation;
pub use correlation::{CorrelationMatrix, PriceHistory, MAX_SAMPLES, MIN_SAMPLES};
pub use manager::{OpenRejection, PortfolioConfig, PortfolioManager, PortfolioState};
