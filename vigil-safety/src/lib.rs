//! # Vigil Safety
//!
//! Emergency safety protocol for the Vigil risk core.
//!
//! Owns the global [`vigil_domain::TradingMode`] and the audited transitions
//! between modes. Automatic detectors watch network connectivity, API rate
//! limits, persistence integrity, and drawdown; operators can trigger the
//! same transitions manually. Every successful transition is appended to the
//! emergency event repository.

#![warn(missing_docs)]

pub mod clock;
pub mod protocol;

pub use clock::{Clock, ManualClock, SystemClock};
pub use protocol::{SafetyConfig, SafetyProtocol};
