//! Vigil PnL Tracker
//!
//! Authoritative record of cost basis, fees, and realized/unrealized
//! performance. Pure bookkeeping with no I/O: the owning service wraps the
//! tracker in a lock and feeds it opens and closes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod tracker;

pub use tracker::{PnlError, PnlSummary, PnlTracker};
