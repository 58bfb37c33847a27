//! # Vigil Store
//!
//! Persistence layer for the Vigil risk core.
//!
//! Defines repository ports for the audit surfaces (trade history and
//! emergency events) and an in-memory implementation used by the daemon
//! and the test suite. Implementations must be thread-safe.

#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod repository;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{EmergencyEventRepository, TradeRepository};
