//! # Vigil Exec
//!
//! Execution layer for the Vigil risk core.
//!
//! Defines the ports the risk core needs from an exchange (price lookup and
//! protective close execution) and a stub adapter for tests and dry runs.
//! Real exchange adapters implement the same ports.

#![warn(missing_docs)]

pub mod error;
pub mod ports;
pub mod stub;

pub use error::ExecError;
pub use ports::{CloseAck, CloseExecutor, PriceSource};
pub use stub::StubExchange;
