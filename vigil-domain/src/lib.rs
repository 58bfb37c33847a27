//! Vigil Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains value objects, the position exit state machine, trade records,
//! and the trading-mode/emergency types used by the safety protocol.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod position;
pub mod safety;
pub mod trade;
pub mod value_objects;

// Re-export commonly used types
pub use position::{CloseReason, Position, TrailingPolicy};
pub use safety::{EmergencyEvent, EmergencyTrigger, Metadata, TradingMode};
pub use trade::Trade;
pub use value_objects::{DomainError, Price, Quantity, Side, Symbol};
