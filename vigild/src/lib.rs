//! Vigil Daemon Library
//!
//! Runtime orchestrator for the Vigil risk and execution management core.
//!
//! # Architecture
//!
//! ```text
//! Signal Source → Risk Service → Portfolio Manager (capital gates)
//!                      │               ↑
//!                      │          PnL Tracker (bookkeeping)
//!                      ↓
//!               Position Monitor (exit supervision)
//!                      ↓
//!                  Event Bus (closes, mode changes)
//!                      ↑
//!              Safety Protocol (trading mode, watchdogs)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Risk Service**: Open gating and close settlement
//! - **Position Monitor**: Background loop running the exit state machine
//! - **Event Bus**: Internal communication (closes, emergency transitions)
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use vigild::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config).expect("Failed to wire daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;
pub mod position_monitor;
pub mod service;

// Re-exports for convenience
pub use config::{Config, Environment, ExitConfig, PortfolioSettings, SafetySettings};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{CoreEvent, EventBus, EventReceiver};
pub use position_monitor::{PositionMonitor, PositionMonitorConfig};
pub use service::{OpenRequest, RiskService};
