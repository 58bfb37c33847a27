//! Vigil Daemon
//!
//! Runtime orchestrator for position monitoring, pnl tracking, portfolio
//! allocation, and the emergency safety protocol.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p vigild
//!
//! # Start with custom environment
//! VIGIL_ENV=test VIGIL_CHECK_INTERVAL_SECONDS=2 cargo run -p vigild
//! ```
//!
//! # Environment Variables
//!
//! - `VIGIL_ENV`: Environment (test, development, production)
//! - `VIGIL_CHECK_INTERVAL_SECONDS`: Monitor wake interval (default: 5)
//! - `VIGIL_STOP_LOSS_PCT`: Initial stop distance (default: 2.0)
//! - `VIGIL_TAKE_PROFIT_PCT`: Take-profit distance (default: 4.0)
//! - `VIGIL_TRAILING_STOP_PCT`: Trailing distance (default: 1.5)
//! - `VIGIL_TOTAL_CAPITAL`: Capital under management (default: 100000)
//! - `VIGIL_SYMBOLS`: Comma-separated pairs (default: BTCUSDT,ETHUSDT,BNBUSDT)
//! - `VIGIL_MAX_PORTFOLIO_RISK_PCT`: Aggregate risk cap (default: 0.12)
//! - `VIGIL_NETWORK_TIMEOUT_SECONDS`: Disconnect threshold (default: 300)
//! - `VIGIL_EXCESSIVE_LOSS_DRAWDOWN_PCT`: Drawdown threshold (default: 7.0)

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vigild::{Config, Daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vigild=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Vigil Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::new_stub(config)?;
    daemon.run().await?;

    Ok(())
}
