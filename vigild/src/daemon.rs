//! Daemon: main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Risk Service (open gating, close settlement)
//! - Position Monitor (background exit supervision)
//! - Safety Protocol (trading mode, audited transitions)
//! - Event Bus (internal communication)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Restore emergency history from the store
//! 4. Start the position monitor loop
//! 5. Main event loop (settle closes, log transitions)
//! 6. Graceful shutdown on SIGINT, joining the monitor with a bounded timeout

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use vigil_domain::{Symbol, TrailingPolicy};
use vigil_exec::StubExchange;
use vigil_portfolio::{PortfolioConfig, PortfolioManager};
use vigil_safety::{SafetyConfig, SafetyProtocol, SystemClock};
use vigil_store::MemoryStore;

use crate::config::{Config, Environment};
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{CoreEvent, EventBus};
use crate::position_monitor::{PositionMonitor, PositionMonitorConfig};
use crate::service::RiskService;

// =============================================================================
// Daemon
// =============================================================================

/// The main Vigil daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Risk service
    service: Arc<RiskService>,
    /// Event bus
    event_bus: Arc<EventBus>,
    /// Monitor handle, kept for graceful shutdown
    monitor: Arc<PositionMonitor>,
}

impl Daemon {
    /// Create a new daemon with stub components (for testing/development).
    pub fn new_stub(config: Config) -> DaemonResult<Self> {
        let exchange = Arc::new(StubExchange::new(rust_decimal_macros::dec!(50000)));
        let store = Arc::new(MemoryStore::new());
        let event_bus = Arc::new(EventBus::new(1000));

        let symbols = config
            .portfolio
            .symbols
            .iter()
            .map(|s| Symbol::from_pair(s))
            .collect::<Result<Vec<_>, _>>()?;

        let portfolio = Arc::new(PortfolioManager::new(
            config.portfolio.total_capital,
            &symbols,
            PortfolioConfig {
                max_portfolio_risk_pct: config.portfolio.max_portfolio_risk_pct,
                max_symbols_active: config.portfolio.max_symbols_active,
                correlation_threshold: config.portfolio.correlation_threshold,
            },
        )?);

        let safety = Arc::new(SafetyProtocol::new(
            store.clone(),
            Arc::new(SystemClock),
            SafetyConfig {
                auto_trigger_enabled: config.safety.auto_trigger_enabled,
                require_confirmation: config.safety.require_confirmation,
                network_timeout_secs: config.safety.network_timeout_secs,
                excessive_loss_threshold_pct: config.safety.excessive_loss_drawdown_pct,
            },
        ));

        let monitor = Arc::new(PositionMonitor::new(
            exchange.clone(),
            exchange,
            event_bus.clone(),
            PositionMonitorConfig {
                check_interval_secs: config.exits.check_interval_secs,
                policy: TrailingPolicy {
                    min_move_pct: config.exits.min_trailing_move_pct,
                    activation_pnl_pct: config.exits.trailing_activation_pnl_pct,
                },
            },
        ));

        let service = Arc::new(RiskService::new(
            portfolio,
            safety,
            monitor.clone(),
            event_bus.clone(),
            store,
            config.exits.clone(),
            config.portfolio.total_capital,
        ));

        Ok(Self {
            config,
            service,
            event_bus,
            monitor,
        })
    }

    /// The risk service, for external signal sources and operator commands.
    pub fn service(&self) -> &Arc<RiskService> {
        &self.service
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT) or a
    /// Shutdown event is received.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            symbols = ?self.config.portfolio.symbols,
            "Starting Vigil daemon"
        );

        // 1. Restore the emergency audit trail
        self.service.safety().load_history().await?;

        // 2. Start the monitor loop
        let monitor_handle = self.monitor.clone().start();

        // 3. Subscribe to the event bus
        let mut event_receiver = self.event_bus.subscribe();

        // 4. Main event loop
        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(event_result) = event_receiver.recv() => {
                    match event_result {
                        Ok(event) => {
                            match self.handle_event(event).await {
                                Err(DaemonError::Shutdown) => break,
                                Err(e) => error!(error = %e, "Error handling event"),
                                Ok(()) => {}
                            }
                        }
                        Err(lag_msg) => {
                            warn!(%lag_msg, "Event receiver lagged");
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // 5. Graceful shutdown
        self.shutdown(monitor_handle).await;

        Ok(())
    }

    /// Handle an event from the event bus.
    async fn handle_event(&self, event: CoreEvent) -> DaemonResult<()> {
        match event {
            CoreEvent::PositionOpened { symbol, side, entry_price, .. } => {
                info!(
                    symbol = %symbol,
                    %side,
                    %entry_price,
                    "Position opened"
                );
            }

            CoreEvent::PositionClosed { symbol, exit_price, exit_fee, reason, .. } => {
                let trade = self.service.settle_close(&symbol, exit_price, exit_fee).await?;
                info!(
                    symbol = %symbol,
                    %reason,
                    pnl = %trade.pnl,
                    "Position closed and settled"
                );
            }

            CoreEvent::ModeChanged { mode_before, mode_after, trigger, reason } => {
                warn!(
                    %mode_before,
                    %mode_after,
                    %trigger,
                    %reason,
                    "Trading mode changed"
                );
            }

            CoreEvent::Shutdown => {
                info!("Shutdown event received");
                return Err(DaemonError::Shutdown);
            }
        }

        Ok(())
    }

    /// Graceful shutdown: stop the monitor and join it with a bounded wait.
    ///
    /// An in-flight tick finishes before the loop exits, so no position
    /// mutation is lost mid-evaluation.
    async fn shutdown(&self, monitor_handle: tokio::task::JoinHandle<()>) {
        info!("Initiating graceful shutdown");
        self.monitor.shutdown();

        match tokio::time::timeout(Duration::from_secs(10), monitor_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Monitor task panicked"),
            Err(_) => warn!("Monitor did not stop within 10s, abandoning"),
        }

        let watched = self.monitor.watched_count().await;
        let summary = self.service.pnl_summary().await;
        info!(
            open_positions = watched,
            total_trades = summary.total_trades,
            realized_pnl = %summary.realized_pnl,
            "Shutdown complete"
        );
    }

    /// Whether the daemon runs against stub components.
    pub fn is_stub(&self) -> bool {
        self.config.environment != Environment::Production
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_stub_creation() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config).unwrap();

        assert!(daemon.is_stub());
        assert_eq!(daemon.service().monitor().watched_count().await, 0);
    }

    #[tokio::test]
    async fn test_daemon_shutdown_event_breaks_loop() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config).unwrap();
        let bus = daemon.event_bus.clone();

        let run = tokio::spawn(daemon.run());
        // Give the loop a moment to subscribe before sending
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.send(CoreEvent::Shutdown);

        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("daemon should shut down promptly")
            .unwrap()
            .unwrap();
    }
}
