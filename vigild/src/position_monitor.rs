//! Position Monitor: exit supervision for open positions.
//!
//! A background loop that wakes on a fixed interval, fetches the current
//! price for every watched position, runs the exit state machine
//! ([`vigil_domain::Position::evaluate`]), and executes a market close when
//! a stop-loss or take-profit fires.
//!
//! Per-symbol failures are isolated: a failed price fetch or close attempt
//! is logged and retried next tick, it never aborts the scan of other
//! symbols. Price fetches and close execution happen outside the watched-set
//! lock so slow I/O does not block concurrent add/remove calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vigil_domain::{Position, Symbol, TrailingPolicy};
use vigil_exec::{CloseExecutor, PriceSource};

use crate::error::DaemonResult;
use crate::event_bus::{CoreEvent, EventBus};

// =============================================================================
// Configuration
// =============================================================================

/// Position monitor configuration.
#[derive(Debug, Clone)]
pub struct PositionMonitorConfig {
    /// Wake interval in seconds
    pub check_interval_secs: u64,
    /// Trailing stop gates applied on every evaluation
    pub policy: TrailingPolicy,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            policy: TrailingPolicy::default(),
        }
    }
}

// =============================================================================
// Position Monitor
// =============================================================================

/// Watches open positions and executes protective closes.
pub struct PositionMonitor {
    /// Price lookups
    price_source: Arc<dyn PriceSource>,
    /// Close execution
    close_executor: Arc<dyn CloseExecutor>,
    /// Event bus for close notifications
    event_bus: Arc<EventBus>,
    /// Configuration
    config: PositionMonitorConfig,
    /// Watched positions, keyed by trading pair
    watched: RwLock<HashMap<String, Position>>,
    /// Shutdown token
    shutdown_token: CancellationToken,
}

impl PositionMonitor {
    /// Create a new position monitor.
    pub fn new(
        price_source: Arc<dyn PriceSource>,
        close_executor: Arc<dyn CloseExecutor>,
        event_bus: Arc<EventBus>,
        config: PositionMonitorConfig,
    ) -> Self {
        Self {
            price_source,
            close_executor,
            event_bus,
            config,
            watched: RwLock::new(HashMap::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Start watching a position.
    ///
    /// A second add for the same pair replaces the previous position.
    pub async fn add_position(&self, position: Position) {
        let pair = position.symbol.as_pair();
        let mut watched = self.watched.write().await;
        if watched.insert(pair.clone(), position).is_some() {
            warn!(symbol = %pair, "Replaced an already-watched position");
        } else {
            info!(symbol = %pair, "Position added to monitor");
        }
    }

    /// Stop watching a position. No-op if the pair is not watched.
    pub async fn remove_position(&self, pair: &str) -> Option<Position> {
        let removed = self.watched.write().await.remove(pair);
        if removed.is_some() {
            info!(symbol = %pair, "Position removed from monitor");
        }
        removed
    }

    /// Whether a pair is currently watched.
    pub async fn is_watching(&self, pair: &str) -> bool {
        self.watched.read().await.contains_key(pair)
    }

    /// Number of watched positions.
    pub async fn watched_count(&self) -> usize {
        self.watched.read().await.len()
    }

    /// Snapshot of a watched position.
    pub async fn watched_position(&self, pair: &str) -> Option<Position> {
        self.watched.read().await.get(pair).cloned()
    }

    /// Start the monitor loop in the background.
    ///
    /// Returns a JoinHandle the owner joins on shutdown; an in-flight tick
    /// is allowed to finish before the loop exits.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.config.check_interval_secs,
                "Position monitor started"
            );

            loop {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => {
                        info!("Position monitor received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(self.config.check_interval_secs)) => {
                        self.tick().await;
                    }
                }
            }

            info!("Position monitor stopped");
        })
    }

    /// Request the monitor loop to stop.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    /// Evaluate every watched position once.
    ///
    /// Public so tests and external tickers can drive the monitor
    /// deterministically without the timer.
    pub async fn tick(&self) {
        let pairs: Vec<String> = self.watched.read().await.keys().cloned().collect();

        for pair in pairs {
            if let Err(e) = self.check_position(&pair).await {
                error!(symbol = %pair, error = %e, "Error checking position");
            }
        }
    }

    /// Evaluate a single position and close it if an exit fired.
    async fn check_position(&self, pair: &str) -> DaemonResult<()> {
        // Removed concurrently, nothing to do
        let Some(symbol) = self.symbol_of(pair).await else {
            return Ok(());
        };

        // Price fetch happens outside the lock
        let price = self.price_source.get_price(&symbol).await?;

        let close = {
            let mut watched = self.watched.write().await;
            let Some(position) = watched.get_mut(pair) else {
                return Ok(());
            };

            match position.evaluate(price, &self.config.policy) {
                None => {
                    debug!(
                        symbol = %pair,
                        price = %price,
                        stop_loss = %position.stop_loss,
                        "Position evaluated, no exit"
                    );
                    return Ok(());
                }
                Some(reason) => (reason, position.clone()),
            }
            // Lock released before close execution
        };

        let (reason, position) = close;
        info!(
            symbol = %pair,
            %reason,
            %price,
            entry_price = %position.entry_price,
            "Exit condition fired, executing close"
        );

        match self
            .close_executor
            .execute_close(&symbol, position.side, position.amount)
            .await
        {
            Ok(ack) => {
                self.watched.write().await.remove(pair);
                info!(
                    symbol = %pair,
                    %reason,
                    exit_price = %ack.price,
                    fee = %ack.fee,
                    "Position closed"
                );
                self.event_bus.send(CoreEvent::PositionClosed {
                    symbol,
                    side: position.side,
                    entry_price: position.entry_price,
                    exit_price: ack.price,
                    amount: position.amount,
                    exit_fee: ack.fee,
                    reason,
                    closed_at: ack.executed_at,
                });
            }
            Err(e) => {
                // Position stays watched; retried next tick
                error!(symbol = %pair, error = %e, "Close execution failed, will retry");
            }
        }

        Ok(())
    }

    async fn symbol_of(&self, pair: &str) -> Option<Symbol> {
        self.watched.read().await.get(pair).map(|p| p.symbol.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use vigil_domain::{CloseReason, Price, Quantity, Side};
    use vigil_exec::StubExchange;

    fn long_position(entry: Decimal, stop: Decimal, tp: Decimal, trailing: Decimal) -> Position {
        Position::new(
            Symbol::from_pair("BTCUSDT").unwrap(),
            Side::Long,
            Price::new(entry).unwrap(),
            Quantity::new(dec!(0.1)).unwrap(),
            Price::new(stop).unwrap(),
            Price::new(tp).unwrap(),
            trailing,
        )
        .unwrap()
    }

    fn monitor_with(exchange: Arc<StubExchange>) -> (Arc<PositionMonitor>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(100));
        let monitor = Arc::new(PositionMonitor::new(
            exchange.clone(),
            exchange,
            bus.clone(),
            PositionMonitorConfig::default(),
        ));
        (monitor, bus)
    }

    #[tokio::test]
    async fn test_add_and_remove_positions() {
        let exchange = Arc::new(StubExchange::new(dec!(50000)));
        let (monitor, _bus) = monitor_with(exchange);

        monitor.add_position(long_position(dec!(50000), dec!(49000), dec!(52000), dec!(1.5))).await;
        assert!(monitor.is_watching("BTCUSDT").await);
        assert_eq!(monitor.watched_count().await, 1);

        assert!(monitor.remove_position("BTCUSDT").await.is_some());
        assert_eq!(monitor.watched_count().await, 0);

        // Removing an absent pair is a no-op
        assert!(monitor.remove_position("BTCUSDT").await.is_none());
    }

    #[tokio::test]
    async fn test_tick_holds_between_stop_and_target() {
        let exchange = Arc::new(StubExchange::new(dec!(50000)));
        let (monitor, _bus) = monitor_with(exchange.clone());

        monitor.add_position(long_position(dec!(50000), dec!(49000), dec!(52000), dec!(1.5))).await;
        exchange.set_price("BTCUSDT", dec!(50500));
        monitor.tick().await;

        assert!(monitor.is_watching("BTCUSDT").await);
        assert!(exchange.executed_closes().is_empty());
    }

    #[tokio::test]
    async fn test_tick_closes_at_take_profit() {
        let exchange = Arc::new(StubExchange::new(dec!(50000)));
        let (monitor, bus) = monitor_with(exchange.clone());
        let mut receiver = bus.subscribe();

        monitor.add_position(long_position(dec!(50000), dec!(49000), dec!(52000), dec!(1.5))).await;
        exchange.set_price("BTCUSDT", dec!(52000));
        monitor.tick().await;

        assert!(!monitor.is_watching("BTCUSDT").await);
        let closes = exchange.executed_closes();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].symbol, "BTCUSDT");

        let event = receiver.recv().await.unwrap().unwrap();
        match event {
            CoreEvent::PositionClosed { reason, exit_price, exit_fee, .. } => {
                assert_eq!(reason, CloseReason::TakeProfit);
                assert_eq!(exit_price.as_decimal(), dec!(52000));
                assert_eq!(exit_fee, dec!(5.2)); // 52000 * 0.1 * 0.001
            }
            _ => panic!("Expected PositionClosed event"),
        }
    }

    #[tokio::test]
    async fn test_failed_close_retried_next_tick() {
        let exchange = Arc::new(StubExchange::new(dec!(50000)));
        let (monitor, _bus) = monitor_with(exchange.clone());

        monitor.add_position(long_position(dec!(50000), dec!(49000), dec!(52000), dec!(1.5))).await;
        exchange.set_price("BTCUSDT", dec!(48000));
        exchange.set_fail_next_close(true);

        monitor.tick().await;
        // Close failed, position still watched
        assert!(monitor.is_watching("BTCUSDT").await);
        assert!(exchange.executed_closes().is_empty());

        monitor.tick().await;
        assert!(!monitor.is_watching("BTCUSDT").await);
        assert_eq!(exchange.executed_closes().len(), 1);
    }

    #[tokio::test]
    async fn test_price_failure_isolated_per_symbol() {
        let exchange = Arc::new(StubExchange::new(dec!(50000)));
        let (monitor, _bus) = monitor_with(exchange.clone());

        monitor.add_position(long_position(dec!(50000), dec!(49000), dec!(52000), dec!(1.5))).await;
        let eth = Position::new(
            Symbol::from_pair("ETHUSDT").unwrap(),
            Side::Long,
            Price::new(dec!(3000)).unwrap(),
            Quantity::new(dec!(1)).unwrap(),
            Price::new(dec!(2940)).unwrap(),
            Price::new(dec!(3120)).unwrap(),
            dec!(1.5),
        )
        .unwrap();
        monitor.add_position(eth).await;

        // BTC price fetch fails; ETH hits its target on the same tick
        exchange.set_price_failure("BTCUSDT", true);
        exchange.set_price("ETHUSDT", dec!(3120));
        monitor.tick().await;

        assert!(monitor.is_watching("BTCUSDT").await);
        assert!(!monitor.is_watching("ETHUSDT").await);
    }

    #[tokio::test]
    async fn test_trailing_ratchet_persists_across_ticks() {
        // Entry 100, stop 95, trailing 4%: a rise to 106 lifts the stop to
        // 101.76; the later fall to that level closes as Stop-Loss.
        let exchange = Arc::new(StubExchange::new(dec!(100)));
        let (monitor, bus) = monitor_with(exchange.clone());
        let mut receiver = bus.subscribe();

        monitor.add_position(long_position(dec!(100), dec!(95), dec!(115), dec!(4))).await;

        exchange.set_price("BTCUSDT", dec!(106));
        monitor.tick().await;
        let watched = monitor.watched_position("BTCUSDT").await.unwrap();
        assert_eq!(watched.stop_loss.as_decimal(), dec!(101.76));

        exchange.set_price("BTCUSDT", dec!(101.76));
        monitor.tick().await;
        assert!(!monitor.is_watching("BTCUSDT").await);

        let event = receiver.recv().await.unwrap().unwrap();
        match event {
            CoreEvent::PositionClosed { reason, .. } => {
                assert_eq!(reason, CloseReason::StopLoss);
            }
            _ => panic!("Expected PositionClosed event"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let exchange = Arc::new(StubExchange::new(dec!(50000)));
        let (monitor, _bus) = monitor_with(exchange);

        let handle = monitor.clone().start();
        monitor.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor loop should stop promptly")
            .unwrap();
    }
}
