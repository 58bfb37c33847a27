//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access.

use crate::error::StoreError;
use crate::repository::{EmergencyEventRepository, TradeRepository};
use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;
use vigil_domain::{EmergencyEvent, Trade};

/// In-memory store for testing and single-process deployments
pub struct MemoryStore {
    trades: RwLock<Vec<Trade>>,
    events: RwLock<Vec<EmergencyEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            trades: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Get the number of stored trades
    pub fn trade_count(&self) -> usize {
        self.trades.read().unwrap().len()
    }

    /// Get the number of stored emergency events
    pub fn event_count(&self) -> usize {
        self.events.read().unwrap().len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        self.trades.write().unwrap().clear();
        self.events.write().unwrap().clear();
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    /// Make every subsequent write fail (database failure injection)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected write failure"));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeRepository for MemoryStore {
    async fn append(&self, trade: &Trade) -> Result<(), StoreError> {
        self.check_writable()?;
        self.trades.write().unwrap().push(trade.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Trade>, StoreError> {
        Ok(self.trades.read().unwrap().clone())
    }

    async fn list_by_symbol(&self, pair: &str) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .trades
            .read()
            .unwrap()
            .iter()
            .filter(|t| t.symbol.as_pair() == pair)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EmergencyEventRepository for MemoryStore {
    async fn append(&self, event: &EmergencyEvent) -> Result<(), StoreError> {
        self.check_writable()?;
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EmergencyEvent>, StoreError> {
        Ok(self.events.read().unwrap().clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<EmergencyEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn latest(&self) -> Result<Option<EmergencyEvent>, StoreError> {
        Ok(self.events.read().unwrap().last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use vigil_domain::{EmergencyTrigger, Metadata, Price, Quantity, Side, Symbol, TradingMode};

    fn sample_trade(pair: &str) -> Trade {
        Trade::new(
            Symbol::from_pair(pair).unwrap(),
            Side::Long,
            Price::new(dec!(50000)).unwrap(),
            Price::new(dec!(52000)).unwrap(),
            Quantity::new(dec!(0.1)).unwrap(),
            dec!(5),
            dec!(5.2),
            Utc::now(),
            Utc::now(),
        )
    }

    fn sample_event() -> EmergencyEvent {
        EmergencyEvent::new(
            Utc::now(),
            EmergencyTrigger::Manual,
            TradingMode::Normal,
            TradingMode::EmergencyStop,
            "operator action".to_string(),
            Metadata::new(),
        )
    }

    #[tokio::test]
    async fn test_trade_append_and_list() {
        let store = MemoryStore::new();
        TradeRepository::append(&store, &sample_trade("BTCUSDT")).await.unwrap();
        TradeRepository::append(&store, &sample_trade("ETHUSDT")).await.unwrap();

        assert_eq!(store.trade_count(), 2);
        let btc = store.list_by_symbol("BTCUSDT").await.unwrap();
        assert_eq!(btc.len(), 1);
        assert_eq!(btc[0].symbol.as_pair(), "BTCUSDT");
    }

    #[tokio::test]
    async fn test_event_append_find_latest() {
        let store = MemoryStore::new();
        let event = sample_event();
        EmergencyEventRepository::append(&store, &event).await.unwrap();

        let found = store.find_by_id(event.id).await.unwrap();
        assert!(found.is_some());

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, event.id);
        assert_eq!(latest.mode_after, TradingMode::EmergencyStop);
    }

    #[tokio::test]
    async fn test_write_failure_injection() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);

        let result = TradeRepository::append(&store, &sample_trade("BTCUSDT")).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.trade_count(), 0);

        store.set_fail_writes(false);
        TradeRepository::append(&store, &sample_trade("BTCUSDT")).await.unwrap();
        assert_eq!(store.trade_count(), 1);
    }
}
