//! Stub exchange implementation for testing.
//!
//! Simulates price lookups and immediate close fills without real API calls.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use vigil_domain::{Price, Quantity, Side, Symbol};

use crate::error::ExecError;
use crate::ports::{CloseAck, CloseExecutor, PriceSource};

/// A close the stub has executed, recorded for test assertions.
#[derive(Debug, Clone)]
pub struct ExecutedClose {
    /// Trading pair
    pub symbol: String,
    /// Side of the position that was closed
    pub side: Side,
    /// Position size
    pub amount: Quantity,
    /// Fill price
    pub price: Price,
}

/// Stub exchange for testing.
///
/// Prices are injected manually; closes fill immediately at the current
/// price with a flat fee rate.
pub struct StubExchange {
    /// Current prices by symbol
    prices: RwLock<HashMap<String, Decimal>>,
    /// Default price for unknown symbols
    default_price: Decimal,
    /// Simulated fee rate (0.001 = 0.1%)
    fee_rate: Decimal,
    /// Symbols whose price lookups always fail
    fail_symbols: RwLock<HashSet<String>>,
    /// Whether to fail the next close execution
    fail_next_close: RwLock<bool>,
    /// Record of executed closes
    closes: RwLock<Vec<ExecutedClose>>,
}

impl StubExchange {
    /// Create a new stub exchange with a default price.
    pub fn new(default_price: Decimal) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            default_price,
            fee_rate: Decimal::new(1, 3), // 0.001 = 0.1%
            fail_symbols: RwLock::new(HashSet::new()),
            fail_next_close: RwLock::new(false),
            closes: RwLock::new(Vec::new()),
        }
    }

    /// Set price for a specific symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        let mut prices = self.prices.write().unwrap();
        prices.insert(symbol.to_string(), price);
    }

    /// Get price for a symbol (or default).
    pub fn get_price_decimal(&self, symbol: &str) -> Decimal {
        let prices = self.prices.read().unwrap();
        prices.get(symbol).copied().unwrap_or(self.default_price)
    }

    /// Make price lookups for `symbol` fail until cleared.
    pub fn set_price_failure(&self, symbol: &str, fail: bool) {
        let mut fail_symbols = self.fail_symbols.write().unwrap();
        if fail {
            fail_symbols.insert(symbol.to_string());
        } else {
            fail_symbols.remove(symbol);
        }
    }

    /// Configure the next close execution to fail.
    pub fn set_fail_next_close(&self, fail: bool) {
        let mut fail_next = self.fail_next_close.write().unwrap();
        *fail_next = fail;
    }

    /// Closes executed so far, in order.
    pub fn executed_closes(&self) -> Vec<ExecutedClose> {
        self.closes.read().unwrap().clone()
    }

    fn should_fail_close(&self) -> bool {
        let mut fail_next = self.fail_next_close.write().unwrap();
        let fail = *fail_next;
        *fail_next = false; // Reset after check
        fail
    }
}

#[async_trait]
impl PriceSource for StubExchange {
    async fn get_price(&self, symbol: &Symbol) -> Result<Price, ExecError> {
        let pair = symbol.as_pair();
        if self.fail_symbols.read().unwrap().contains(&pair) {
            return Err(ExecError::PriceUnavailable {
                symbol: pair,
                reason: "Simulated price fetch failure".to_string(),
            });
        }

        let price = self.get_price_decimal(&pair);
        Price::new(price).map_err(ExecError::from)
    }
}

#[async_trait]
impl CloseExecutor for StubExchange {
    async fn execute_close(
        &self,
        symbol: &Symbol,
        side: Side,
        amount: Quantity,
    ) -> Result<CloseAck, ExecError> {
        let pair = symbol.as_pair();
        if self.should_fail_close() {
            return Err(ExecError::ExecutionFailed {
                symbol: pair,
                reason: "Simulated exchange failure".to_string(),
            });
        }

        let price = self.get_price_decimal(&pair);
        let fee = price * amount.as_decimal() * self.fee_rate;
        let fill = Price::new(price).map_err(ExecError::from)?;

        self.closes.write().unwrap().push(ExecutedClose {
            symbol: pair,
            side,
            amount,
            price: fill,
        });

        Ok(CloseAck {
            price: fill,
            fee,
            executed_at: Utc::now(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_price_lookup_with_default() {
        let exchange = StubExchange::new(dec!(50000));
        exchange.set_price("ETHUSDT", dec!(3000));

        let eth = Symbol::from_pair("ETHUSDT").unwrap();
        let btc = Symbol::from_pair("BTCUSDT").unwrap();

        assert_eq!(exchange.get_price(&eth).await.unwrap().as_decimal(), dec!(3000));
        assert_eq!(exchange.get_price(&btc).await.unwrap().as_decimal(), dec!(50000)); // Default
    }

    #[tokio::test]
    async fn test_price_failure_injection() {
        let exchange = StubExchange::new(dec!(50000));
        let symbol = Symbol::from_pair("BTCUSDT").unwrap();

        exchange.set_price_failure("BTCUSDT", true);
        assert!(exchange.get_price(&symbol).await.is_err());

        exchange.set_price_failure("BTCUSDT", false);
        assert!(exchange.get_price(&symbol).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_fills_at_current_price() {
        let exchange = StubExchange::new(dec!(50000));
        exchange.set_price("BTCUSDT", dec!(52000));
        let symbol = Symbol::from_pair("BTCUSDT").unwrap();

        let ack = exchange
            .execute_close(&symbol, Side::Long, Quantity::new(dec!(0.1)).unwrap())
            .await
            .unwrap();

        // 52000 * 0.1 * 0.001 = 5.2
        assert_eq!(ack.price.as_decimal(), dec!(52000));
        assert_eq!(ack.fee, dec!(5.2));

        let closes = exchange.executed_closes();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].symbol, "BTCUSDT");
        assert_eq!(closes[0].side, Side::Long);
    }

    #[tokio::test]
    async fn test_close_failure_resets_after_one_call() {
        let exchange = StubExchange::new(dec!(50000));
        let symbol = Symbol::from_pair("BTCUSDT").unwrap();
        let amount = Quantity::new(dec!(0.1)).unwrap();

        exchange.set_fail_next_close(true);
        assert!(exchange.execute_close(&symbol, Side::Long, amount).await.is_err());

        // Next call should succeed
        assert!(exchange.execute_close(&symbol, Side::Long, amount).await.is_ok());
        assert_eq!(exchange.executed_closes().len(), 1);
    }
}
