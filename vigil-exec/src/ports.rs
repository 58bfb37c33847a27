//! Execution layer port definitions.
//!
//! Ports define the interfaces the risk core needs from an exchange.
//! Adapters implement these ports for specific venues (stub, Binance, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vigil_domain::{Price, Quantity, Side, Symbol};

use crate::error::ExecError;

// =============================================================================
// Price Source Port
// =============================================================================

/// Port for current market prices.
///
/// Implementations:
/// - `StubExchange` - For testing (manually injected prices)
/// - A real exchange adapter polling or streaming ticker data
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get the current price for a symbol.
    ///
    /// A failure here must never abort the caller's monitoring loop; the
    /// caller logs it and retries on the next cycle.
    async fn get_price(&self, symbol: &Symbol) -> Result<Price, ExecError>;
}

// =============================================================================
// Close Executor Port
// =============================================================================

/// Port for executing protective position closes.
#[async_trait]
pub trait CloseExecutor: Send + Sync {
    /// Close the full position with a market order.
    ///
    /// `side` is the side of the POSITION being closed; the adapter submits
    /// the opposite-side order. Returns the fill details on success.
    async fn execute_close(
        &self,
        symbol: &Symbol,
        side: Side,
        amount: Quantity,
    ) -> Result<CloseAck, ExecError>;
}

/// Result of a successful close execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseAck {
    /// Actual fill price
    pub price: Price,
    /// Trading fee paid, in quote currency
    pub fee: Decimal,
    /// When the order was filled
    pub executed_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_close_ack_serialization() {
        let ack = CloseAck {
            price: Price::new(dec!(52000)).unwrap(),
            fee: dec!(5.2),
            executed_at: Utc::now(),
        };

        let json = serde_json::to_string(&ack).unwrap();
        let parsed: CloseAck = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.price.as_decimal(), dec!(52000));
        assert_eq!(parsed.fee, dec!(5.2));
    }
}
