//! Immutable trade records.
//!
//! A `Trade` is created the moment a position closes and is never mutated
//! afterwards. Realized pnl is derived at construction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{Price, Quantity, Side, Symbol};

/// A closed trade with realized pnl, net of fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trading pair
    pub symbol: Symbol,
    /// Position direction
    pub side: Side,
    /// Fill price at entry
    pub entry_price: Price,
    /// Fill price at exit
    pub exit_price: Price,
    /// Position size in base currency
    pub amount: Quantity,
    /// Fee paid at entry, in quote currency
    pub entry_fee: Decimal,
    /// Fee paid at exit, in quote currency
    pub exit_fee: Decimal,
    /// Realized pnl: gross pnl minus both fees
    pub pnl: Decimal,
    /// Realized pnl as percent of cost basis
    pub pnl_pct: Decimal,
    /// When the position was opened
    pub opened_at: DateTime<Utc>,
    /// When the position was closed
    pub closed_at: DateTime<Utc>,
}

impl Trade {
    /// Build a trade record, deriving `pnl` and `pnl_pct`.
    ///
    /// Gross pnl is `(exit - entry) * amount` for LONG and
    /// `(entry - exit) * amount` for SHORT; realized pnl subtracts both fees.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        side: Side,
        entry_price: Price,
        exit_price: Price,
        amount: Quantity,
        entry_fee: Decimal,
        exit_fee: Decimal,
        opened_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let gross = match side {
            Side::Long => (exit_price.as_decimal() - entry_price.as_decimal()) * amount.as_decimal(),
            Side::Short => (entry_price.as_decimal() - exit_price.as_decimal()) * amount.as_decimal(),
        };
        let pnl = gross - entry_fee - exit_fee;
        let cost_basis = entry_price.as_decimal() * amount.as_decimal();
        let pnl_pct = if cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            pnl / cost_basis * Decimal::from(100)
        };

        Self {
            symbol,
            side,
            entry_price,
            exit_price,
            amount,
            entry_fee,
            exit_fee,
            pnl,
            pnl_pct,
            opened_at,
            closed_at,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_long_trade_pnl() {
        // (52000 - 50000) * 0.1 - 5 - 5.2 = 189.8
        let trade = Trade::new(
            Symbol::from_pair("BTCUSDT").unwrap(),
            Side::Long,
            Price::new(dec!(50000)).unwrap(),
            Price::new(dec!(52000)).unwrap(),
            Quantity::new(dec!(0.1)).unwrap(),
            dec!(5),
            dec!(5.2),
            Utc::now(),
            Utc::now(),
        );

        assert_eq!(trade.pnl, dec!(189.8));
    }

    #[test]
    fn test_short_trade_pnl() {
        // (50000 - 48000) * 0.1 - 5 - 4.8 = 190.2
        let trade = Trade::new(
            Symbol::from_pair("BTCUSDT").unwrap(),
            Side::Short,
            Price::new(dec!(50000)).unwrap(),
            Price::new(dec!(48000)).unwrap(),
            Quantity::new(dec!(0.1)).unwrap(),
            dec!(5),
            dec!(4.8),
            Utc::now(),
            Utc::now(),
        );

        assert_eq!(trade.pnl, dec!(190.2));
    }

    #[test]
    fn test_losing_trade_pnl() {
        let trade = Trade::new(
            Symbol::from_pair("ETHUSDT").unwrap(),
            Side::Long,
            Price::new(dec!(3000)).unwrap(),
            Price::new(dec!(2900)).unwrap(),
            Quantity::new(dec!(1)).unwrap(),
            dec!(3),
            dec!(2.9),
            Utc::now(),
            Utc::now(),
        );

        assert_eq!(trade.pnl, dec!(-105.9));
        assert!(trade.pnl_pct < Decimal::ZERO);
    }

    #[test]
    fn test_trade_serialization_round_trip() {
        let trade = Trade::new(
            Symbol::from_pair("BTCUSDT").unwrap(),
            Side::Long,
            Price::new(dec!(50000)).unwrap(),
            Price::new(dec!(52000)).unwrap(),
            Quantity::new(dec!(0.1)).unwrap(),
            dec!(5),
            dec!(5.2),
            Utc::now(),
            Utc::now(),
        );

        let json = serde_json::to_string(&trade).unwrap();
        let parsed: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.pnl, dec!(189.8));
        assert_eq!(parsed.symbol.as_pair(), "BTCUSDT");
    }
}
