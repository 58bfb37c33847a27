//! Realized/unrealized pnl bookkeeping.
//!
//! At most one open position per symbol. Closes produce immutable `Trade`
//! records; a breakeven close increments the trade count but neither the win
//! nor the loss counter.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use vigil_domain::{Price, Quantity, Side, Symbol, Trade};

// =============================================================================
// Errors
// =============================================================================

/// Errors from the pnl tracker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PnlError {
    /// A position for this symbol is already open
    #[error("Position already open for {0}")]
    AlreadyOpen(String),

    /// No open position exists for this symbol
    #[error("No open position for {0}")]
    NotOpen(String),
}

// =============================================================================
// Open cost basis
// =============================================================================

/// Cost basis of an open position.
#[derive(Debug, Clone)]
struct OpenLot {
    side: Side,
    entry_price: Price,
    amount: Quantity,
    entry_fee: Decimal,
    opened_at: DateTime<Utc>,
}

// =============================================================================
// Summary
// =============================================================================

/// Aggregate performance snapshot.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PnlSummary {
    /// Sum of realized pnl over all closed trades
    pub realized_pnl: Decimal,
    /// Sum of all entry and exit fees paid
    pub total_fees: Decimal,
    /// Number of closed trades
    pub total_trades: u32,
    /// Closed trades with strictly positive realized pnl
    pub winning_trades: u32,
    /// Closed trades with strictly negative realized pnl
    pub losing_trades: u32,
    /// `winning / total * 100`, zero when no trades
    pub win_rate: Decimal,
    /// Mean realized pnl of winning trades, zero when none
    pub average_win: Decimal,
    /// Mean realized pnl of losing trades (negative), zero when none
    pub average_loss: Decimal,
    /// `sum(wins) / |sum(losses)|`; `None` when there are no losing trades
    pub profit_factor: Option<Decimal>,
}

// =============================================================================
// Tracker
// =============================================================================

/// Tracks cost basis and realized/unrealized performance.
#[derive(Debug, Default)]
pub struct PnlTracker {
    open: HashMap<String, OpenLot>,
    trades: Vec<Trade>,
    total_fees: Decimal,
    realized_pnl: Decimal,
    gross_wins: Decimal,
    gross_losses: Decimal,
    total_trades: u32,
    winning_trades: u32,
    losing_trades: u32,
}

impl PnlTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the cost basis of a newly opened position.
    ///
    /// # Errors
    /// Returns `PnlError::AlreadyOpen` if a position for this symbol is
    /// already tracked.
    pub fn open_position(
        &mut self,
        symbol: &Symbol,
        side: Side,
        entry_price: Price,
        amount: Quantity,
        entry_fee: Decimal,
    ) -> Result<(), PnlError> {
        let key = symbol.as_pair();
        if self.open.contains_key(&key) {
            return Err(PnlError::AlreadyOpen(key));
        }

        self.total_fees += entry_fee;
        self.open.insert(
            key,
            OpenLot {
                side,
                entry_price,
                amount,
                entry_fee,
                opened_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Close the open position for `symbol` and record the trade.
    ///
    /// Classifies the trade as winning only if realized pnl is strictly
    /// positive and losing only if strictly negative.
    ///
    /// # Errors
    /// Returns `PnlError::NotOpen` if no position is tracked for the symbol.
    pub fn close_position(
        &mut self,
        symbol: &Symbol,
        exit_price: Price,
        exit_fee: Decimal,
    ) -> Result<Trade, PnlError> {
        let key = symbol.as_pair();
        let lot = self.open.remove(&key).ok_or(PnlError::NotOpen(key))?;

        let trade = Trade::new(
            symbol.clone(),
            lot.side,
            lot.entry_price,
            exit_price,
            lot.amount,
            lot.entry_fee,
            exit_fee,
            lot.opened_at,
            Utc::now(),
        );

        self.total_fees += exit_fee;
        self.realized_pnl += trade.pnl;
        self.total_trades += 1;
        if trade.pnl > Decimal::ZERO {
            self.winning_trades += 1;
            self.gross_wins += trade.pnl;
        } else if trade.pnl < Decimal::ZERO {
            self.losing_trades += 1;
            self.gross_losses += trade.pnl;
        }
        // Exactly zero: counts as a trade, neither win nor loss.

        debug!(
            symbol = %trade.symbol,
            side = %trade.side,
            pnl = %trade.pnl,
            "Trade closed"
        );

        self.trades.push(trade.clone());
        Ok(trade)
    }

    /// Unrealized pnl of the open position for `symbol` at `current_price`.
    ///
    /// Subtracts the entry fee only; the exit fee is unknown until close.
    /// Returns `None` when no position is open for the symbol.
    pub fn unrealized_pnl(&self, symbol: &Symbol, current_price: Price) -> Option<Decimal> {
        let lot = self.open.get(&symbol.as_pair())?;
        let gross = match lot.side {
            Side::Long => {
                (current_price.as_decimal() - lot.entry_price.as_decimal()) * lot.amount.as_decimal()
            }
            Side::Short => {
                (lot.entry_price.as_decimal() - current_price.as_decimal()) * lot.amount.as_decimal()
            }
        };
        Some(gross - lot.entry_fee)
    }

    /// Total unrealized pnl over all open positions, given current prices.
    ///
    /// Symbols without a price are skipped.
    pub fn total_unrealized_pnl(&self, prices: &HashMap<String, Price>) -> Decimal {
        self.open
            .keys()
            .filter_map(|pair| {
                let price = prices.get(pair)?;
                let symbol = Symbol::from_pair(pair).ok()?;
                self.unrealized_pnl(&symbol, *price)
            })
            .sum()
    }

    /// Whether a position is open for `symbol`.
    pub fn is_open(&self, symbol: &Symbol) -> bool {
        self.open.contains_key(&symbol.as_pair())
    }

    /// Number of open positions.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// All closed trades, in close order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Total realized pnl.
    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Aggregate performance snapshot.
    pub fn summary(&self) -> PnlSummary {
        let win_rate = if self.total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_trades) / Decimal::from(self.total_trades)
                * Decimal::from(100)
        };

        let average_win = if self.winning_trades == 0 {
            Decimal::ZERO
        } else {
            self.gross_wins / Decimal::from(self.winning_trades)
        };

        let average_loss = if self.losing_trades == 0 {
            Decimal::ZERO
        } else {
            self.gross_losses / Decimal::from(self.losing_trades)
        };

        // No losses: the ratio is undefined (infinite); represented as None.
        let profit_factor = if self.gross_losses.is_zero() {
            None
        } else {
            Some(self.gross_wins / self.gross_losses.abs())
        };

        PnlSummary {
            realized_pnl: self.realized_pnl,
            total_fees: self.total_fees,
            total_trades: self.total_trades,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
            win_rate,
            average_win,
            average_loss,
            profit_factor,
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

    fn btc() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    fn eth() -> Symbol {
        Symbol::from_pair("ETHUSDT").unwrap()
    }

    #[test]
    fn test_open_close_long_realized_pnl() {
        let mut tracker = PnlTracker::new();
        tracker
            .open_position(
                &btc(),
                Side::Long,
                Price::new(dec!(50000)).unwrap(),
                Quantity::new(dec!(0.1)).unwrap(),
                dec!(5),
            )
            .unwrap();

        let trade = tracker
            .close_position(&btc(), Price::new(dec!(52000)).unwrap(), dec!(5.2))
            .unwrap();

        // (52000 - 50000) * 0.1 - 5 - 5.2 = 189.8
        assert_eq!(trade.pnl, dec!(189.8));
        assert_eq!(tracker.realized_pnl(), dec!(189.8));
        assert_eq!(tracker.summary().total_fees, dec!(10.2));
        assert!(!tracker.is_open(&btc()));
    }

    #[test]
    fn test_duplicate_open_rejected() {
        let mut tracker = PnlTracker::new();
        tracker
            .open_position(
                &btc(),
                Side::Long,
                Price::new(dec!(50000)).unwrap(),
                Quantity::new(dec!(0.1)).unwrap(),
                dec!(5),
            )
            .unwrap();

        let result = tracker.open_position(
            &btc(),
            Side::Short,
            Price::new(dec!(50000)).unwrap(),
            Quantity::new(dec!(0.1)).unwrap(),
            dec!(5),
        );
        assert_eq!(result, Err(PnlError::AlreadyOpen("BTCUSDT".to_string())));
    }

    #[test]
    fn test_close_without_open_rejected() {
        let mut tracker = PnlTracker::new();
        let result = tracker.close_position(&btc(), Price::new(dec!(50000)).unwrap(), dec!(1));
        assert_eq!(result, Err(PnlError::NotOpen("BTCUSDT".to_string())));
    }

    #[test]
    fn test_unrealized_pnl_subtracts_entry_fee_only() {
        let mut tracker = PnlTracker::new();
        tracker
            .open_position(
                &btc(),
                Side::Long,
                Price::new(dec!(50000)).unwrap(),
                Quantity::new(dec!(0.1)).unwrap(),
                dec!(5),
            )
            .unwrap();

        // (51000 - 50000) * 0.1 - 5 = 95
        let pnl = tracker
            .unrealized_pnl(&btc(), Price::new(dec!(51000)).unwrap())
            .unwrap();
        assert_eq!(pnl, dec!(95));

        // Unknown symbol
        assert!(tracker
            .unrealized_pnl(&eth(), Price::new(dec!(3000)).unwrap())
            .is_none());
    }

    #[test]
    fn test_unrealized_pnl_short() {
        let mut tracker = PnlTracker::new();
        tracker
            .open_position(
                &eth(),
                Side::Short,
                Price::new(dec!(3000)).unwrap(),
                Quantity::new(dec!(2)).unwrap(),
                dec!(3),
            )
            .unwrap();

        // (3000 - 2900) * 2 - 3 = 197
        let pnl = tracker
            .unrealized_pnl(&eth(), Price::new(dec!(2900)).unwrap())
            .unwrap();
        assert_eq!(pnl, dec!(197));
    }

    #[test]
    fn test_win_rate_zero_without_trades() {
        let tracker = PnlTracker::new();
        let summary = tracker.summary();
        assert_eq!(summary.win_rate, Decimal::ZERO);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.profit_factor, None);
    }

    #[test]
    fn test_breakeven_is_not_a_win() {
        let mut tracker = PnlTracker::new();
        // Entry 100, exit 100.1, amount 1, fees 0.05 + 0.05 => pnl exactly 0
        tracker
            .open_position(
                &btc(),
                Side::Long,
                Price::new(dec!(100)).unwrap(),
                Quantity::new(dec!(1)).unwrap(),
                dec!(0.05),
            )
            .unwrap();
        let trade = tracker
            .close_position(&btc(), Price::new(dec!(100.1)).unwrap(), dec!(0.05))
            .unwrap();
        assert_eq!(trade.pnl, Decimal::ZERO);

        let summary = tracker.summary();
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.winning_trades, 0);
        assert_eq!(summary.losing_trades, 0);
        assert_eq!(summary.win_rate, Decimal::ZERO);
    }

    #[test]
    fn test_summary_aggregates() {
        let mut tracker = PnlTracker::new();

        // Win: +189.8
        tracker
            .open_position(
                &btc(),
                Side::Long,
                Price::new(dec!(50000)).unwrap(),
                Quantity::new(dec!(0.1)).unwrap(),
                dec!(5),
            )
            .unwrap();
        tracker
            .close_position(&btc(), Price::new(dec!(52000)).unwrap(), dec!(5.2))
            .unwrap();

        // Loss: (2900 - 3000) * 1 - 3 - 2.9 = -105.9
        tracker
            .open_position(
                &eth(),
                Side::Long,
                Price::new(dec!(3000)).unwrap(),
                Quantity::new(dec!(1)).unwrap(),
                dec!(3),
            )
            .unwrap();
        tracker
            .close_position(&eth(), Price::new(dec!(2900)).unwrap(), dec!(2.9))
            .unwrap();

        let summary = tracker.summary();
        assert_eq!(summary.total_trades, 2);
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.losing_trades, 1);
        assert_eq!(summary.win_rate, dec!(50));
        assert_eq!(summary.average_win, dec!(189.8));
        assert_eq!(summary.average_loss, dec!(-105.9));
        assert_eq!(summary.profit_factor, Some(dec!(189.8) / dec!(105.9)));
        assert_eq!(summary.realized_pnl, dec!(83.9));
    }

    #[test]
    fn test_profit_factor_none_without_losses() {
        let mut tracker = PnlTracker::new();
        tracker
            .open_position(
                &btc(),
                Side::Long,
                Price::new(dec!(50000)).unwrap(),
                Quantity::new(dec!(0.1)).unwrap(),
                dec!(5),
            )
            .unwrap();
        tracker
            .close_position(&btc(), Price::new(dec!(52000)).unwrap(), dec!(5.2))
            .unwrap();

        let summary = tracker.summary();
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.profit_factor, None);
    }

    #[test]
    fn test_total_unrealized_pnl() {
        let mut tracker = PnlTracker::new();
        tracker
            .open_position(
                &btc(),
                Side::Long,
                Price::new(dec!(50000)).unwrap(),
                Quantity::new(dec!(0.1)).unwrap(),
                dec!(5),
            )
            .unwrap();
        tracker
            .open_position(
                &eth(),
                Side::Short,
                Price::new(dec!(3000)).unwrap(),
                Quantity::new(dec!(1)).unwrap(),
                dec!(3),
            )
            .unwrap();

        let mut prices = HashMap::new();
        prices.insert("BTCUSDT".to_string(), Price::new(dec!(51000)).unwrap());
        prices.insert("ETHUSDT".to_string(), Price::new(dec!(2950)).unwrap());

        // BTC: 95, ETH: (3000-2950)*1 - 3 = 47
        assert_eq!(tracker.total_unrealized_pnl(&prices), dec!(142));
    }
}
