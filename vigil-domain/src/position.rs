//! Open positions and the exit state machine.
//!
//! A `Position` is owned exclusively by the position monitor while open.
//! Each tick the monitor calls [`Position::evaluate`] with the current price,
//! which may ratchet the trailing stop (monotonic tightening only) and
//! decides whether the position must be closed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{DomainError, Price, Quantity, Side, Symbol};

// =============================================================================
// Trailing policy
// =============================================================================

/// Gates that keep the trailing stop from ratcheting on noise.
///
/// The trailing stop is recomputed only when BOTH gates pass:
/// - price moved beyond the favorable watermark by at least `min_move_pct`
/// - the position's unrealized pnl is at least `activation_pnl_pct`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingPolicy {
    /// Minimum favorable move beyond the watermark, in percent of the watermark
    pub min_move_pct: Decimal,
    /// Minimum unrealized pnl before trailing activates, in percent
    pub activation_pnl_pct: Decimal,
}

impl Default for TrailingPolicy {
    fn default() -> Self {
        Self {
            min_move_pct: Decimal::ONE,                // 1.0%
            activation_pnl_pct: Decimal::from(3),      // 3.0%
        }
    }
}

// =============================================================================
// Close reason
// =============================================================================

/// Why a position was closed by the exit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Price crossed the (possibly trailed) stop-loss
    StopLoss,
    /// Price reached the take-profit target
    TakeProfit,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "Stop-Loss"),
            CloseReason::TakeProfit => write!(f, "Take-Profit"),
        }
    }
}

// =============================================================================
// Position
// =============================================================================

/// An open market exposure with defined entry, size, and risk bounds.
///
/// # Invariants
/// - For LONG: `stop_loss` never decreases over the position's life
/// - For SHORT: `stop_loss` never increases over the position's life
/// - `highest_price` / `lowest_price` track the favorable extremes since entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Trading pair
    pub symbol: Symbol,
    /// Position direction
    pub side: Side,
    /// Fill price at entry
    pub entry_price: Price,
    /// Position size in base currency
    pub amount: Quantity,
    /// Current stop-loss level (ratchets favorably, never loosens)
    pub stop_loss: Price,
    /// Take-profit target
    pub take_profit: Price,
    /// Trailing distance, in percent of price
    pub trailing_stop_pct: Decimal,
    /// Highest price seen since entry (LONG watermark)
    pub highest_price: Price,
    /// Lowest price seen since entry (SHORT watermark)
    pub lowest_price: Price,
    /// When the position was opened
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Create a new position with validated stop placement.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStop` if:
    /// - `trailing_stop_pct` is outside `(0, 100)`
    /// - LONG and `stop_loss >= entry_price` or `take_profit <= entry_price`
    /// - SHORT and `stop_loss <= entry_price` or `take_profit >= entry_price`
    pub fn new(
        symbol: Symbol,
        side: Side,
        entry_price: Price,
        amount: Quantity,
        stop_loss: Price,
        take_profit: Price,
        trailing_stop_pct: Decimal,
    ) -> Result<Self, DomainError> {
        // A distance of 100% or more would trail the stop to zero or below
        if trailing_stop_pct <= Decimal::ZERO || trailing_stop_pct >= Decimal::from(100) {
            return Err(DomainError::InvalidStop(format!(
                "Trailing stop percent must be between 0 and 100, got {}",
                trailing_stop_pct
            )));
        }

        match side {
            Side::Long => {
                if stop_loss.as_decimal() >= entry_price.as_decimal() {
                    return Err(DomainError::InvalidStop(
                        "LONG position requires stop-loss below entry price".to_string(),
                    ));
                }
                if take_profit.as_decimal() <= entry_price.as_decimal() {
                    return Err(DomainError::InvalidStop(
                        "LONG position requires take-profit above entry price".to_string(),
                    ));
                }
            }
            Side::Short => {
                if stop_loss.as_decimal() <= entry_price.as_decimal() {
                    return Err(DomainError::InvalidStop(
                        "SHORT position requires stop-loss above entry price".to_string(),
                    ));
                }
                if take_profit.as_decimal() >= entry_price.as_decimal() {
                    return Err(DomainError::InvalidStop(
                        "SHORT position requires take-profit below entry price".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            symbol,
            side,
            entry_price,
            amount,
            stop_loss,
            take_profit,
            trailing_stop_pct,
            highest_price: entry_price,
            lowest_price: entry_price,
            opened_at: Utc::now(),
        })
    }

    /// Position value at entry, in quote currency.
    pub fn value(&self) -> Decimal {
        self.entry_price.as_decimal() * self.amount.as_decimal()
    }

    /// Unrealized pnl of this position at `price`, in percent of entry.
    pub fn pnl_pct(&self, price: Price) -> Decimal {
        let entry = self.entry_price.as_decimal();
        let diff = match self.side {
            Side::Long => price.as_decimal() - entry,
            Side::Short => entry - price.as_decimal(),
        };
        diff / entry * Decimal::from(100)
    }

    /// Evaluate the position against the current price.
    ///
    /// Updates the favorable watermark and ratchets the trailing stop when
    /// both policy gates pass, then decides whether the position should close.
    /// The stop only ever tightens: for LONG a new candidate is adopted only
    /// if it is above the current stop, for SHORT only if below.
    pub fn evaluate(&mut self, price: Price, policy: &TrailingPolicy) -> Option<CloseReason> {
        let hundred = Decimal::from(100);
        let p = price.as_decimal();

        match self.side {
            Side::Long => {
                let watermark = self.highest_price.as_decimal();
                if p > watermark {
                    let move_pct = (p - watermark) / watermark * hundred;
                    if move_pct >= policy.min_move_pct
                        && self.pnl_pct(price) >= policy.activation_pnl_pct
                    {
                        self.highest_price = price;
                        let candidate = p * (Decimal::ONE - self.trailing_stop_pct / hundred);
                        if candidate > self.stop_loss.as_decimal() {
                            self.stop_loss = Price::from(candidate);
                        }
                    }
                }

                if p <= self.stop_loss.as_decimal() {
                    Some(CloseReason::StopLoss)
                } else if p >= self.take_profit.as_decimal() {
                    Some(CloseReason::TakeProfit)
                } else {
                    None
                }
            }
            Side::Short => {
                let watermark = self.lowest_price.as_decimal();
                if p < watermark {
                    let move_pct = (watermark - p) / watermark * hundred;
                    if move_pct >= policy.min_move_pct
                        && self.pnl_pct(price) >= policy.activation_pnl_pct
                    {
                        self.lowest_price = price;
                        let candidate = p * (Decimal::ONE + self.trailing_stop_pct / hundred);
                        if candidate < self.stop_loss.as_decimal() {
                            self.stop_loss = Price::from(candidate);
                        }
                    }
                }

                if p >= self.stop_loss.as_decimal() {
                    Some(CloseReason::StopLoss)
                } else if p <= self.take_profit.as_decimal() {
                    Some(CloseReason::TakeProfit)
                } else {
                    None
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
