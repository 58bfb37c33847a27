//! Per-symbol capital allocation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Capital allocated to one configured symbol.
///
/// # Invariants
/// - `allocated_capital == current_exposure + available_capital` net of
///   realized pnl credited by releases
/// - `0 <= max_allocation_pct <= 1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolAllocation {
    /// Capital assigned to this symbol by the allocation targets
    pub allocated_capital: Decimal,
    /// Value currently committed to open positions
    pub current_exposure: Decimal,
    /// Capital free for new positions
    pub available_capital: Decimal,
    /// Target share of total capital, in [0, 1]
    pub max_allocation_pct: Decimal,
    /// Cumulative realized pnl credited to this symbol
    pub realized_pnl: Decimal,
}

impl SymbolAllocation {
    /// Create a fresh allocation with no exposure.
    pub fn new(allocated_capital: Decimal, max_allocation_pct: Decimal) -> Self {
        Self {
            allocated_capital,
            current_exposure: Decimal::ZERO,
            available_capital: allocated_capital,
            max_allocation_pct,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Whether this symbol currently has open exposure.
    pub fn is_active(&self) -> bool {
        self.current_exposure > Decimal::ZERO
    }
}
