//! Capital allocation and exposure gating.
//!
//! All state lives behind a single mutex so `allocate_position` is a
//! check-then-mutate in one critical section; a `can_open_position` check
//! cannot race a concurrent allocation.

use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use vigil_domain::{DomainError, Price, Symbol};

use crate::allocation::SymbolAllocation;
use crate::correlation::{CorrelationMatrix, PriceHistory, MIN_SAMPLES};

// =============================================================================
// Rejections
// =============================================================================

/// Why a position open request was rejected.
///
/// The `Display` output is the human-readable reason surfaced to logs and
/// notifications; rejections are expected control flow, never panics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpenRejection {
    /// Symbol is not a configured allocation
    #[error("Symbol {0} is not allocated in this portfolio")]
    UnknownSymbol(String),

    /// Requested value exceeds the symbol's available capital
    #[error("Insufficient capital for {symbol}: requested {requested}, available {available}")]
    InsufficientCapital {
        /// Symbol being opened
        symbol: String,
        /// Requested position value
        requested: Decimal,
        /// Capital available for the symbol
        available: Decimal,
    },

    /// Opening a new symbol would exceed the active-symbol limit
    #[error("Maximum active symbols reached ({0})")]
    MaxSymbolsReached(usize),

    /// Aggregate exposure would exceed the portfolio risk limit
    #[error("Portfolio risk limit exceeded: resulting exposure {resulting} > limit {limit}")]
    PortfolioRiskExceeded {
        /// Exposure ratio after the proposed allocation
        resulting: Decimal,
        /// Configured `max_portfolio_risk_pct`
        limit: Decimal,
    },

    /// Correlation with an active symbol exceeds the threshold
    #[error("Correlation too high: {symbol} vs {other} = {correlation:.2} > {threshold}")]
    CorrelationTooHigh {
        /// Symbol being opened
        symbol: String,
        /// Active symbol it correlates with
        other: String,
        /// Measured absolute correlation
        correlation: f64,
        /// Configured threshold
        threshold: f64,
    },
}

// =============================================================================
// Configuration
// =============================================================================

/// Portfolio risk limits.
#[derive(Debug, Clone)]
pub struct PortfolioConfig {
    /// Maximum aggregate exposure as a fraction of total capital
    pub max_portfolio_risk_pct: Decimal,
    /// Maximum number of symbols with open exposure
    pub max_symbols_active: usize,
    /// Maximum absolute pairwise return correlation with active symbols
    pub correlation_threshold: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            max_portfolio_risk_pct: Decimal::new(12, 2), // 0.12
            max_symbols_active: 5,
            correlation_threshold: 0.7,
        }
    }
}

// =============================================================================
// Portfolio state
// =============================================================================

/// Aggregate portfolio snapshot.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    /// Total capital under management
    pub total_capital: Decimal,
    /// Capital not committed to open positions
    pub available_capital: Decimal,
    /// Value committed to open positions across all symbols
    pub total_exposure: Decimal,
    /// Cumulative realized pnl across all symbols
    pub total_pnl: Decimal,
    /// Per-symbol allocations, keyed by trading pair
    pub allocations: HashMap<String, SymbolAllocation>,
    /// Pairwise return correlations; `None` until enough history exists
    pub correlation: Option<CorrelationMatrix>,
}

struct Inner {
    state: PortfolioState,
    history: HashMap<String, PriceHistory>,
}

// =============================================================================
// Portfolio manager
// =============================================================================

/// Owns capital allocations and gates new exposure.
pub struct PortfolioManager {
    inner: Mutex<Inner>,
    config: PortfolioConfig,
}

impl PortfolioManager {
    /// Split `total_capital` equally across `symbols`.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAllocation` if `symbols` is empty or
    /// `total_capital` is not positive.
    pub fn new(
        total_capital: Decimal,
        symbols: &[Symbol],
        config: PortfolioConfig,
    ) -> Result<Self, DomainError> {
        if symbols.is_empty() {
            return Err(DomainError::InvalidAllocation(
                "Portfolio requires at least one symbol".to_string(),
            ));
        }
        if total_capital <= Decimal::ZERO {
            return Err(DomainError::InvalidAllocation(
                "Total capital must be positive".to_string(),
            ));
        }

        let count = Decimal::from(symbols.len());
        let per_symbol = total_capital / count;
        let pct = Decimal::ONE / count;

        let mut allocations = HashMap::new();
        let mut history = HashMap::new();
        for symbol in symbols {
            let pair = symbol.as_pair();
            allocations.insert(pair.clone(), SymbolAllocation::new(per_symbol, pct));
            history.insert(pair, PriceHistory::new());
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                state: PortfolioState {
                    total_capital,
                    available_capital: total_capital,
                    total_exposure: Decimal::ZERO,
                    total_pnl: Decimal::ZERO,
                    allocations,
                    correlation: None,
                },
                history,
            }),
            config,
        })
    }

    /// Check whether a position of `value` can be opened for `symbol`.
    ///
    /// Checks run in order and the first failure is returned: allocation
    /// capital, active-symbol count, aggregate risk ratio, then correlation
    /// against every active symbol. When no correlation matrix exists yet
    /// (any symbol with fewer than `MIN_SAMPLES` samples) the correlation
    /// check is skipped entirely.
    pub fn can_open_position(&self, symbol: &Symbol, value: Decimal) -> Result<(), OpenRejection> {
        let inner = self.inner.lock().expect("portfolio lock poisoned");
        Self::check_open(&inner.state, &self.config, &symbol.as_pair(), value)
    }

    fn check_open(
        state: &PortfolioState,
        config: &PortfolioConfig,
        pair: &str,
        value: Decimal,
    ) -> Result<(), OpenRejection> {
        let alloc = state
            .allocations
            .get(pair)
            .ok_or_else(|| OpenRejection::UnknownSymbol(pair.to_string()))?;

        if value > alloc.available_capital {
            return Err(OpenRejection::InsufficientCapital {
                symbol: pair.to_string(),
                requested: value,
                available: alloc.available_capital,
            });
        }

        let active: Vec<&String> = state
            .allocations
            .iter()
            .filter(|(_, a)| a.is_active())
            .map(|(s, _)| s)
            .collect();

        if !alloc.is_active() && active.len() >= config.max_symbols_active {
            return Err(OpenRejection::MaxSymbolsReached(config.max_symbols_active));
        }

        let resulting = (state.total_exposure + value) / state.total_capital;
        if resulting > config.max_portfolio_risk_pct {
            return Err(OpenRejection::PortfolioRiskExceeded {
                resulting,
                limit: config.max_portfolio_risk_pct,
            });
        }

        if let Some(matrix) = &state.correlation {
            for other in active {
                if other.as_str() == pair {
                    continue;
                }
                if let Some(corr) = matrix.get(pair, other) {
                    if corr.abs() > config.correlation_threshold {
                        return Err(OpenRejection::CorrelationTooHigh {
                            symbol: pair.to_string(),
                            other: other.clone(),
                            correlation: corr,
                            threshold: config.correlation_threshold,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Commit `value` of capital to `symbol`.
    ///
    /// Re-validates every gate and mutates state under one lock, so a
    /// concurrent allocation cannot slip between check and commit.
    pub fn allocate_position(&self, symbol: &Symbol, value: Decimal) -> Result<(), OpenRejection> {
        let mut inner = self.inner.lock().expect("portfolio lock poisoned");
        let pair = symbol.as_pair();

        Self::check_open(&inner.state, &self.config, &pair, value)?;

        let state = &mut inner.state;
        let alloc = state
            .allocations
            .get_mut(&pair)
            .expect("allocation verified by check_open");
        alloc.current_exposure += value;
        alloc.available_capital -= value;
        state.total_exposure += value;
        state.available_capital -= value;

        debug!(symbol = %pair, %value, total_exposure = %state.total_exposure, "Capital allocated");
        Ok(())
    }

    /// Return `value + pnl` to the symbol's available capital.
    ///
    /// Exposure is floored at zero; releasing an unknown symbol is logged
    /// and ignored.
    pub fn release_position(&self, symbol: &Symbol, value: Decimal, pnl: Decimal) {
        let mut inner = self.inner.lock().expect("portfolio lock poisoned");
        let pair = symbol.as_pair();
        let state = &mut inner.state;

        let Some(alloc) = state.allocations.get_mut(&pair) else {
            warn!(symbol = %pair, "Release for unallocated symbol ignored");
            return;
        };

        let released = value.min(alloc.current_exposure);
        alloc.current_exposure -= released;
        alloc.available_capital += value + pnl;
        alloc.realized_pnl += pnl;

        state.total_exposure -= released;
        state.available_capital += value + pnl;
        state.total_pnl += pnl;

        info!(
            symbol = %pair,
            %value,
            %pnl,
            total_pnl = %state.total_pnl,
            "Capital released"
        );
    }

    /// Append price samples and refresh the correlation matrix.
    ///
    /// The matrix is recomputed only once every configured symbol has at
    /// least [`MIN_SAMPLES`] samples.
    pub fn update_prices(&self, prices: &HashMap<String, Price>) {
        let mut inner = self.inner.lock().expect("portfolio lock poisoned");

        for (pair, price) in prices {
            if let Some(history) = inner.history.get_mut(pair) {
                history.push(price.as_decimal());
            }
        }

        let ready = inner.history.values().all(|h| h.len() >= MIN_SAMPLES);
        if ready {
            let mut series: Vec<(String, Vec<f64>)> = inner
                .history
                .iter()
                .map(|(s, h)| (s.clone(), h.returns()))
                .collect();
            series.sort_by(|a, b| a.0.cmp(&b.0));
            inner.state.correlation = Some(CorrelationMatrix::compute(&series));
            debug!(symbols = series.len(), "Correlation matrix recomputed");
        }
    }

    /// Update allocation targets without touching live exposure.
    ///
    /// Symbols absent from `targets` are left unchanged. Available capital
    /// and exposure are deliberately not adjusted; a symbol over its new
    /// target is not force-closed.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAllocation` if any target is outside
    /// `[0, 1]`.
    pub fn rebalance(&self, targets: &HashMap<String, Decimal>) -> Result<(), DomainError> {
        for (pair, pct) in targets {
            if *pct < Decimal::ZERO || *pct > Decimal::ONE {
                return Err(DomainError::InvalidAllocation(format!(
                    "Target for {} must be within [0, 1], got {}",
                    pair, pct
                )));
            }
        }

        let mut inner = self.inner.lock().expect("portfolio lock poisoned");
        let total = inner.state.total_capital;
        for (pair, pct) in targets {
            if let Some(alloc) = inner.state.allocations.get_mut(pair) {
                alloc.max_allocation_pct = *pct;
                alloc.allocated_capital = total * pct;
            }
        }
        Ok(())
    }

    /// Clone of the current portfolio state.
    pub fn snapshot(&self) -> PortfolioState {
        self.inner.lock().expect("portfolio lock poisoned").state.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbols() -> Vec<Symbol> {
        vec![
            Symbol::from_pair("BTCUSDT").unwrap(),
            Symbol::from_pair("ETHUSDT").unwrap(),
            Symbol::from_pair("BNBUSDT").unwrap(),
        ]
    }

    fn btc() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    fn eth() -> Symbol {
        Symbol::from_pair("ETHUSDT").unwrap()
    }

    fn manager() -> PortfolioManager {
        PortfolioManager::new(dec!(100000), &symbols(), PortfolioConfig::default()).unwrap()
    }

    #[test]
    fn test_equal_split_on_construction() {
        let manager = manager();
        let state = manager.snapshot();

        assert_eq!(state.allocations.len(), 3);
        let alloc = &state.allocations["BTCUSDT"];
        // 100000 / 3
        assert!(alloc.allocated_capital > dec!(33333.33) && alloc.allocated_capital < dec!(33333.34));
        assert_eq!(alloc.available_capital, alloc.allocated_capital);
        assert!(alloc.max_allocation_pct > dec!(0.333) && alloc.max_allocation_pct < dec!(0.334));
    }

    #[test]
    fn test_construction_rejects_empty_symbols() {
        assert!(PortfolioManager::new(dec!(100000), &[], PortfolioConfig::default()).is_err());
        assert!(PortfolioManager::new(dec!(0), &symbols(), PortfolioConfig::default()).is_err());
    }

    #[test]
    fn test_allocate_within_symbol_capital() {
        let manager = manager();
        assert!(manager.allocate_position(&btc(), dec!(8000)).is_ok());

        let state = manager.snapshot();
        assert_eq!(state.total_exposure, dec!(8000));
        assert_eq!(state.allocations["BTCUSDT"].current_exposure, dec!(8000));
    }

    #[test]
    fn test_insufficient_capital_rejected() {
        // Scenario: $100k over three symbols, ETH allocation ~ $33,333.33
        let manager = manager();
        assert!(manager.allocate_position(&btc(), dec!(8000)).is_ok());

        let result = manager.can_open_position(&eth(), dec!(40000));
        match result {
            Err(OpenRejection::InsufficientCapital { ref symbol, requested, .. }) => {
                assert_eq!(symbol, "ETHUSDT");
                assert_eq!(requested, dec!(40000));
            }
            other => panic!("Expected InsufficientCapital, got {:?}", other),
        }
        // The reason string is human readable
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("Insufficient capital"));
    }

    #[test]
    fn test_unknown_symbol_rejected() {
        let manager = manager();
        let xrp = Symbol::from_pair("XRPUSDT").unwrap();
        assert!(matches!(
            manager.can_open_position(&xrp, dec!(100)),
            Err(OpenRejection::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_max_active_symbols_enforced() {
        let config = PortfolioConfig {
            max_symbols_active: 1,
            ..PortfolioConfig::default()
        };
        let manager = PortfolioManager::new(dec!(100000), &symbols(), config).unwrap();

        manager.allocate_position(&btc(), dec!(5000)).unwrap();

        // Second NEW symbol is rejected...
        assert!(matches!(
            manager.can_open_position(&eth(), dec!(1000)),
            Err(OpenRejection::MaxSymbolsReached(1))
        ));

        // ...but adding to an already-active symbol is not a new symbol.
        assert!(manager.can_open_position(&btc(), dec!(1000)).is_ok());
    }

    #[test]
    fn test_portfolio_risk_limit_enforced() {
        // 0.12 of 100k = 12k aggregate limit
        let manager = manager();
        manager.allocate_position(&btc(), dec!(8000)).unwrap();

        assert!(matches!(
            manager.can_open_position(&eth(), dec!(5000)),
            Err(OpenRejection::PortfolioRiskExceeded { .. })
        ));
        assert!(manager.can_open_position(&eth(), dec!(4000)).is_ok());
    }

    #[test]
    fn test_correlation_check_skipped_without_matrix() {
        // With no price history the matrix is None and correlated symbols
        // are not rejected (observed leniency).
        let manager = manager();
        manager.allocate_position(&btc(), dec!(5000)).unwrap();
        assert!(manager.can_open_position(&eth(), dec!(5000)).is_ok());
        assert!(manager.snapshot().correlation.is_none());
    }

    #[test]
    fn test_correlation_gate_with_matrix() {
        let manager = manager();
        manager.allocate_position(&btc(), dec!(5000)).unwrap();

        // Feed 31 samples: BTC and ETH move in lockstep, BNB alternates.
        for i in 0..31u32 {
            let mut prices = HashMap::new();
            let step = Decimal::from(i);
            prices.insert("BTCUSDT".to_string(), Price::new(dec!(50000) + step * dec!(500)).unwrap());
            prices.insert("ETHUSDT".to_string(), Price::new(dec!(3000) + step * dec!(30)).unwrap());
            let wobble = if i % 2 == 0 { dec!(10) } else { dec!(-10) };
            prices.insert("BNBUSDT".to_string(), Price::new(dec!(400) + wobble).unwrap());
            manager.update_prices(&prices);
        }

        let state = manager.snapshot();
        assert!(state.correlation.is_some());

        // ETH is near-perfectly correlated with active BTC
        let result = manager.can_open_position(&eth(), dec!(4000));
        assert!(matches!(result, Err(OpenRejection::CorrelationTooHigh { .. })));

        // BNB is not
        let bnb = Symbol::from_pair("BNBUSDT").unwrap();
        assert!(manager.can_open_position(&bnb, dec!(4000)).is_ok());
    }

    #[test]
    fn test_allocate_release_restores_capital_net_of_pnl() {
        let manager = manager();
        let before = manager.snapshot().allocations["BTCUSDT"].available_capital;

        manager.allocate_position(&btc(), dec!(8000)).unwrap();
        manager.release_position(&btc(), dec!(8000), dec!(189.8));

        let state = manager.snapshot();
        let alloc = &state.allocations["BTCUSDT"];
        assert_eq!(alloc.available_capital, before + dec!(189.8));
        assert_eq!(alloc.current_exposure, Decimal::ZERO);
        assert_eq!(state.total_exposure, Decimal::ZERO);
        assert_eq!(state.total_pnl, dec!(189.8));
        assert_eq!(alloc.realized_pnl, dec!(189.8));
    }

    #[test]
    fn test_release_floors_exposure_at_zero() {
        let manager = manager();
        manager.allocate_position(&btc(), dec!(1000)).unwrap();
        manager.release_position(&btc(), dec!(5000), dec!(0));

        let state = manager.snapshot();
        assert_eq!(state.allocations["BTCUSDT"].current_exposure, Decimal::ZERO);
        assert_eq!(state.total_exposure, Decimal::ZERO);
    }

    #[test]
    fn test_rebalance_updates_targets_only() {
        let manager = manager();
        manager.allocate_position(&btc(), dec!(8000)).unwrap();
        let exposure_before = manager.snapshot().allocations["BTCUSDT"].current_exposure;
        let available_before = manager.snapshot().allocations["BTCUSDT"].available_capital;

        let mut targets = HashMap::new();
        targets.insert("BTCUSDT".to_string(), dec!(0.5));
        manager.rebalance(&targets).unwrap();

        let state = manager.snapshot();
        let alloc = &state.allocations["BTCUSDT"];
        assert_eq!(alloc.max_allocation_pct, dec!(0.5));
        assert_eq!(alloc.allocated_capital, dec!(50000));
        assert_eq!(alloc.current_exposure, exposure_before);
        assert_eq!(alloc.available_capital, available_before);
    }

    #[test]
    fn test_rebalance_rejects_out_of_range_target() {
        let manager = manager();
        let mut targets = HashMap::new();
        targets.insert("BTCUSDT".to_string(), dec!(1.5));
        assert!(manager.rebalance(&targets).is_err());
    }
}
