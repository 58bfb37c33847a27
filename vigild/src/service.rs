//! Risk service: the single entry point for position lifecycle.
//!
//! Wires the safety gate, the portfolio allocator, the pnl tracker, and the
//! position monitor into one flow. An open request passes through the gates
//! in order (trading mode, capital, risk, correlation); a close settles in
//! reverse (book the trade, release capital, re-check drawdown).

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use vigil_domain::{EmergencyTrigger, Metadata, Position, Price, Quantity, Side, Symbol, Trade};
use vigil_pnl::{PnlSummary, PnlTracker};
use vigil_portfolio::{PortfolioManager, PortfolioState};
use vigil_safety::SafetyProtocol;
use vigil_store::TradeRepository;

use crate::config::ExitConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{CoreEvent, EventBus};
use crate::position_monitor::PositionMonitor;

// =============================================================================
// Open request
// =============================================================================

/// A validated request from an external signal source to open a position.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Trading pair
    pub symbol: Symbol,
    /// Position direction
    pub side: Side,
    /// Fill price at entry
    pub entry_price: Price,
    /// Position size in base currency
    pub amount: Quantity,
    /// Fee paid at entry, in quote currency
    pub entry_fee: Decimal,
}

// =============================================================================
// Risk service
// =============================================================================

/// Orchestrates the risk core components.
pub struct RiskService {
    portfolio: Arc<PortfolioManager>,
    pnl: Mutex<PnlTracker>,
    safety: Arc<SafetyProtocol>,
    monitor: Arc<PositionMonitor>,
    event_bus: Arc<EventBus>,
    trades: Arc<dyn TradeRepository>,
    exits: ExitConfig,
    total_capital: Decimal,
    peak_equity: Mutex<Decimal>,
}

impl RiskService {
    /// Wire a risk service from its components.
    pub fn new(
        portfolio: Arc<PortfolioManager>,
        safety: Arc<SafetyProtocol>,
        monitor: Arc<PositionMonitor>,
        event_bus: Arc<EventBus>,
        trades: Arc<dyn TradeRepository>,
        exits: ExitConfig,
        total_capital: Decimal,
    ) -> Self {
        Self {
            portfolio,
            pnl: Mutex::new(PnlTracker::new()),
            safety,
            monitor,
            event_bus,
            trades,
            exits,
            total_capital,
            peak_equity: Mutex::new(total_capital),
        }
    }

    /// The safety protocol, for watchdogs and operator commands.
    pub fn safety(&self) -> &Arc<SafetyProtocol> {
        &self.safety
    }

    /// The position monitor.
    pub fn monitor(&self) -> &Arc<PositionMonitor> {
        &self.monitor
    }

    /// Open a position after passing every risk gate.
    ///
    /// Gate order: trading mode, then the portfolio checks (capital, active
    /// symbols, aggregate risk, correlation), then pnl bookkeeping. A failure
    /// after allocation rolls the allocation back.
    pub async fn open_position(&self, request: OpenRequest) -> DaemonResult<()> {
        if !self.safety.is_new_positions_allowed().await {
            let mode = self.safety.current_mode().await;
            warn!(symbol = %request.symbol, %mode, "Open rejected: trading halted");
            return Err(DaemonError::TradingHalted(mode));
        }

        let position = self.build_position(&request)?;
        let value = position.value();

        self.portfolio.allocate_position(&request.symbol, value)?;

        {
            let mut pnl = self.pnl.lock().await;
            if let Err(e) = pnl.open_position(
                &request.symbol,
                request.side,
                request.entry_price,
                request.amount,
                request.entry_fee,
            ) {
                // Undo the allocation; nothing was opened
                self.portfolio.release_position(&request.symbol, value, Decimal::ZERO);
                return Err(e.into());
            }
        }

        let opened_at = position.opened_at;
        info!(
            symbol = %request.symbol,
            side = %request.side,
            entry_price = %request.entry_price,
            amount = %request.amount,
            stop_loss = %position.stop_loss,
            take_profit = %position.take_profit,
            "Position opened"
        );

        self.monitor.add_position(position).await;
        self.event_bus.send(CoreEvent::PositionOpened {
            symbol: request.symbol,
            side: request.side,
            entry_price: request.entry_price,
            amount: request.amount,
            opened_at,
        });

        Ok(())
    }

    /// Settle a close reported by the monitor.
    ///
    /// Books the trade, persists it, returns capital to the portfolio, and
    /// re-checks the drawdown watchdog. A persistence failure is logged and
    /// does not block settlement.
    pub async fn settle_close(
        &self,
        symbol: &Symbol,
        exit_price: Price,
        exit_fee: Decimal,
    ) -> DaemonResult<Trade> {
        let trade = {
            let mut pnl = self.pnl.lock().await;
            pnl.close_position(symbol, exit_price, exit_fee)?
        };

        if let Err(e) = self.trades.append(&trade).await {
            warn!(symbol = %symbol, error = %e, "Failed to persist trade");
        }

        let value = trade.entry_price.as_decimal() * trade.amount.as_decimal();
        self.portfolio.release_position(symbol, value, trade.pnl);

        info!(
            symbol = %symbol,
            pnl = %trade.pnl,
            pnl_pct = %trade.pnl_pct,
            "Trade settled"
        );

        self.check_drawdown().await;
        Ok(trade)
    }

    /// Feed fresh prices into the correlation history.
    pub fn record_prices(&self, prices: &std::collections::HashMap<String, Price>) {
        self.portfolio.update_prices(prices);
    }

    /// Aggregate pnl snapshot.
    pub async fn pnl_summary(&self) -> PnlSummary {
        self.pnl.lock().await.summary()
    }

    /// Portfolio snapshot.
    pub fn portfolio_snapshot(&self) -> PortfolioState {
        self.portfolio.snapshot()
    }

    // =========================================================================
    // Operator commands
    // =========================================================================

    /// Manually pause trading.
    pub async fn pause_trading(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let before = self.safety.current_mode().await;
        let ok = self
            .safety
            .pause_trading(reason.clone(), EmergencyTrigger::Manual, Metadata::new())
            .await;
        self.emit_mode_change(before, EmergencyTrigger::Manual, reason).await;
        ok
    }

    /// Manually enter safe mode.
    pub async fn enable_safe_mode(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let before = self.safety.current_mode().await;
        let ok = self
            .safety
            .enable_safe_mode(reason.clone(), EmergencyTrigger::Manual, Metadata::new())
            .await;
        self.emit_mode_change(before, EmergencyTrigger::Manual, reason).await;
        ok
    }

    /// Manually trigger the emergency stop.
    pub async fn emergency_stop(&self, reason: impl Into<String>, confirmed: bool) -> bool {
        let reason = reason.into();
        let before = self.safety.current_mode().await;
        let ok = self
            .safety
            .emergency_stop(reason.clone(), EmergencyTrigger::Manual, Metadata::new(), confirmed)
            .await;
        self.emit_mode_change(before, EmergencyTrigger::Manual, reason).await;
        ok
    }

    /// Resume normal trading.
    pub async fn resume_trading(&self, confirmed: bool) -> bool {
        let before = self.safety.current_mode().await;
        let ok = self.safety.resume_trading(confirmed).await;
        self.emit_mode_change(before, EmergencyTrigger::Manual, "Trading resumed".to_string())
            .await;
        ok
    }

    async fn emit_mode_change(
        &self,
        before: vigil_domain::TradingMode,
        trigger: EmergencyTrigger,
        reason: String,
    ) {
        let after = self.safety.current_mode().await;
        if before != after {
            self.event_bus.send(CoreEvent::ModeChanged {
                mode_before: before,
                mode_after: after,
                trigger,
                reason,
            });
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn build_position(&self, request: &OpenRequest) -> DaemonResult<Position> {
        let hundred = Decimal::from(100);
        let entry = request.entry_price.as_decimal();
        let (stop, target) = match request.side {
            Side::Long => (
                entry * (Decimal::ONE - self.exits.stop_loss_pct / hundred),
                entry * (Decimal::ONE + self.exits.take_profit_pct / hundred),
            ),
            Side::Short => (
                entry * (Decimal::ONE + self.exits.stop_loss_pct / hundred),
                entry * (Decimal::ONE - self.exits.take_profit_pct / hundred),
            ),
        };

        let position = Position::new(
            request.symbol.clone(),
            request.side,
            request.entry_price,
            request.amount,
            Price::new(stop)?,
            Price::new(target)?,
            self.exits.trailing_stop_pct,
        )?;
        Ok(position)
    }

    /// Recompute drawdown against the peak equity and feed the loss watchdog.
    async fn check_drawdown(&self) {
        let realized = self.pnl.lock().await.realized_pnl();
        let equity = self.total_capital + realized;

        let mut peak = self.peak_equity.lock().await;
        if equity > *peak {
            *peak = equity;
        }

        let drawdown_pct = if peak.is_zero() {
            Decimal::ZERO
        } else {
            (*peak - equity) / *peak * Decimal::from(100)
        };
        drop(peak);

        self.safety.check_excessive_losses(drawdown_pct).await;
    }
}

// =============================================================================
// Tests
// =============================================================================
