//! Emergency safety protocol state machine.
//!
//! States: NORMAL, PAUSED, SAFE_MODE, EMERGENCY_STOP. Multiple watchdogs may
//! call the trigger methods concurrently; one tokio mutex guards the mode,
//! the disconnect timestamp, and the in-memory history so each transition is
//! a single atomic read-modify-write and exactly one event is appended per
//! actual transition.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use vigil_domain::{EmergencyEvent, EmergencyTrigger, Metadata, TradingMode};
use vigil_store::EmergencyEventRepository;

use crate::clock::Clock;

// =============================================================================
// Configuration
// =============================================================================

/// Safety protocol tuning.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Whether the automatic detectors may fire transitions
    pub auto_trigger_enabled: bool,
    /// Whether manual emergency stop and emergency resume need confirmation
    pub require_confirmation: bool,
    /// Seconds of continuous disconnect before the emergency stop fires
    pub network_timeout_secs: i64,
    /// Drawdown percent at which the excessive-loss stop fires
    pub excessive_loss_threshold_pct: Decimal,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            auto_trigger_enabled: true,
            require_confirmation: true,
            network_timeout_secs: 300,
            excessive_loss_threshold_pct: Decimal::new(70, 1), // 7.0
        }
    }
}

// =============================================================================
// Protocol
// =============================================================================

struct State {
    mode: TradingMode,
    disconnected_since: Option<chrono::DateTime<chrono::Utc>>,
    history: Vec<EmergencyEvent>,
}

/// Owns the global trading mode and its audited transitions.
pub struct SafetyProtocol {
    state: Mutex<State>,
    repo: Arc<dyn EmergencyEventRepository>,
    clock: Arc<dyn Clock>,
    config: SafetyConfig,
}

impl SafetyProtocol {
    /// Create a protocol in NORMAL mode.
    pub fn new(
        repo: Arc<dyn EmergencyEventRepository>,
        clock: Arc<dyn Clock>,
        config: SafetyConfig,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                mode: TradingMode::Normal,
                disconnected_since: None,
                history: Vec::new(),
            }),
            repo,
            clock,
            config,
        }
    }

    /// The current trading mode.
    pub async fn current_mode(&self) -> TradingMode {
        self.state.lock().await.mode
    }

    /// True only in NORMAL mode.
    pub async fn is_trading_allowed(&self) -> bool {
        self.state.lock().await.mode == TradingMode::Normal
    }

    /// True only in NORMAL mode.
    pub async fn is_new_positions_allowed(&self) -> bool {
        self.state.lock().await.mode == TradingMode::Normal
    }

    /// Reload the in-memory history from the repository.
    ///
    /// Called once at startup so history survives restarts; the mode itself
    /// always starts at NORMAL.
    pub async fn load_history(&self) -> Result<(), vigil_store::StoreError> {
        let events = self.repo.list().await?;
        let mut state = self.state.lock().await;
        info!(count = events.len(), "Loaded emergency event history");
        state.history = events;
        Ok(())
    }

    /// The in-memory audit trail, oldest first.
    pub async fn history(&self) -> Vec<EmergencyEvent> {
        self.state.lock().await.history.clone()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Transition to EMERGENCY_STOP from any state.
    ///
    /// With `require_confirmation` set, a MANUAL trigger is a no-op returning
    /// false unless `confirmed` is true. Automatic triggers always bypass
    /// confirmation. Returns true if the mode is EMERGENCY_STOP afterwards.
    pub async fn emergency_stop(
        &self,
        reason: impl Into<String>,
        trigger: EmergencyTrigger,
        metadata: Metadata,
        confirmed: bool,
    ) -> bool {
        if self.config.require_confirmation && trigger == EmergencyTrigger::Manual && !confirmed {
            warn!("Manual emergency stop requires confirmation, refusing");
            return false;
        }

        let mut state = self.state.lock().await;
        if state.mode == TradingMode::EmergencyStop {
            return true;
        }

        self.transition(&mut state, TradingMode::EmergencyStop, trigger, reason.into(), metadata)
            .await;
        true
    }

    /// Transition NORMAL or SAFE_MODE to PAUSED.
    ///
    /// Fails from EMERGENCY_STOP; an emergency must be resolved via
    /// `resume_trading` first.
    pub async fn pause_trading(
        &self,
        reason: impl Into<String>,
        trigger: EmergencyTrigger,
        metadata: Metadata,
    ) -> bool {
        let mut state = self.state.lock().await;
        match state.mode {
            TradingMode::EmergencyStop => {
                warn!("Cannot pause from EMERGENCY_STOP");
                false
            }
            TradingMode::Paused => true,
            TradingMode::Normal | TradingMode::SafeMode => {
                self.transition(&mut state, TradingMode::Paused, trigger, reason.into(), metadata)
                    .await;
                true
            }
        }
    }

    /// Transition any state to SAFE_MODE unconditionally.
    pub async fn enable_safe_mode(
        &self,
        reason: impl Into<String>,
        trigger: EmergencyTrigger,
        metadata: Metadata,
    ) -> bool {
        let mut state = self.state.lock().await;
        if state.mode == TradingMode::SafeMode {
            return true;
        }
        self.transition(&mut state, TradingMode::SafeMode, trigger, reason.into(), metadata)
            .await;
        true
    }

    /// Transition back to NORMAL.
    ///
    /// With `require_confirmation` set, leaving EMERGENCY_STOP needs
    /// `confirmed`; leaving PAUSED or SAFE_MODE is unconditional.
    pub async fn resume_trading(&self, confirmed: bool) -> bool {
        let mut state = self.state.lock().await;
        match state.mode {
            TradingMode::Normal => true,
            TradingMode::EmergencyStop if self.config.require_confirmation && !confirmed => {
                warn!("Resuming from EMERGENCY_STOP requires confirmation, refusing");
                false
            }
            _ => {
                self.transition(
                    &mut state,
                    TradingMode::Normal,
                    EmergencyTrigger::Manual,
                    "Trading resumed".to_string(),
                    Metadata::new(),
                )
                .await;
                true
            }
        }
    }

    /// Record the transition, append it to the audit trail, and log it.
    ///
    /// A repository write failure is logged but does not veto the
    /// transition; the in-memory history still records it.
    async fn transition(
        &self,
        state: &mut State,
        mode_after: TradingMode,
        trigger: EmergencyTrigger,
        reason: String,
        metadata: Metadata,
    ) {
        let event = EmergencyEvent::new(
            self.clock.now(),
            trigger,
            state.mode,
            mode_after,
            reason,
            metadata,
        );

        warn!(
            mode_before = %event.mode_before,
            mode_after = %event.mode_after,
            trigger = %event.trigger,
            reason = %event.reason,
            "Trading mode transition"
        );

        if let Err(e) = self.repo.append(&event).await {
            error!(error = %e, "Failed to persist emergency event");
        }

        state.mode = mode_after;
        state.history.push(event);
    }

    // =========================================================================
    // Auto-trigger detectors
    // =========================================================================

    /// Track connectivity; fire an emergency stop after a sustained outage.
    ///
    /// The first `false` records the disconnect start; later `false` calls
    /// fire once the elapsed time reaches the configured threshold. `true`
    /// clears the record. No duplicate events while still disconnected
    /// because the mode is already EMERGENCY_STOP afterwards.
    pub async fn check_network_disconnect(&self, is_connected: bool) {
        if !self.config.auto_trigger_enabled {
            return;
        }

        let mut state = self.state.lock().await;
        if is_connected {
            state.disconnected_since = None;
            return;
        }

        let now = self.clock.now();
        match state.disconnected_since {
            None => {
                state.disconnected_since = Some(now);
                info!("Network disconnect observed, tracking outage start");
            }
            Some(since) => {
                let elapsed = (now - since).num_seconds();
                if elapsed >= self.config.network_timeout_secs
                    && state.mode != TradingMode::EmergencyStop
                {
                    let mut metadata = Metadata::new();
                    metadata.insert("elapsed_secs".to_string(), json!(elapsed));
                    let reason = format!(
                        "Network disconnected for {}s (threshold {}s)",
                        elapsed, self.config.network_timeout_secs
                    );
                    self.transition(
                        &mut state,
                        TradingMode::EmergencyStop,
                        EmergencyTrigger::NetworkDisconnect,
                        reason,
                        metadata,
                    )
                    .await;
                }
            }
        }
    }

    /// Pause trading when the exchange rate limit is exceeded.
    ///
    /// Only fires from NORMAL; re-checks while already paused are no-ops.
    pub async fn check_api_rate_limit(&self, exceeded: bool) {
        if !self.config.auto_trigger_enabled || !exceeded {
            return;
        }

        let mut state = self.state.lock().await;
        if state.mode == TradingMode::Normal {
            self.transition(
                &mut state,
                TradingMode::Paused,
                EmergencyTrigger::ApiRateLimit,
                "Exchange API rate limit exceeded".to_string(),
                Metadata::new(),
            )
            .await;
        }
    }

    /// Emergency stop on persistence corruption.
    pub async fn check_database_integrity(&self, is_corrupted: bool) {
        if !self.config.auto_trigger_enabled || !is_corrupted {
            return;
        }

        let mut state = self.state.lock().await;
        if state.mode != TradingMode::EmergencyStop {
            self.transition(
                &mut state,
                TradingMode::EmergencyStop,
                EmergencyTrigger::DatabaseError,
                "Persistence integrity check failed".to_string(),
                Metadata::new(),
            )
            .await;
        }
    }

    /// Emergency stop when drawdown reaches the configured threshold.
    pub async fn check_excessive_losses(&self, drawdown_pct: Decimal) {
        if !self.config.auto_trigger_enabled
            || drawdown_pct < self.config.excessive_loss_threshold_pct
        {
            return;
        }

        let mut state = self.state.lock().await;
        if state.mode != TradingMode::EmergencyStop {
            let mut metadata = Metadata::new();
            metadata.insert("drawdown_pct".to_string(), json!(drawdown_pct.to_string()));
            let reason = format!(
                "Drawdown {}% reached threshold {}%",
                drawdown_pct, self.config.excessive_loss_threshold_pct
            );
            self.transition(
                &mut state,
                TradingMode::EmergencyStop,
                EmergencyTrigger::ExcessiveLosses,
                reason,
                metadata,
            )
            .await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
