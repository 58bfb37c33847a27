//! Trading modes and the emergency audit trail.
//!
//! `TradingMode` is the global gate consulted before any new exposure is
//! opened. Every mode transition produces an `EmergencyEvent`, an append-only
//! record that survives restarts through the persistence port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Structured metadata attached to an emergency event.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Trading mode
// =============================================================================

/// Global trading mode, owned by the safety protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    /// Trading and new positions allowed
    Normal,
    /// Trading paused, existing positions still monitored
    Paused,
    /// Conservative mode, no new exposure
    SafeMode,
    /// Most restrictive mode, all trading disallowed
    EmergencyStop,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Normal => write!(f, "NORMAL"),
            TradingMode::Paused => write!(f, "PAUSED"),
            TradingMode::SafeMode => write!(f, "SAFE_MODE"),
            TradingMode::EmergencyStop => write!(f, "EMERGENCY_STOP"),
        }
    }
}

// =============================================================================
// Emergency trigger
// =============================================================================

/// What caused a mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyTrigger {
    /// Operator-initiated transition
    Manual,
    /// Network connectivity lost beyond the configured threshold
    NetworkDisconnect,
    /// Exchange API rate limit exceeded
    ApiRateLimit,
    /// Persistence integrity check failed
    DatabaseError,
    /// Drawdown reached the configured threshold
    ExcessiveLosses,
}

impl fmt::Display for EmergencyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmergencyTrigger::Manual => write!(f, "MANUAL"),
            EmergencyTrigger::NetworkDisconnect => write!(f, "NETWORK_DISCONNECT"),
            EmergencyTrigger::ApiRateLimit => write!(f, "API_RATE_LIMIT"),
            EmergencyTrigger::DatabaseError => write!(f, "DATABASE_ERROR"),
            EmergencyTrigger::ExcessiveLosses => write!(f, "EXCESSIVE_LOSSES"),
        }
    }
}

// =============================================================================
// Emergency event
// =============================================================================

/// Append-only audit record of a successful mode transition.
///
/// Created on every transition, never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    /// Time-ordered event id
    pub id: Uuid,
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
    /// What caused the transition
    pub trigger: EmergencyTrigger,
    /// Mode before the transition
    pub mode_before: TradingMode,
    /// Mode after the transition
    pub mode_after: TradingMode,
    /// Human-readable reason, suitable for direct display
    pub reason: String,
    /// Structured context (elapsed seconds, drawdown, ...)
    pub metadata: Metadata,
}

impl EmergencyEvent {
    /// Create a new event stamped with the given time.
    pub fn new(
        timestamp: DateTime<Utc>,
        trigger: EmergencyTrigger,
        mode_before: TradingMode,
        mode_after: TradingMode,
        reason: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp,
            trigger,
            mode_before,
            mode_after,
            reason: reason.into(),
            metadata,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
