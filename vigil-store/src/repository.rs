//! Repository trait definitions (Ports)
//!
//! These traits define the audit-trail storage interface for the risk core.
//! Implementations can be in-memory or backed by a database.

use crate::error::StoreError;
use async_trait::async_trait;
use uuid::Uuid;
use vigil_domain::{EmergencyEvent, Trade};

/// Repository for closed trades (append-only)
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Append a closed trade to the history
    async fn append(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Load all trades (in close order)
    async fn list(&self) -> Result<Vec<Trade>, StoreError>;

    /// Load trades for a single trading pair
    async fn list_by_symbol(&self, pair: &str) -> Result<Vec<Trade>, StoreError>;
}

/// Repository for emergency mode transitions (append-only)
#[async_trait]
pub trait EmergencyEventRepository: Send + Sync {
    /// Append a mode transition to the audit trail
    async fn append(&self, event: &EmergencyEvent) -> Result<(), StoreError>;

    /// Load the full audit trail (in transition order)
    async fn list(&self) -> Result<Vec<EmergencyEvent>, StoreError>;

    /// Load a single event by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<EmergencyEvent>, StoreError>;

    /// The most recent transition, if any
    async fn latest(&self) -> Result<Option<EmergencyEvent>, StoreError>;
}
