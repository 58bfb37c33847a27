//! Event bus for internal daemon communication.
//!
//! The event bus decouples the risk core from its observers:
//! - Position Monitor → Risk Service (closes to settle)
//! - Risk Service → notification sinks (opens, closes, mode changes)
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use vigil_domain::{CloseReason, EmergencyTrigger, Price, Quantity, Side, Symbol, TradingMode};

// =============================================================================
// Event Types
// =============================================================================

/// Events that flow through the daemon event bus.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A position passed all risk gates and is now monitored
    PositionOpened {
        /// Trading pair
        symbol: Symbol,
        /// Position direction
        side: Side,
        /// Fill price at entry
        entry_price: Price,
        /// Position size
        amount: Quantity,
        /// When the position was opened
        opened_at: DateTime<Utc>,
    },

    /// The monitor closed a position
    PositionClosed {
        /// Trading pair
        symbol: Symbol,
        /// Position direction
        side: Side,
        /// Fill price at entry
        entry_price: Price,
        /// Fill price at exit
        exit_price: Price,
        /// Position size
        amount: Quantity,
        /// Fee paid at exit
        exit_fee: Decimal,
        /// Why the position was closed
        reason: CloseReason,
        /// When the close executed
        closed_at: DateTime<Utc>,
    },

    /// The trading mode changed
    ModeChanged {
        /// Mode before the transition
        mode_before: TradingMode,
        /// Mode after the transition
        mode_after: TradingMode,
        /// What caused the transition
        trigger: EmergencyTrigger,
        /// Human-readable reason
        reason: String,
    },

    /// Shutdown signal
    Shutdown,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for daemon-wide communication.
///
/// Multiple producers can send events, and multiple consumers can receive.
/// Uses broadcast channels for fan-out pattern.
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no active receivers.
    pub fn send(&self, event: CoreEvent) -> usize {
        // send() returns Err if there are no receivers, but we don't care
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will receive all events sent after subscription.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver for daemon events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<CoreEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<CoreEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
