//! Event broadcasting.
//!
//! Oracle notifications drained after each mutation are stamped with a
//! sequence number and pushed to `subscribe_events` connections. Each
//! subscriber has an independent buffer of `advanced.event_buffer` events;
//! slow subscribers lose the oldest ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tally_types::events::OracleEvent;
use tally_types::AssetId;
use tokio::sync::broadcast;

/// An event as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic per-daemon sequence number, starting at 1.
    pub sequence: u64,
    /// Event type name (e.g. "ConsensusReached").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    pub payload: OracleEvent,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only these event type names.
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    /// Only events about these assets. Global events always pass.
    #[serde(default)]
    pub assets: Option<Vec<AssetId>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, payload: OracleEvent, timestamp: u64) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = Event {
            sequence,
            event_type: payload.name().to_string(),
            timestamp,
            payload,
        };
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == &event.event_type) {
                return false;
            }
        }

        if let Some(ref assets) = self.assets {
            if let Some(asset) = event.payload.asset() {
                if !assets.contains(&asset) {
                    return false;
                }
            }
        }

        true
    }
}
