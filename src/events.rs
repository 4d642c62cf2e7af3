//! Typed bridge lifecycle events.
//!
//! Consumers subscribe to a bridge and receive state-transition messages
//! over a broadcast channel instead of wiring up named event callbacks.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 16;

/// A state transition on a registered bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvent {
    /// MAC address of the bridge the transition happened on.
    pub mac: String,
    pub kind: BridgeEventKind,
}

/// The transitions a bridge can go through after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeEventKind {
    /// The bridge answered a discovery sweep after having been offline.
    Online,
    /// The bridge missed enough consecutive sweeps to be marked offline.
    Offline,
    /// The bridge reappeared on a different IP address.
    IpChanged(String),
    /// The bridge was destroyed and left the registry.
    Destroyed,
}

/// Receiver half handed out by [`crate::Bridge::subscribe`].
pub type BridgeEvents = broadcast::Receiver<BridgeEvent>;

pub(crate) fn channel() -> broadcast::Sender<BridgeEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}
