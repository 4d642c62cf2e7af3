//! # milight_rs
//!
//! An async Rust library for controlling Milight wireless bridges and the
//! bulbs behind them over UDP.
//!
//! Milight lighting (also sold as LimitlessLED and EasyBulb) is driven
//! through bridge devices speaking one of two connectionless protocols:
//! the **legacy** dialect of the first wifi bridges and the session-based
//! **iBox / v6** dialect. This crate implements the bridge and zone
//! management core: discovery and liveness tracking, registration and
//! deduplication of bridges by MAC, and mapping capability intents onto
//! the command sequences each zone type understands.
//!
//! ## Quick Start
//!
//! ```ignore
//! use milight_rs::{BridgeManager, DiscoverOptions, ZoneType};
//!
//! async fn evening_lights() -> Result<(), milight_rs::Error> {
//!     // Discover and register every bridge on the local network.
//!     let manager = BridgeManager::with_defaults();
//!     let bridges = manager.discover_bridges(DiscoverOptions::default()).await?;
//!
//!     for bridge in &bridges {
//!         if let Some(zone) = bridge.get_zone(ZoneType::Rgbw, 1) {
//!             zone.turn_on().await?;
//!             zone.set_brightness(0.8).await?;
//!             zone.set_hue(0.62).await?;
//!         }
//!     }
//!
//!     manager.destroy();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Discovery**: find bridges of both generations with [`UdpDiscovery`],
//!   or plug in your own [`Discover`] implementation
//! - **Registry**: [`BridgeManager`] deduplicates bridges by MAC across
//!   sweeps and migrates IPs in place
//! - **Liveness**: a 30 second poll drives each bridge's
//!   online/offline state machine, surfaced as typed [`BridgeEvent`]s
//! - **Zones**: [`Zone`] translates brightness, hue, saturation,
//!   temperature, white/night mode and scene effects into per-type
//!   command sequences, including the relative stepping of legacy RGB
//!   and dual-white bulbs
//! - **Pairing support**: provisional (`temp`) bridges and
//!   [`BridgeManager::deregister_temp_bridges`] cleanup
//!
//! ## Communication
//!
//! Everything is fire-and-forget UDP: discovery probes go to port 48899,
//! commands to port 8899 (legacy) or 5987 (iBox). There is no delivery
//! guarantee; retryable operations are sent twice, 100 ms apart, as a
//! best-effort duplicate. Commands are built by the [`ZoneCommands`]
//! table and shipped through a [`Transport`], both replaceable for
//! testing or for a different wire backend.

mod adapter;
mod bridge;
mod commands;
mod discovery;
mod errors;
mod events;
mod manager;
mod transport;
mod types;
mod zone;

// Re-export public API
pub use adapter::{Capability, DeviceIdentity, ModeRequest, apply_capability, calibrate_hue};
pub use bridge::Bridge;
pub use commands::{Command, ZoneCommands};
pub use discovery::{DISCOVERY_PORT, Discover, DiscoveredBridge, DiscoveryTarget, UdpDiscovery};
pub use errors::Error;
pub use events::{BridgeEvent, BridgeEventKind, BridgeEvents};
pub use manager::{BridgeCandidate, BridgeManager, BridgeQuery, DiscoverOptions};
pub use transport::{
    SendCommands, Transport, TransportFactory, UdpTransport, UdpTransportFactory,
};
pub use types::{Generation, LightMode, SceneId, ZoneType};
pub use zone::Zone;
