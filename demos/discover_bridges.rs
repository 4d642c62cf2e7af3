//! Discover all Milight bridges on the network and list their zones.
//!
//! This example demonstrates:
//! - Discovery of both bridge generations via UDP broadcast
//! - The fixed zone catalog each generation exposes
//!
//! Run with: cargo run --example discover_bridges

use milight_rs::{BridgeManager, DiscoverOptions, ZoneType};
use strum::IntoEnumIterator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Discovering Milight bridges on the network...");

    let manager = BridgeManager::with_defaults();
    let bridges = manager.discover_bridges(DiscoverOptions::default()).await?;

    if bridges.is_empty() {
        println!("No bridges found on the network.");
        manager.destroy();
        return Ok(());
    }

    println!("Found {} bridge(s):", bridges.len());
    for bridge in &bridges {
        println!(
            "  - {} at {} ({})",
            bridge.mac(),
            bridge.ip(),
            bridge.generation()
        );
        for zone_type in ZoneType::iter() {
            let zones = bridge.zones(zone_type);
            if !zones.is_empty() {
                println!("      {zone_type}: zones 1-{}", zones.len());
            }
        }
    }

    manager.destroy();
    Ok(())
}
