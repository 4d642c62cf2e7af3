//! CLI application for controlling Milight zones through a bridge.
//!
//! This example demonstrates the manager/bridge/zone flow end to end:
//! discovery, resolving a bridge by MAC, and driving zone capabilities.
//!
//! Run with: cargo run --example milight_cli -- --help

use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::time::Duration;
use milight_rs::{
    BridgeManager, DiscoverOptions, DiscoveryTarget, SceneId, ZoneType,
};

#[derive(Parser)]
#[command(name = "milight-cli")]
#[command(about = "Control Milight bridges and zones from the command line", long_about = None)]
struct Cli {
    /// MAC address of the bridge (not required for discover command)
    #[arg(short, long, global = true)]
    mac: Option<String>,

    /// Zone type (RGB, RGBW, White, RGBWW, Bridge, "8-Zone Controller")
    #[arg(short = 't', long, global = true, default_value = "RGBW")]
    zone_type: String,

    /// Zone number
    #[arg(short, long, global = true, default_value = "1")]
    zone: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover all Milight bridges on the network
    Discover {
        /// Discovery timeout in seconds (default: 3)
        #[arg(short, long, default_value = "3")]
        timeout: u64,
    },

    /// Turn the zone on
    On,

    /// Turn the zone off
    Off,

    /// Set brightness (0.0-1.0)
    Brightness { level: f64 },

    /// Set hue (0.0-1.0)
    Hue { hue: f64 },

    /// Set color temperature (0.0-1.0)
    Temperature { temperature: f64 },

    /// Switch to white mode
    White {
        /// Absolute temperature, required for RGBWW and 8-zone types
        #[arg(short, long)]
        temperature: Option<f64>,
    },

    /// Switch to night mode
    Night,

    /// Toggle a scene effect
    Scene {
        /// Effect index 1-9 (iBox only); omitted advances to the next effect
        id: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let manager = BridgeManager::with_defaults();

    if let Commands::Discover { timeout } = &cli.command {
        println!("Discovering Milight bridges (timeout: {timeout}s)...");
        let bridges = manager
            .discover_bridges(DiscoverOptions {
                target: DiscoveryTarget::All,
                timeout: Duration::from_secs(*timeout),
                ..Default::default()
            })
            .await?;

        if bridges.is_empty() {
            println!("No bridges found on the network.");
        } else {
            println!("\nFound {} bridge(s):", bridges.len());
            for bridge in bridges {
                println!(
                    "  IP: {:15}  MAC: {}  ({})",
                    bridge.ip(),
                    bridge.mac(),
                    bridge.generation()
                );
            }
        }
        manager.destroy();
        return Ok(());
    }

    let mac = cli.mac.ok_or("--mac is required for zone commands")?;
    let zone_type = ZoneType::from_str(&cli.zone_type)
        .map_err(|_| format!("unknown zone type: {}", cli.zone_type))?;

    let bridge = manager.find_bridge(&mac).await?;
    let zone = bridge
        .get_zone(zone_type, cli.zone)
        .ok_or_else(|| format!("no {zone_type} zone {} on this bridge", cli.zone))?;

    match cli.command {
        Commands::Discover { .. } => unreachable!(),
        Commands::On => zone.turn_on().await?,
        Commands::Off => zone.turn_off().await?,
        Commands::Brightness { level } => zone.set_brightness(level).await?,
        Commands::Hue { hue } => zone.set_hue(hue).await?,
        Commands::Temperature { temperature } => zone.set_temperature(temperature).await?,
        Commands::White { temperature } => zone.enable_white_mode(temperature).await?,
        Commands::Night => zone.enable_night_mode().await?,
        Commands::Scene { id } => {
            let scene = id.and_then(SceneId::create);
            zone.toggle_scene(scene).await?;
        }
    }

    println!("Done.");
    manager.destroy();
    Ok(())
}
