//! Bridge discovery via UDP broadcast.

use std::collections::HashMap;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use crate::errors::Error;
use crate::types::Generation;

type Result<T> = std::result::Result<T, Error>;

/// Port all Milight bridge generations answer discovery probes on.
pub const DISCOVERY_PORT: u16 = 48899;

/// Probe string answered by legacy (v1-v5) bridges.
const LEGACY_PROBE: &[u8] = b"Link_Wi-Fi";
/// Probe string answered by iBox (v6) bridges.
const V6_PROBE: &[u8] = b"HF-A11ASSISTHREAD";

/// A bridge that answered a discovery sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredBridge {
    /// MAC address as reported by the bridge.
    pub mac: String,
    /// IPv4 address the reply came from.
    pub ip: String,
    /// Protocol generation inferred from the reply shape.
    pub generation: Generation,
}

/// Which generation(s) a sweep should probe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryTarget {
    /// Probe both generations.
    #[default]
    All,
    /// Probe a single generation.
    Only(Generation),
}

impl DiscoveryTarget {
    fn matches(&self, generation: Generation) -> bool {
        match self {
            DiscoveryTarget::All => true,
            DiscoveryTarget::Only(wanted) => *wanted == generation,
        }
    }
}

/// Network scan collaborator.
///
/// Best-effort: an empty result is not an error. The default implementation
/// is [`UdpDiscovery`]; tests substitute scripted implementations.
pub trait Discover: Send + Sync {
    fn discover(
        &self,
        target: DiscoveryTarget,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredBridge>>>;
}

/// Discover bridges by broadcasting the generation probe strings and
/// collecting `ip,mac[,module]` replies until the timeout elapses.
#[derive(Debug, Default)]
pub struct UdpDiscovery;

impl UdpDiscovery {
    async fn sweep(
        &self,
        target: DiscoveryTarget,
        discovery_timeout: Duration,
    ) -> Result<Vec<DiscoveredBridge>> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::socket("bind", e))?;

        socket
            .set_broadcast(true)
            .map_err(|e| Error::socket("set_broadcast", e))?;

        let probes: &[&[u8]] = match target {
            DiscoveryTarget::All => &[LEGACY_PROBE, V6_PROBE],
            DiscoveryTarget::Only(Generation::Legacy) => &[LEGACY_PROBE],
            DiscoveryTarget::Only(Generation::IBox) => &[V6_PROBE],
        };
        let broadcast_addr = format!("255.255.255.255:{DISCOVERY_PORT}");
        for probe in probes {
            socket
                .send_to(probe, &broadcast_addr)
                .await
                .map_err(|e| Error::socket("send_to", e))?;
        }

        let mut discovered: HashMap<String, DiscoveredBridge> = HashMap::new();
        let start = tokio::time::Instant::now();
        let mut buffer = [0u8; 1024];
        let recv_timeout = Duration::from_millis(500);

        while start.elapsed() < discovery_timeout {
            match tokio::time::timeout(recv_timeout, socket.recv_from(&mut buffer)).await {
                Ok(Ok((size, addr))) => {
                    if let Ok(reply) = std::str::from_utf8(&buffer[..size])
                        && let Some(bridge) = parse_reply(reply, &addr.ip().to_string())
                        && target.matches(bridge.generation)
                    {
                        debug!("discovery reply from {} ({})", bridge.ip, bridge.mac);
                        discovered.insert(bridge.mac.clone(), bridge);
                    }
                }
                // Timeout elapsed - continue loop to check overall timeout
                Ok(Err(_)) | Err(_) => continue,
            }
        }

        Ok(discovered.into_values().collect())
    }
}

impl Discover for UdpDiscovery {
    fn discover(
        &self,
        target: DiscoveryTarget,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<DiscoveredBridge>>> {
        self.sweep(target, timeout).boxed()
    }
}

/// Parse an `ip,mac[,module]` discovery reply. Legacy bridges answer with
/// two fields, the iBox appends its module name.
fn parse_reply(reply: &str, source_ip: &str) -> Option<DiscoveredBridge> {
    let reply = reply.trim_end_matches(['\r', '\n', '\0']);
    let mut fields = reply.split(',');
    let ip = fields.next()?.trim();
    let mac = fields.next()?.trim();
    if ip.is_empty() || mac.is_empty() {
        return None;
    }

    // Some firmwares answer from a different interface than they report;
    // trust the reported field, fall back to the packet source.
    let ip = if ip.parse::<std::net::Ipv4Addr>().is_ok() {
        ip.to_string()
    } else {
        source_ip.to_string()
    };

    let generation = if fields.next().is_some() {
        Generation::IBox
    } else {
        Generation::Legacy
    };

    Some(DiscoveredBridge {
        mac: mac.to_string(),
        ip,
        generation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_reply() {
        let bridge = parse_reply("10.0.0.5,ACCF23A20164", "10.0.0.5").unwrap();
        assert_eq!(bridge.ip, "10.0.0.5");
        assert_eq!(bridge.mac, "ACCF23A20164");
        assert_eq!(bridge.generation, Generation::Legacy);
    }

    #[test]
    fn test_parse_v6_reply() {
        let bridge = parse_reply("10.0.0.6,F0FE6B2B4A7C,HF-LPB100\r\n", "10.0.0.6").unwrap();
        assert_eq!(bridge.generation, Generation::IBox);
        assert_eq!(bridge.mac, "F0FE6B2B4A7C");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_reply("", "10.0.0.1").is_none());
        assert!(parse_reply("Link_Wi-Fi", "10.0.0.1").is_none());
    }

    #[test]
    fn test_unparseable_ip_falls_back_to_source() {
        let bridge = parse_reply("not-an-ip,AABBCC", "192.168.1.20").unwrap();
        assert_eq!(bridge.ip, "192.168.1.20");
    }
}
