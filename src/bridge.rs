//! Bridge ownership: transport, zone catalog, device refcount, liveness.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use log::debug;
use tokio::sync::broadcast;

use crate::adapter::DeviceIdentity;
use crate::errors::Error;
use crate::events::{self, BridgeEvent, BridgeEventKind, BridgeEvents};
use crate::transport::{SendCommands, Transport, TransportFactory};
use crate::types::{Generation, ZoneType};
use crate::zone::Zone;

type Result<T> = std::result::Result<T, Error>;

/// Sentinel the miss counter is pinned to once a bridge is marked offline.
pub(crate) const OFFLINE_MARKED: u8 = 5;
/// Consecutive missed sweeps tolerated before the offline transition.
pub(crate) const OFFLINE_THRESHOLD: u8 = 1;

/// Zone catalog of a legacy bridge.
const LEGACY_ZONES: &[(ZoneType, u8)] = &[
    (ZoneType::Rgb, 1),
    (ZoneType::Rgbw, 1),
    (ZoneType::Rgbw, 2),
    (ZoneType::Rgbw, 3),
    (ZoneType::Rgbw, 4),
    (ZoneType::White, 1),
    (ZoneType::White, 2),
    (ZoneType::White, 3),
    (ZoneType::White, 4),
];

/// Zone catalog of an iBox: the legacy catalog plus the tunable
/// full-color types, the bridge's own light and the 8-zone controller.
const IBOX_ZONES: &[(ZoneType, u8)] = &[
    (ZoneType::Rgb, 1),
    (ZoneType::Rgbw, 1),
    (ZoneType::Rgbw, 2),
    (ZoneType::Rgbw, 3),
    (ZoneType::Rgbw, 4),
    (ZoneType::White, 1),
    (ZoneType::White, 2),
    (ZoneType::White, 3),
    (ZoneType::White, 4),
    (ZoneType::Rgbww, 1),
    (ZoneType::Rgbww, 2),
    (ZoneType::Rgbww, 3),
    (ZoneType::Rgbww, 4),
    (ZoneType::Bridge, 1),
    (ZoneType::EightZoneController, 1),
    (ZoneType::EightZoneController, 2),
    (ZoneType::EightZoneController, 3),
    (ZoneType::EightZoneController, 4),
    (ZoneType::EightZoneController, 5),
    (ZoneType::EightZoneController, 6),
    (ZoneType::EightZoneController, 7),
    (ZoneType::EightZoneController, 8),
];

fn zone_table(generation: Generation) -> &'static [(ZoneType, u8)] {
    match generation {
        Generation::Legacy => LEGACY_ZONES,
        Generation::IBox => IBOX_ZONES,
    }
}

pub(crate) type DestroyHook = Box<dyn Fn(&Bridge) + Send + Sync>;

struct BridgeState {
    ip: String,
    temp: bool,
    online: bool,
    unavailable_counter: u8,
    destroyed: bool,
}

/// One physical Milight gateway.
///
/// Owns the transport bound to its current IP, the generation's fixed zone
/// catalog, and the set of platform devices using it; when the last device
/// deregisters, the bridge destroys itself.
pub struct Bridge {
    mac: String,
    generation: Generation,
    state: Mutex<BridgeState>,
    registered_devices: Mutex<HashSet<String>>,
    zones: HashMap<ZoneType, Vec<Arc<Zone>>>,
    transport: Arc<Mutex<Arc<dyn Transport>>>,
    factory: Arc<dyn TransportFactory>,
    events: broadcast::Sender<BridgeEvent>,
    on_destroy: Mutex<Option<DestroyHook>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Bridge")
            .field("mac", &self.mac)
            .field("ip", &state.ip)
            .field("generation", &self.generation)
            .field("temp", &state.temp)
            .field("online", &state.online)
            .finish()
    }
}

impl Bridge {
    pub(crate) fn new(
        mac: String,
        ip: String,
        generation: Generation,
        temp: bool,
        factory: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        let transport = Arc::new(Mutex::new(factory.bind(&ip, generation)));
        let send = Self::bind_send(&transport);
        let zones = Self::create_zones(&mac, generation, &send);

        debug!("created {generation} bridge {mac} at {ip}");
        Arc::new(Bridge {
            mac,
            generation,
            state: Mutex::new(BridgeState {
                ip,
                temp,
                online: true,
                unavailable_counter: 0,
                destroyed: false,
            }),
            registered_devices: Mutex::new(HashSet::new()),
            zones,
            transport,
            factory,
            events: events::channel(),
            on_destroy: Mutex::new(None),
        })
    }

    /// Send function handed to zones: resolves the *current* transport at
    /// call time, so zones keep working across IP changes.
    fn bind_send(transport: &Arc<Mutex<Arc<dyn Transport>>>) -> SendCommands {
        let transport = Arc::clone(transport);
        Arc::new(move |commands| {
            let current = Arc::clone(&transport.lock().unwrap());
            async move { current.send_commands(commands).await }.boxed()
        })
    }

    fn create_zones(
        mac: &str,
        generation: Generation,
        send: &SendCommands,
    ) -> HashMap<ZoneType, Vec<Arc<Zone>>> {
        let mut zones: HashMap<ZoneType, Vec<Arc<Zone>>> = HashMap::new();
        for &(zone_type, number) in zone_table(generation) {
            let id = format!("{mac}{number}{zone_type}");
            zones.entry(zone_type).or_default().push(Arc::new(Zone::new(
                id,
                number,
                zone_type,
                generation,
                Arc::clone(send),
            )));
        }
        zones
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    pub fn ip(&self) -> String {
        self.state.lock().unwrap().ip.clone()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether this bridge was added provisionally during pairing.
    pub fn is_temp(&self) -> bool {
        self.state.lock().unwrap().temp
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().unwrap().online
    }

    /// A bridge is available while it has answered the most recent sweep.
    pub fn is_available(&self) -> bool {
        self.state.lock().unwrap().unavailable_counter == 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    pub(crate) fn promote_permanent(&self) {
        self.state.lock().unwrap().temp = false;
    }

    pub(crate) fn set_on_destroy(&self, hook: DestroyHook) {
        *self.on_destroy.lock().unwrap() = Some(hook);
    }

    /// Subscribe to this bridge's lifecycle transitions.
    pub fn subscribe(&self) -> BridgeEvents {
        self.events.subscribe()
    }

    /// All zones of one type, in zone-number order.
    pub fn zones(&self, zone_type: ZoneType) -> &[Arc<Zone>] {
        self.zones.get(&zone_type).map_or(&[], Vec::as_slice)
    }

    /// Look up one zone by type and number.
    pub fn get_zone(&self, zone_type: ZoneType, number: u8) -> Option<Arc<Zone>> {
        self.zones
            .get(&zone_type)?
            .iter()
            .find(|zone| zone.number() == number)
            .cloned()
    }

    /// Move the bridge to a new IP address and rebind the transport.
    ///
    /// The bridge keeps its identity and zones; in-flight sends on the old
    /// transport are not guaranteed to land.
    pub fn update_ip_address(&self, ip: &str) {
        if ip.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock().unwrap();
            debug!("update_ip_address() -> {} moves to {ip}", state.ip);
            state.ip = ip.to_string();
        }
        self.emit(BridgeEventKind::IpChanged(ip.to_string()));

        let replacement = self.factory.bind(ip, self.generation);
        let old = std::mem::replace(&mut *self.transport.lock().unwrap(), replacement);
        old.close();
    }

    /// Count a platform device as using this bridge.
    pub fn register_device(&self, identity: &DeviceIdentity) -> Result<()> {
        let key = identity.key()?;
        self.registered_devices.lock().unwrap().insert(key);
        Ok(())
    }

    /// Remove a platform device; the last removal destroys the bridge.
    pub fn deregister_device(&self, identity: &DeviceIdentity) -> Result<()> {
        let key = identity.key()?;
        let empty = {
            let mut devices = self.registered_devices.lock().unwrap();
            devices.remove(&key);
            devices.is_empty()
        };
        if empty {
            self.destroy();
        }
        Ok(())
    }

    pub fn registered_device_count(&self) -> usize {
        self.registered_devices.lock().unwrap().len()
    }

    /// The bridge did not answer a liveness sweep. Counts misses up to the
    /// offline threshold, then pins the counter at the sentinel and emits
    /// [`BridgeEventKind::Offline`] once.
    pub(crate) fn record_missed_poll(&self) {
        let mut state = self.state.lock().unwrap();
        if state.unavailable_counter > OFFLINE_THRESHOLD
            && state.unavailable_counter != OFFLINE_MARKED
        {
            debug!(
                "mark {} as offline ({})",
                self.mac, state.unavailable_counter
            );
            state.online = false;
            state.unavailable_counter = OFFLINE_MARKED;
            drop(state);
            self.emit(BridgeEventKind::Offline);
        } else if state.unavailable_counter != OFFLINE_MARKED {
            state.unavailable_counter += 1;
        }
    }

    /// The bridge answered a liveness sweep. Resets the counter; coming
    /// back from the sentinel emits [`BridgeEventKind::Online`].
    pub(crate) fn record_successful_poll(&self) {
        let mut state = self.state.lock().unwrap();
        if state.unavailable_counter == OFFLINE_MARKED {
            debug!("mark {} as online", self.mac);
            state.unavailable_counter = 0;
            state.online = true;
            drop(state);
            self.emit(BridgeEventKind::Online);
        } else {
            state.unavailable_counter = 0;
        }
    }

    /// Tear down the bridge. Idempotent: only the first call emits
    /// [`BridgeEventKind::Destroyed`], closes the transport and fires the
    /// registry's removal hook.
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        self.emit(BridgeEventKind::Destroyed);
        self.transport.lock().unwrap().close();
        self.registered_devices.lock().unwrap().clear();
        if let Some(hook) = self.on_destroy.lock().unwrap().take() {
            hook(self);
        }
        debug!("destroyed bridge {}", self.mac);
    }

    fn emit(&self, kind: BridgeEventKind) {
        // Nobody subscribed is fine.
        let _ = self.events.send(BridgeEvent {
            mac: self.mac.clone(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::FakeTransportFactory;

    fn test_bridge(factory: &Arc<FakeTransportFactory>) -> Arc<Bridge> {
        Bridge::new(
            "ACCF23A20164".to_string(),
            "10.0.0.5".to_string(),
            Generation::Legacy,
            false,
            Arc::clone(factory) as Arc<dyn TransportFactory>,
        )
    }

    fn identity(zone_number: u8) -> DeviceIdentity {
        DeviceIdentity {
            bridge_mac: Some("ACCF23A20164".to_string()),
            zone_number: Some(zone_number),
            driver_type: Some(ZoneType::Rgbw),
        }
    }

    #[test]
    fn test_zone_catalogs() {
        let legacy_factory = Arc::new(FakeTransportFactory::default());
        let bridge = test_bridge(&legacy_factory);
        assert_eq!(bridge.zones(ZoneType::Rgb).len(), 1);
        assert_eq!(bridge.zones(ZoneType::Rgbw).len(), 4);
        assert_eq!(bridge.zones(ZoneType::White).len(), 4);
        assert!(bridge.zones(ZoneType::Rgbww).is_empty());
        assert!(bridge.get_zone(ZoneType::Bridge, 1).is_none());

        let ibox = Bridge::new(
            "F0FE6B2B4A7C".to_string(),
            "10.0.0.6".to_string(),
            Generation::IBox,
            false,
            Arc::new(FakeTransportFactory::default()) as Arc<dyn TransportFactory>,
        );
        assert_eq!(ibox.zones(ZoneType::EightZoneController).len(), 8);
        assert_eq!(ibox.zones(ZoneType::Rgbww).len(), 4);
        let zone = ibox.get_zone(ZoneType::Bridge, 1).unwrap();
        assert_eq!(zone.id(), "F0FE6B2B4A7C1Bridge");
    }

    #[test]
    fn test_update_ip_rebinds_transport() {
        let factory = Arc::new(FakeTransportFactory::default());
        let bridge = test_bridge(&factory);
        let mut events = bridge.subscribe();

        bridge.update_ip_address("10.0.0.9");

        assert_eq!(bridge.ip(), "10.0.0.9");
        assert_eq!(
            events.try_recv().unwrap().kind,
            BridgeEventKind::IpChanged("10.0.0.9".to_string())
        );

        let bound = factory.bound.lock().unwrap();
        assert_eq!(bound.len(), 2);
        assert!(bound[0].is_closed());
        assert_eq!(bound[1].addr, "10.0.0.9:8899");
    }

    #[test]
    fn test_last_device_deregistration_destroys_once() {
        let factory = Arc::new(FakeTransportFactory::default());
        let bridge = test_bridge(&factory);
        let mut events = bridge.subscribe();

        bridge.register_device(&identity(1)).unwrap();
        bridge.register_device(&identity(2)).unwrap();
        // Registering the same device twice is refcounted as one.
        bridge.register_device(&identity(2)).unwrap();
        assert_eq!(bridge.registered_device_count(), 2);

        bridge.deregister_device(&identity(1)).unwrap();
        assert!(!bridge.is_destroyed());

        bridge.deregister_device(&identity(2)).unwrap();
        assert!(bridge.is_destroyed());

        // Idempotent: a second destroy emits nothing.
        bridge.destroy();
        let destroyed: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| event.kind == BridgeEventKind::Destroyed)
            .collect();
        assert_eq!(destroyed.len(), 1);
    }

    #[test]
    fn test_identity_missing_field() {
        let factory = Arc::new(FakeTransportFactory::default());
        let bridge = test_bridge(&factory);
        let incomplete = DeviceIdentity {
            bridge_mac: Some("ACCF23A20164".to_string()),
            zone_number: None,
            driver_type: Some(ZoneType::Rgbw),
        };
        assert_eq!(
            bridge.register_device(&incomplete).unwrap_err(),
            Error::MissingField("zoneNumber")
        );
    }

    #[test]
    fn test_liveness_counter_state_machine() {
        let factory = Arc::new(FakeTransportFactory::default());
        let bridge = test_bridge(&factory);
        let mut events = bridge.subscribe();

        // Two misses are tolerated without a transition.
        bridge.record_missed_poll();
        bridge.record_missed_poll();
        assert!(bridge.is_online());
        assert!(events.try_recv().is_err());

        // The third miss crosses the threshold.
        bridge.record_missed_poll();
        assert!(!bridge.is_online());
        assert_eq!(events.try_recv().unwrap().kind, BridgeEventKind::Offline);

        // Further misses are absorbed at the sentinel.
        bridge.record_missed_poll();
        assert!(events.try_recv().is_err());

        // Reappearing resets the counter and emits online.
        bridge.record_successful_poll();
        assert!(bridge.is_online());
        assert!(bridge.is_available());
        assert_eq!(events.try_recv().unwrap().kind, BridgeEventKind::Online);

        // Answering while online only resets the counter.
        bridge.record_missed_poll();
        bridge.record_successful_poll();
        assert!(bridge.is_available());
        assert!(events.try_recv().is_err());
    }
}
