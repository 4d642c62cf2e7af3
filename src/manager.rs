//! Bridge registry, coalesced discovery and liveness polling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::bridge::Bridge;
use crate::discovery::{Discover, DiscoveredBridge, DiscoveryTarget, UdpDiscovery};
use crate::errors::Error;
use crate::transport::{TransportFactory, UdpTransportFactory};
use crate::types::Generation;

type Result<T> = std::result::Result<T, Error>;

/// Interval between liveness sweeps.
const BRIDGE_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default collaborator timeout for one sweep.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Result shape shared with coalesced scan waiters; [`Error`] does not
/// clone, so waiters get the failure rendered to a message.
type ScanOutcome = std::result::Result<Vec<DiscoveredBridge>, String>;

/// Options for [`BridgeManager::discover_bridges`].
#[derive(Debug, Clone, Copy)]
pub struct DiscoverOptions {
    /// Which generation(s) to probe.
    pub target: DiscoveryTarget,
    /// Timeout handed to the discovery collaborator.
    pub timeout: Duration,
    /// Register found bridges provisionally (pairing flow); they are
    /// garbage-collected by [`BridgeManager::deregister_temp_bridges`]
    /// unless promoted.
    pub temp: bool,
    /// Skip the automatic second sweep on an empty first result.
    pub no_retry: bool,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        DiscoverOptions {
            target: DiscoveryTarget::All,
            timeout: DISCOVERY_TIMEOUT,
            temp: false,
            no_retry: false,
        }
    }
}

/// A to-be-registered bridge, as handed over by pairing UI or platform
/// settings. Loosely typed on purpose: validation happens in
/// [`BridgeManager::register_bridge`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeCandidate {
    pub mac: Option<String>,
    pub ip: Option<String>,
    pub name: Option<String>,
    // Older platform settings persisted this field as "type".
    #[serde(alias = "type")]
    pub generation: Option<Generation>,
}

impl From<&DiscoveredBridge> for BridgeCandidate {
    fn from(discovered: &DiscoveredBridge) -> Self {
        BridgeCandidate {
            mac: Some(discovered.mac.clone()),
            ip: Some(discovered.ip.clone()),
            name: None,
            generation: Some(discovered.generation),
        }
    }
}

/// Registry lookup query.
#[derive(Debug, Clone)]
pub struct BridgeQuery {
    mac: String,
    available: bool,
}

impl BridgeQuery {
    /// Match any bridge with this MAC.
    pub fn mac(mac: &str) -> Self {
        BridgeQuery {
            mac: mac.to_string(),
            available: false,
        }
    }

    /// Additionally require the bridge to have answered the most recent
    /// sweep.
    pub fn available(mut self) -> Self {
        self.available = true;
        self
    }
}

struct Inner {
    bridges: Vec<Arc<Bridge>>,
    discovering: bool,
    waiters: Vec<oneshot::Sender<ScanOutcome>>,
}

/// Registry and state machine for every bridge on the network.
///
/// Explicitly owned: construct one with injected collaborators (or
/// [`BridgeManager::with_defaults`]) and tear it down with
/// [`BridgeManager::destroy`]. The manager polls the network every 30
/// seconds while at least one bridge is registered, migrating IPs and
/// driving the online/offline transitions.
pub struct BridgeManager {
    inner: Arc<Mutex<Inner>>,
    discovery: Arc<dyn Discover>,
    transports: Arc<dyn TransportFactory>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeManager {
    /// Create a manager with injected collaborators and start the
    /// liveness poll.
    pub fn new(discovery: Arc<dyn Discover>, transports: Arc<dyn TransportFactory>) -> Arc<Self> {
        let manager = Arc::new(BridgeManager {
            inner: Arc::new(Mutex::new(Inner {
                bridges: Vec::new(),
                discovering: false,
                waiters: Vec::new(),
            })),
            discovery,
            transports,
            poll_task: Mutex::new(None),
        });
        manager.start_polling();
        debug!("created bridge manager");
        manager
    }

    /// Create a manager on the default UDP discovery and transport.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(Arc::new(UdpDiscovery), Arc::new(UdpTransportFactory))
    }

    /// Discover and register bridges.
    ///
    /// Concurrent callers share one in-flight network scan. If the first
    /// sweep finds nothing the manager retries once before giving up
    /// (unless `no_retry` is set).
    pub async fn discover_bridges(&self, options: DiscoverOptions) -> Result<Vec<Arc<Bridge>>> {
        debug!("discover_bridges() -> starting bridge discovery");
        let mut attempted_retry = false;
        loop {
            let found = self.scan(options.target, options.timeout).await?;
            debug!("discover_bridges() -> found {} bridge(s)", found.len());

            let mut registered = Vec::new();
            for candidate in &found {
                registered.push(self.register_bridge(&BridgeCandidate::from(candidate), options.temp)?);
            }

            if !registered.is_empty() || options.no_retry || attempted_retry {
                return Ok(registered);
            }
            attempted_retry = true;
        }
    }

    /// Register a bridge, or update the one already registered under the
    /// same MAC.
    ///
    /// Idempotent upsert: a known MAC on a new IP is migrated in place
    /// (same bridge object, same zones); a provisional bridge registered
    /// again with `temp = false` is promoted to permanent.
    pub fn register_bridge(&self, candidate: &BridgeCandidate, temp: bool) -> Result<Arc<Bridge>> {
        let ip = candidate.ip.as_deref().ok_or(Error::MissingField("ip"))?;
        let mac = candidate.mac.as_deref().ok_or(Error::MissingField("mac"))?;
        if candidate.name.is_none() && candidate.generation.is_none() {
            return Err(Error::MissingField("name or generation"));
        }

        let existing = {
            let inner = self.inner.lock().unwrap();
            inner
                .bridges
                .iter()
                .find(|bridge| bridge.mac() == mac)
                .cloned()
        };
        if let Some(bridge) = existing {
            debug!("register_bridge() -> {mac} already registered");
            if bridge.ip() != ip {
                debug!("register_bridge() -> registered on a different ip, updating it");
                bridge.update_ip_address(ip);
            }
            // Only promote when it was provisional and this call says
            // permanent; never demote.
            if bridge.is_temp() && !temp {
                bridge.promote_permanent();
            }
            return Ok(bridge);
        }

        let generation = candidate
            .generation
            .ok_or(Error::MissingField("generation"))?;
        debug!("register_bridge() -> new {generation} bridge {mac}, temp: {temp}");

        let bridge = Bridge::new(
            mac.to_string(),
            ip.to_string(),
            generation,
            temp,
            Arc::clone(&self.transports),
        );

        let registry = Arc::downgrade(&self.inner);
        bridge.set_on_destroy(Box::new(move |destroyed| {
            if let Some(inner) = registry.upgrade() {
                let mut inner = inner.lock().unwrap();
                inner.bridges.retain(|bridge| bridge.mac() != destroyed.mac());
                debug!(
                    "deregister_bridge() -> removed {} ({} left)",
                    destroyed.mac(),
                    inner.bridges.len()
                );
            }
        }));

        self.inner.lock().unwrap().bridges.push(Arc::clone(&bridge));
        Ok(bridge)
    }

    /// Look up a registered bridge.
    pub fn get_bridge(&self, query: &BridgeQuery) -> Result<Arc<Bridge>> {
        let inner = self.inner.lock().unwrap();
        inner
            .bridges
            .iter()
            .find(|bridge| bridge.mac() == query.mac && (!query.available || bridge.is_available()))
            .cloned()
            .ok_or_else(|| Error::BridgeNotFound(query.mac.clone()))
    }

    /// Whether a bridge with this MAC is registered.
    pub fn has_bridge(&self, mac: &str) -> bool {
        self.get_bridge(&BridgeQuery::mac(mac)).is_ok()
    }

    /// Snapshot of the currently registered bridges.
    pub fn get_registered_bridges(&self) -> Vec<Arc<Bridge>> {
        self.inner.lock().unwrap().bridges.clone()
    }

    /// Resolve a bridge by MAC, discovering if it is not yet registered
    /// (or currently unavailable).
    pub async fn find_bridge(&self, mac: &str) -> Result<Arc<Bridge>> {
        let query = BridgeQuery::mac(mac).available();
        if let Ok(bridge) = self.get_bridge(&query) {
            return Ok(bridge);
        }

        debug!("find_bridge() -> {mac} -> not available, start discovery");
        self.discover_bridges(DiscoverOptions::default()).await?;

        match self.get_bridge(&query) {
            Ok(bridge) => {
                debug!("find_bridge() -> {mac} -> found bridge after discovering");
                Ok(bridge)
            }
            Err(_) => Err(Error::BridgeNotFound(mac.to_string())),
        }
    }

    /// Destroy every bridge still flagged provisional; cleanup after an
    /// abandoned pairing flow.
    pub fn deregister_temp_bridges(&self) {
        let temps: Vec<_> = self
            .get_registered_bridges()
            .into_iter()
            .filter(|bridge| bridge.is_temp())
            .collect();
        debug!("deregister_temp_bridges() -> {} bridge(s)", temps.len());
        for bridge in temps {
            bridge.destroy();
        }
    }

    /// Stop the poll task and destroy every registered bridge.
    pub fn destroy(&self) {
        if let Some(handle) = self.poll_task.lock().unwrap().take() {
            handle.abort();
        }
        for bridge in self.get_registered_bridges() {
            bridge.destroy();
        }
        debug!("destroyed bridge manager");
    }

    fn start_polling(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(BRIDGE_POLL_INTERVAL);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                manager.poll_once().await;
            }
        });
        *self.poll_task.lock().unwrap() = Some(handle);
    }

    /// One liveness sweep: silently migrate IPs of bridges that moved and
    /// feed hit/miss into each bridge's availability counter. Skipped
    /// while nothing is registered.
    pub(crate) async fn poll_once(&self) {
        if self.inner.lock().unwrap().bridges.is_empty() {
            return;
        }
        debug!("liveness poll -> perform discovery");

        let found = match self.scan(DiscoveryTarget::All, DISCOVERY_TIMEOUT).await {
            Ok(found) => found,
            Err(err) => {
                error!("liveness poll failed: {err}");
                return;
            }
        };
        debug!("liveness poll -> discovery result {} bridge(s)", found.len());

        for bridge in self.get_registered_bridges() {
            match found.iter().find(|candidate| candidate.mac == bridge.mac()) {
                Some(candidate) => {
                    if candidate.ip != bridge.ip() {
                        debug!(
                            "liveness poll -> found new ip {} (old: {})",
                            candidate.ip,
                            bridge.ip()
                        );
                        bridge.update_ip_address(&candidate.ip);
                    }
                    bridge.record_successful_poll();
                }
                None => bridge.record_missed_poll(),
            }
        }
    }

    /// Raw coalesced scan: at most one collaborator call is in flight;
    /// late callers wait for the pending result instead of starting a
    /// second sweep.
    async fn scan(
        &self,
        target: DiscoveryTarget,
        timeout: Duration,
    ) -> Result<Vec<DiscoveredBridge>> {
        let waiter = {
            let mut inner = self.inner.lock().unwrap();
            if inner.discovering {
                let (sender, receiver) = oneshot::channel();
                inner.waiters.push(sender);
                Some(receiver)
            } else {
                inner.discovering = true;
                None
            }
        };

        if let Some(receiver) = waiter {
            return match receiver.await {
                Ok(Ok(found)) => Ok(found),
                Ok(Err(message)) => Err(Error::Discovery(message)),
                Err(_) => Err(Error::Discovery("scan abandoned".to_string())),
            };
        }

        let result = self.discovery.discover(target, timeout).await;
        let outcome: ScanOutcome = match &result {
            Ok(found) => Ok(found.clone()),
            Err(err) => Err(err.to_string()),
        };

        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            inner.discovering = false;
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;
    use futures::future::BoxFuture;

    use crate::events::BridgeEventKind;
    use crate::transport::testing::FakeTransportFactory;
    use crate::types::ZoneType;

    struct ScriptedDiscovery {
        results: Mutex<VecDeque<Vec<DiscoveredBridge>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedDiscovery {
        fn new(results: Vec<Vec<DiscoveredBridge>>) -> Arc<Self> {
            Arc::new(ScriptedDiscovery {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn with_delay(results: Vec<Vec<DiscoveredBridge>>, delay: Duration) -> Arc<Self> {
            Arc::new(ScriptedDiscovery {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Discover for ScriptedDiscovery {
        fn discover(
            &self,
            _target: DiscoveryTarget,
            _timeout: Duration,
        ) -> BoxFuture<'_, Result<Vec<DiscoveredBridge>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let found = self.results.lock().unwrap().pop_front().unwrap_or_default();
            let delay = self.delay;
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(found)
            }
            .boxed()
        }
    }

    fn legacy(mac: &str, ip: &str) -> DiscoveredBridge {
        DiscoveredBridge {
            mac: mac.to_string(),
            ip: ip.to_string(),
            generation: Generation::Legacy,
        }
    }

    fn manager_with(
        discovery: &Arc<ScriptedDiscovery>,
    ) -> (Arc<BridgeManager>, Arc<FakeTransportFactory>) {
        let factory = Arc::new(FakeTransportFactory::default());
        let manager = BridgeManager::new(
            Arc::clone(discovery) as Arc<dyn Discover>,
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
        );
        (manager, factory)
    }

    fn candidate(mac: &str, ip: &str) -> BridgeCandidate {
        BridgeCandidate::from(&legacy(mac, ip))
    }

    #[tokio::test]
    async fn test_registry_dedups_by_mac() {
        let discovery = ScriptedDiscovery::new(Vec::new());
        let (manager, _) = manager_with(&discovery);

        let first = manager
            .register_bridge(&candidate("ACCF23A20164", "10.0.0.5"), false)
            .unwrap();
        let zone = first.get_zone(ZoneType::Rgbw, 2).unwrap();

        let second = manager
            .register_bridge(&candidate("ACCF23A20164", "10.0.0.7"), false)
            .unwrap();

        // Same object, updated address, zone identity preserved.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.ip(), "10.0.0.7");
        assert!(Arc::ptr_eq(&zone, &second.get_zone(ZoneType::Rgbw, 2).unwrap()));
        assert_eq!(manager.get_registered_bridges().len(), 1);
    }

    #[tokio::test]
    async fn test_register_validates_candidate() {
        let discovery = ScriptedDiscovery::new(Vec::new());
        let (manager, _) = manager_with(&discovery);

        let missing_ip = BridgeCandidate {
            mac: Some("ACCF23A20164".to_string()),
            generation: Some(Generation::Legacy),
            ..Default::default()
        };
        assert_eq!(
            manager.register_bridge(&missing_ip, false).unwrap_err(),
            Error::MissingField("ip")
        );

        let missing_identity = BridgeCandidate {
            mac: Some("ACCF23A20164".to_string()),
            ip: Some("10.0.0.5".to_string()),
            ..Default::default()
        };
        assert_eq!(
            manager.register_bridge(&missing_identity, false).unwrap_err(),
            Error::MissingField("name or generation")
        );
    }

    #[tokio::test]
    async fn test_concurrent_discoveries_share_one_scan() {
        let discovery = ScriptedDiscovery::with_delay(
            vec![vec![legacy("ACCF23A20164", "10.0.0.5")]],
            Duration::from_millis(20),
        );
        let (manager, _) = manager_with(&discovery);

        let (first, second) = tokio::join!(
            manager.discover_bridges(DiscoverOptions::default()),
            manager.discover_bridges(DiscoverOptions::default()),
        );

        assert_eq!(discovery.calls(), 1);
        assert_eq!(first.unwrap().len(), 1);
        assert_eq!(second.unwrap().len(), 1);
        assert_eq!(manager.get_registered_bridges().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_discovery_retries_once() {
        let discovery = ScriptedDiscovery::new(vec![
            Vec::new(),
            vec![legacy("ACCF23A20164", "10.0.0.5")],
        ]);
        let (manager, _) = manager_with(&discovery);

        let found = manager
            .discover_bridges(DiscoverOptions::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(discovery.calls(), 2);

        // A second empty sweep is final.
        let nothing = ScriptedDiscovery::new(Vec::new());
        let (manager, _) = manager_with(&nothing);
        assert!(manager
            .discover_bridges(DiscoverOptions::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(nothing.calls(), 2);
    }

    #[tokio::test]
    async fn test_find_bridge_discovers_on_miss() {
        let discovery = ScriptedDiscovery::new(vec![vec![legacy("ACCF23A20164", "10.0.0.5")]]);
        let (manager, _) = manager_with(&discovery);

        let bridge = manager.find_bridge("ACCF23A20164").await.unwrap();
        assert_eq!(bridge.ip(), "10.0.0.5");

        // Second lookup hits the registry without another scan.
        let calls = discovery.calls();
        manager.find_bridge("ACCF23A20164").await.unwrap();
        assert_eq!(discovery.calls(), calls);

        assert_eq!(
            manager.find_bridge("F0FE6B2B4A7C").await.unwrap_err(),
            Error::BridgeNotFound("F0FE6B2B4A7C".to_string())
        );
    }

    #[tokio::test]
    async fn test_poll_drives_liveness_and_ip_migration() {
        let discovery = ScriptedDiscovery::new(vec![
            Vec::new(),
            Vec::new(),
            Vec::new(),
            vec![legacy("ACCF23A20164", "10.0.0.9")],
        ]);
        let (manager, _) = manager_with(&discovery);

        let bridge = manager
            .register_bridge(&candidate("ACCF23A20164", "10.0.0.5"), false)
            .unwrap();
        let mut events = bridge.subscribe();

        manager.poll_once().await;
        manager.poll_once().await;
        assert!(bridge.is_online());

        manager.poll_once().await;
        assert!(!bridge.is_online());
        assert_eq!(events.try_recv().unwrap().kind, BridgeEventKind::Offline);

        // Reappearing on a new address migrates the IP and goes online.
        manager.poll_once().await;
        assert!(bridge.is_online());
        assert!(bridge.is_available());
        assert_eq!(bridge.ip(), "10.0.0.9");
        assert_eq!(
            events.try_recv().unwrap().kind,
            BridgeEventKind::IpChanged("10.0.0.9".to_string())
        );
        assert_eq!(events.try_recv().unwrap().kind, BridgeEventKind::Online);
    }

    #[tokio::test]
    async fn test_temp_bridges_promote_and_collect() {
        let discovery = ScriptedDiscovery::new(vec![vec![
            legacy("ACCF23A20164", "10.0.0.5"),
            legacy("ACCF23A20165", "10.0.0.6"),
        ]]);
        let (manager, _) = manager_with(&discovery);

        let found = manager
            .discover_bridges(DiscoverOptions {
                temp: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(found.iter().all(|bridge| bridge.is_temp()));

        // The user finishes pairing against the first bridge.
        manager
            .register_bridge(&candidate("ACCF23A20164", "10.0.0.5"), false)
            .unwrap();

        manager.deregister_temp_bridges();

        let remaining = manager.get_registered_bridges();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].mac(), "ACCF23A20164");
        assert!(!remaining[0].is_temp());
    }

    #[tokio::test]
    async fn test_destroyed_bridge_leaves_registry() {
        let discovery = ScriptedDiscovery::new(Vec::new());
        let (manager, _) = manager_with(&discovery);

        let bridge = manager
            .register_bridge(&candidate("ACCF23A20164", "10.0.0.5"), false)
            .unwrap();

        let identity = crate::adapter::DeviceIdentity {
            bridge_mac: Some("ACCF23A20164".to_string()),
            zone_number: Some(1),
            driver_type: Some(ZoneType::Rgbw),
        };
        bridge.register_device(&identity).unwrap();
        bridge.deregister_device(&identity).unwrap();

        assert!(bridge.is_destroyed());
        assert!(manager.get_registered_bridges().is_empty());
    }

    #[tokio::test]
    async fn test_manager_destroy_tears_down() {
        let discovery = ScriptedDiscovery::new(Vec::new());
        let (manager, _) = manager_with(&discovery);

        let bridge = manager
            .register_bridge(&candidate("ACCF23A20164", "10.0.0.5"), false)
            .unwrap();

        manager.destroy();
        assert!(bridge.is_destroyed());
        assert!(manager.get_registered_bridges().is_empty());
    }
}
