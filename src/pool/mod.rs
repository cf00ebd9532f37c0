//! Lazy device pool
//!
//! Port -> device registry with on-demand creation, idle reaping and
//! hot/warm/cold access tiering. Lookups are O(1) through a concurrent
//! map; creation is idempotent under racing callers for the same port
//! (the loser adopts the winner's device). Device deaths notify the pool,
//! which drops the registry entry so the next request recreates
//! transparently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{
    DeviceType, ErrorInjectionConfig, PortRange, SimulatorConfig,
};
use crate::device::actor::{DeviceActor, DeviceActorConfig, DeviceEvent, DeviceHandle};
use crate::device::HandlerLimits;
use crate::profile::ProfileStore;
use crate::{Error, Result};

/// Sanity cap on the total number of assignable ports.
const MAX_ASSIGNABLE_PORTS: usize = 100_000;

/// One validated port range owned by a device group.
#[derive(Debug, Clone)]
pub struct PortAssignment {
    pub range: PortRange,
    pub device_type: DeviceType,
    pub community: String,
    pub error_injection: Option<ErrorInjectionConfig>,
}

/// Access tier; colder devices are preferred eviction targets. Purely an
/// optimization: SNMP behavior is identical across tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub active_devices: usize,
    pub max_devices: usize,
    pub created_total: u64,
    pub reaped_total: u64,
    pub failed_total: u64,
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
}

#[derive(Debug, Clone)]
pub enum PoolEvent {
    DeviceSpawned { port: u16, device_type: DeviceType },
    DeviceReaped { port: u16 },
    DeviceStopped { port: u16 },
    CapacityReached { limit: usize },
}

struct RegisteredDevice {
    handle: DeviceHandle,
    join: JoinHandle<()>,
}

pub struct DevicePool {
    config: Arc<SimulatorConfig>,
    profiles: Arc<ProfileStore>,
    assignments: RwLock<Vec<PortAssignment>>,
    registry: DashMap<u16, RegisteredDevice>,
    tiers: DashMap<u16, Tier>,
    created: AtomicU64,
    reaped: AtomicU64,
    failed: AtomicU64,
    device_events_tx: mpsc::UnboundedSender<DeviceEvent>,
    device_events_rx: Mutex<Option<mpsc::UnboundedReceiver<DeviceEvent>>>,
    event_tx: mpsc::UnboundedSender<PoolEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<PoolEvent>>>,
    cancel: CancellationToken,
}

impl DevicePool {
    pub fn new(config: Arc<SimulatorConfig>, profiles: Arc<ProfileStore>) -> Result<Arc<Self>> {
        let (device_events_tx, device_events_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let pool = Arc::new(Self {
            profiles,
            assignments: RwLock::new(Vec::new()),
            registry: DashMap::new(),
            tiers: DashMap::new(),
            created: AtomicU64::new(0),
            reaped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            device_events_tx,
            device_events_rx: Mutex::new(Some(device_events_rx)),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            cancel: CancellationToken::new(),
            config: config.clone(),
        });

        let assignments = config
            .device_groups
            .iter()
            .map(|group| PortAssignment {
                range: group.port_range,
                device_type: group.device_type,
                community: group.community.clone(),
                error_injection: group.error_injection,
            })
            .collect();
        pool.configure_port_assignments(assignments)?;
        Ok(pool)
    }

    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<PoolEvent>> {
        self.event_rx.lock().take()
    }

    /// Install a validated port assignment map.
    pub fn configure_port_assignments(&self, assignments: Vec<PortAssignment>) -> Result<()> {
        if assignments.is_empty() {
            return Err(Error::NoDeviceTypes);
        }
        let mut total = 0usize;
        for assignment in &assignments {
            if assignment.range.end < assignment.range.start {
                return Err(Error::InvalidRange {
                    start: assignment.range.start,
                    end: assignment.range.end,
                });
            }
            total += assignment.range.size();
        }
        if total > MAX_ASSIGNABLE_PORTS {
            return Err(Error::TooManyDevices {
                requested: total,
                limit: MAX_ASSIGNABLE_PORTS,
            });
        }
        for (i, a) in assignments.iter().enumerate() {
            for b in assignments.iter().skip(i + 1) {
                if a.range.overlaps(&b.range) {
                    return Err(Error::OverlappingRanges {
                        first: format!("{} ({})", a.device_type, a.range),
                        second: format!("{} ({})", b.device_type, b.range),
                    });
                }
            }
        }

        *self.assignments.write() = assignments;
        Ok(())
    }

    /// Resolve which device family owns a port.
    pub fn determine_device_type(&self, port: u16) -> Result<DeviceType> {
        self.assignment_for(port).map(|a| a.device_type)
    }

    fn assignment_for(&self, port: u16) -> Result<PortAssignment> {
        self.assignments
            .read()
            .iter()
            .find(|a| a.range.contains(port))
            .cloned()
            .ok_or(Error::UnknownPortRange { port })
    }

    /// Fetch the device on `port`, creating it lazily.
    pub async fn get_or_create_device(self: &Arc<Self>, port: u16) -> Result<DeviceHandle> {
        if let Some(existing) = self.live_handle(port) {
            existing.touch();
            return Ok(existing);
        }

        if self.registry.len() >= self.config.global.max_devices {
            let limit = self.config.global.max_devices;
            let _ = self.event_tx.send(PoolEvent::CapacityReached { limit });
            return Err(Error::MaxDevicesReached { limit });
        }

        let assignment = self.assignment_for(port)?;
        let actor_config = self.actor_config(port, &assignment);

        match DeviceActor::spawn(
            actor_config,
            Arc::clone(&self.profiles),
            self.device_events_tx.clone(),
        )
        .await
        {
            Ok((handle, join)) => {
                match self.registry.entry(port) {
                    Entry::Occupied(existing) if existing.get().handle.is_alive() => {
                        // Lost a creation race: keep the winner, fold ours.
                        handle.force_abort();
                        let winner = existing.get().handle.clone();
                        winner.touch();
                        return Ok(winner);
                    }
                    Entry::Occupied(mut existing) => {
                        existing.insert(RegisteredDevice {
                            handle: handle.clone(),
                            join,
                        });
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(RegisteredDevice {
                            handle: handle.clone(),
                            join,
                        });
                    }
                }
                self.created.fetch_add(1, Ordering::Relaxed);
                self.tiers.insert(port, Tier::Hot);
                let _ = self.event_tx.send(PoolEvent::DeviceSpawned {
                    port,
                    device_type: assignment.device_type,
                });
                Ok(handle)
            }
            Err(Error::AddrInUse { .. }) => {
                // Either a racing creator holds the socket or something
                // external does. Give the racer a moment to register.
                for _ in 0..50 {
                    if let Some(existing) = self.live_handle(port) {
                        existing.touch();
                        return Ok(existing);
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(Error::AddrInUse { port })
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn live_handle(&self, port: u16) -> Option<DeviceHandle> {
        if let Some(entry) = self.registry.get(&port) {
            if entry.handle.is_alive() {
                return Some(entry.handle.clone());
            }
        }
        // Evict a dead entry so the caller can fall through to creation.
        self.registry.remove_if(&port, |_, d| !d.handle.is_alive());
        None
    }

    fn actor_config(&self, port: u16, assignment: &PortAssignment) -> DeviceActorConfig {
        let config = &self.config;
        DeviceActorConfig {
            host: config.global.host.clone(),
            port,
            device_type: assignment.device_type,
            community: assignment.community.clone(),
            seed: config.global.seed,
            inbox_capacity: config.udp.inbox_capacity,
            drop_delay_threshold: Duration::from_millis(config.udp.drop_delay_threshold_ms),
            limits: HandlerLimits {
                max_response_bytes: config.udp.max_response_bytes,
                max_filename_length: config.upgrade.max_filename_length,
            },
            jitter: config.jitter.clone(),
            upgrade: config.upgrade.clone(),
            initial_injection: assignment.error_injection,
        }
    }

    /// Start the background jobs: death watcher, idle reaper, tier scan.
    pub fn start(self: &Arc<Self>) {
        let Some(mut deaths) = self.device_events_rx.lock().take() else {
            warn!("pool background jobs already started");
            return;
        };
        let pool = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = deaths.recv() => match event {
                        Some(DeviceEvent::Stopped { port }) => pool.on_device_stopped(port),
                        None => break,
                    },
                }
            }
        });

        let pool = Arc::clone(self);
        let cancel = self.cancel.clone();
        let reap_interval = self.config.pool.reap_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reap_interval);
            ticker.tick().await; // immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => pool.reap_idle_devices().await,
                }
            }
        });

        if self.config.pool.tiering_enabled {
            let pool = Arc::clone(self);
            let cancel = self.cancel.clone();
            let scan_interval = self.config.pool.tier_scan_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(scan_interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => pool.rescan_tiers(),
                    }
                }
            });
        }
    }

    fn on_device_stopped(&self, port: u16) {
        let removed = self.registry.remove_if(&port, |_, d| !d.handle.is_alive());
        self.tiers.remove(&port);
        if removed.is_some() {
            debug!(port, "removed stopped device from registry");
            let _ = self.event_tx.send(PoolEvent::DeviceStopped { port });
        }
    }

    /// One reaper pass: evict devices idle beyond the timeout, coldest
    /// first.
    pub async fn reap_idle_devices(self: &Arc<Self>) {
        let idle_timeout = self.config.pool.idle_timeout();
        let mut idle_ports: Vec<(u16, Duration, Tier)> = self
            .registry
            .iter()
            .filter_map(|entry| {
                let idle = entry.handle.idle_for();
                if idle > idle_timeout {
                    let tier = self
                        .tiers
                        .get(&entry.handle.port)
                        .map(|t| *t)
                        .unwrap_or(Tier::Cold);
                    Some((entry.handle.port, idle, tier))
                } else {
                    None
                }
            })
            .collect();

        // Cold devices go first, then by idleness.
        idle_ports.sort_by_key(|(_, idle, tier)| {
            (
                match tier {
                    Tier::Cold => 0u8,
                    Tier::Warm => 1,
                    Tier::Hot => 2,
                },
                std::cmp::Reverse(*idle),
            )
        });

        for (port, idle, _) in idle_ports {
            info!(port, idle_secs = idle.as_secs(), "reaping idle device");
            self.shutdown_device(port).await;
            self.reaped.fetch_add(1, Ordering::Relaxed);
            let _ = self.event_tx.send(PoolEvent::DeviceReaped { port });
        }
    }

    fn rescan_tiers(&self) {
        for entry in self.registry.iter() {
            let idle = entry.handle.idle_for();
            let tier = if idle < Duration::from_secs(60) {
                Tier::Hot
            } else if idle < Duration::from_secs(600) {
                Tier::Warm
            } else {
                Tier::Cold
            };
            self.tiers.insert(entry.handle.port, tier);
        }
    }

    /// Stop one device, force-killing past the configured grace period.
    pub async fn shutdown_device(&self, port: u16) {
        let Some((_, device)) = self.registry.remove(&port) else {
            return;
        };
        self.tiers.remove(&port);
        device.handle.stop().await;
        let stop_timeout = self.config.pool.stop_timeout();
        match tokio::time::timeout(stop_timeout, device.join).await {
            Ok(_) => {}
            Err(_) => {
                warn!(port, "device did not stop in time, aborting");
                device.handle.force_abort();
            }
        }
    }

    pub async fn shutdown_all_devices(&self) {
        let ports: Vec<u16> = self.registry.iter().map(|e| e.handle.port).collect();
        for port in ports {
            self.shutdown_device(port).await;
        }
        self.cancel.cancel();
    }

    pub fn get_device(&self, port: u16) -> Option<DeviceHandle> {
        self.registry
            .get(&port)
            .filter(|e| e.handle.is_alive())
            .map(|e| e.handle.clone())
    }

    pub fn active_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .registry
            .iter()
            .filter(|e| e.handle.is_alive())
            .map(|e| e.handle.port)
            .collect();
        ports.sort_unstable();
        ports
    }

    pub fn get_stats(&self) -> PoolStats {
        let (mut hot, mut warm, mut cold) = (0, 0, 0);
        for tier in self.tiers.iter() {
            match *tier {
                Tier::Hot => hot += 1,
                Tier::Warm => warm += 1,
                Tier::Cold => cold += 1,
            }
        }
        PoolStats {
            active_devices: self.registry.len(),
            max_devices: self.config.global.max_devices,
            created_total: self.created.load(Ordering::Relaxed),
            reaped_total: self.reaped.load(Ordering::Relaxed),
            failed_total: self.failed.load(Ordering::Relaxed),
            hot,
            warm,
            cold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceGroupConfig, PortRange};

    fn test_config(start: u16, end: u16) -> Arc<SimulatorConfig> {
        let mut config = SimulatorConfig::default_config();
        config.global.host = "127.0.0.1".to_string();
        config.global.max_devices = 16;
        config.device_groups = vec![DeviceGroupConfig {
            name: "test-cms".to_string(),
            device_type: DeviceType::CableModem,
            count: (end - start + 1) as usize,
            port_range: PortRange::new(start, end),
            community: "public".to_string(),
            walk_file: None,
            behaviors: vec![],
            error_injection: None,
        }];
        Arc::new(config)
    }

    fn pool(start: u16, end: u16) -> Arc<DevicePool> {
        DevicePool::new(test_config(start, end), Arc::new(ProfileStore::new())).unwrap()
    }

    #[test]
    fn test_default_map_resolves_uniquely() {
        let config = Arc::new(SimulatorConfig::default_config());
        let pool = DevicePool::new(config, Arc::new(ProfileStore::new())).unwrap();

        let expectations = [
            (30000u16, DeviceType::CableModem),
            (37999, DeviceType::CableModem),
            (38000, DeviceType::Mta),
            (38500, DeviceType::Server),
            (39000, DeviceType::Router),
            (39500, DeviceType::Switch),
            (39950, DeviceType::Cmts),
        ];
        for (port, expected) in expectations {
            assert_eq!(pool.determine_device_type(port).unwrap(), expected);
        }

        // The gap between switches and CMTS stays unassigned.
        assert!(matches!(
            pool.determine_device_type(39900),
            Err(Error::UnknownPortRange { port: 39900 })
        ));
        assert!(matches!(
            pool.determine_device_type(29999),
            Err(Error::UnknownPortRange { .. })
        ));
    }

    #[test]
    fn test_assignment_validation() {
        let pool = pool(41000, 41010);

        assert!(matches!(
            pool.configure_port_assignments(vec![]),
            Err(Error::NoDeviceTypes)
        ));

        let assignment = |start, end| PortAssignment {
            range: PortRange::new(start, end),
            device_type: DeviceType::Switch,
            community: "public".to_string(),
            error_injection: None,
        };
        assert!(matches!(
            pool.configure_port_assignments(vec![assignment(41010, 41000)]),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            pool.configure_port_assignments(vec![assignment(41000, 41005), assignment(41005, 41010)]),
            Err(Error::OverlappingRanges { .. })
        ));
        assert!(pool
            .configure_port_assignments(vec![assignment(41000, 41005), assignment(41006, 41010)])
            .is_ok());
    }

    #[test]
    fn test_full_port_space_is_under_the_cap() {
        // The assignable-total sanity cap sits above the whole u16 port
        // space, so even a wall-to-wall assignment validates.
        let pool = pool(41020, 41030);
        let all_ports = vec![PortAssignment {
            range: PortRange::new(1, 65535),
            device_type: DeviceType::CableModem,
            community: "public".to_string(),
            error_injection: None,
        }];
        assert!(pool.configure_port_assignments(all_ports).is_ok());
    }

    #[tokio::test]
    async fn test_lazy_create_and_idempotent_lookup() {
        let pool = pool(41100, 41105);

        let first = pool.get_or_create_device(41100).await.unwrap();
        let second = pool.get_or_create_device(41100).await.unwrap();
        assert!(first.same_device(&second));
        assert_eq!(pool.get_stats().created_total, 1);
        assert_eq!(pool.get_stats().active_devices, 1);

        pool.shutdown_all_devices().await;
    }

    #[tokio::test]
    async fn test_unknown_port_and_capacity() {
        let pool = pool(41110, 41112);

        assert!(matches!(
            pool.get_or_create_device(50000).await,
            Err(Error::UnknownPortRange { port: 50000 })
        ));

        let mut config = test_config(41110, 41112);
        Arc::get_mut(&mut config).unwrap().global.max_devices = 1;
        let pool = DevicePool::new(config, Arc::new(ProfileStore::new())).unwrap();
        pool.get_or_create_device(41110).await.unwrap();
        assert!(matches!(
            pool.get_or_create_device(41111).await,
            Err(Error::MaxDevicesReached { limit: 1 })
        ));

        pool.shutdown_all_devices().await;
    }

    #[tokio::test]
    async fn test_concurrent_creation_single_actor() {
        let pool = pool(41120, 41125);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(
                async move { pool.get_or_create_device(41121).await },
            ));
        }
        let handles: Vec<DeviceHandle> = futures_join(tasks).await;
        for pair in handles.windows(2) {
            assert!(pair[0].same_device(&pair[1]));
        }
        assert_eq!(pool.get_stats().created_total, 1);
        assert_eq!(pool.get_stats().active_devices, 1);

        pool.shutdown_all_devices().await;
    }

    async fn futures_join(
        tasks: Vec<tokio::task::JoinHandle<Result<DeviceHandle>>>,
    ) -> Vec<DeviceHandle> {
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }
        handles
    }

    #[tokio::test]
    async fn test_reap_and_recreate() {
        let mut config = test_config(41130, 41135);
        Arc::get_mut(&mut config).unwrap().pool.idle_timeout_secs = 0;
        let pool = DevicePool::new(config, Arc::new(ProfileStore::new())).unwrap();

        let first = pool.get_or_create_device(41130).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.reap_idle_devices().await;
        assert_eq!(pool.get_stats().active_devices, 0);
        assert_eq!(pool.get_stats().reaped_total, 1);
        assert!(!first.is_alive());

        // The next access recreates transparently.
        let second = pool.get_or_create_device(41130).await.unwrap();
        assert!(!first.same_device(&second));
        assert!(second.is_alive());

        pool.shutdown_all_devices().await;
    }

    #[tokio::test]
    async fn test_dead_device_evicted_on_lookup() {
        let pool = pool(41140, 41145);
        let handle = pool.get_or_create_device(41140).await.unwrap();

        // Kill the actor out-of-band; the registry entry is now stale.
        handle.force_abort();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let replacement = pool.get_or_create_device(41140).await.unwrap();
        assert!(replacement.is_alive());
        assert!(!handle.same_device(&replacement));

        pool.shutdown_all_devices().await;
    }
}
