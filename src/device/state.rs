//! Mutable per-device state
//!
//! Everything here is owned by the device's actor task and never touched
//! from outside it; external callers see read-only snapshots.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::DeviceType;
use crate::sim::correlation::{self, Correlation, Metric};
use crate::snmp::Oid;

use super::upgrade::UpgradeState;

/// Accumulated counter value and the uptime it was last advanced at.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterProgress {
    pub last_uptime_secs: f64,
    pub accumulated: f64,
    pub wraps: u64,
}

/// Wire/listener counters, mutated only on the actor task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListenerStats {
    pub packets_received: u64,
    pub decode_errors: u64,
    pub auth_failures: u64,
    pub error_responses: u64,
    pub responses_sent: u64,
    pub queue_drops: u64,
    pub dropped_by_injection: u64,
    pub processing_micros_total: u64,
}

impl ListenerStats {
    pub fn record_processing(&mut self, elapsed: Duration) {
        self.processing_micros_total += elapsed.as_micros() as u64;
    }
}

/// Read-only snapshot returned by the `get_info` control call.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub port: u16,
    pub device_type: DeviceType,
    pub community: String,
    pub mac_address: String,
    pub uptime_secs: u64,
    pub has_walk_data: bool,
    pub stats: ListenerStats,
}

#[derive(Debug)]
pub struct DeviceState {
    pub device_id: String,
    pub port: u16,
    pub device_type: DeviceType,
    pub community: String,
    pub mac_address: [u8; 6],
    uptime_start: Instant,
    pub last_access: Instant,
    pub has_walk_data: bool,
    /// Operator-forced counter values, keyed by OID.
    pub counters: HashMap<Oid, u64>,
    /// Operator-forced gauge values, keyed by OID.
    pub gauges: HashMap<Oid, f64>,
    pub status_vars: HashMap<String, i64>,
    /// Logical metrics shared with the correlation engine.
    pub metrics: HashMap<Metric, f64>,
    /// Smoothing memory for counter rates.
    pub previous_rate: HashMap<Oid, f64>,
    /// Monotone accumulation per counter OID, so rate changes never move a
    /// counter backwards between wraps.
    pub counter_progress: HashMap<Oid, CounterProgress>,
    pub correlations: &'static [Correlation],
    pub upgrade: UpgradeState,
    pub stats: ListenerStats,
    pub rng: StdRng,
}

impl DeviceState {
    pub fn new(port: u16, device_type: DeviceType, community: String, seed: u64) -> Self {
        let device_id = format!("{device_type}-{port}");
        let mut hasher = DefaultHasher::new();
        device_id.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(seed ^ hasher.finish());

        let mut mac_address = [0u8; 6];
        mac_address[0] = 0x02; // locally administered
        rng.fill(&mut mac_address[1..]);

        let now = Instant::now();
        let mut state = Self {
            device_id,
            port,
            device_type,
            community,
            mac_address,
            uptime_start: now,
            last_access: now,
            has_walk_data: false,
            counters: HashMap::new(),
            gauges: HashMap::new(),
            status_vars: HashMap::new(),
            metrics: HashMap::new(),
            previous_rate: HashMap::new(),
            counter_progress: HashMap::new(),
            correlations: correlation::defaults_for(device_type),
            upgrade: UpgradeState::default(),
            stats: ListenerStats::default(),
            rng,
        };
        state.initialize_defaults();
        state
    }

    fn initialize_defaults(&mut self) {
        self.status_vars.insert("admin_status".to_string(), 1);
        self.status_vars.insert("oper_status".to_string(), 1);
        self.status_vars.insert("last_change".to_string(), 0);
        for metric in [
            Metric::ErrorRate,
            Metric::CpuUsage,
            Metric::InterfaceUtilization,
            Metric::SignalQuality,
            Metric::Temperature,
            Metric::PowerConsumption,
            Metric::Throughput,
        ] {
            self.metrics.insert(metric, metric.default_value());
        }
    }

    pub fn uptime(&self) -> Duration {
        self.uptime_start.elapsed()
    }

    pub fn uptime_ticks(&self) -> u32 {
        ((self.uptime().as_secs() * 100) & 0xffff_ffff) as u32
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        self.metrics
            .get(&metric)
            .copied()
            .unwrap_or_else(|| metric.default_value())
    }

    pub fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access.elapsed()
    }

    /// Reboot semantics: counters, gauges, status variables and smoothing
    /// memory reset; uptime restarts; wire statistics survive.
    pub fn reboot(&mut self) {
        self.counters.clear();
        self.gauges.clear();
        self.status_vars.clear();
        self.previous_rate.clear();
        self.counter_progress.clear();
        self.metrics.clear();
        self.upgrade = UpgradeState::default();
        self.uptime_start = Instant::now();
        self.initialize_defaults();
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            port: self.port,
            device_type: self.device_type,
            community: self.community.clone(),
            mac_address: self
                .mac_address
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":"),
            uptime_secs: self.uptime().as_secs(),
            has_walk_data: self.has_walk_data,
            stats: self.stats.clone(),
        }
    }

    #[cfg(test)]
    pub fn force_uptime(&mut self, uptime: Duration) {
        if let Some(start) = Instant::now().checked_sub(uptime) {
            self.uptime_start = start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_state_is_reproducible() {
        let a = DeviceState::new(30001, DeviceType::CableModem, "public".into(), 42);
        let b = DeviceState::new(30001, DeviceType::CableModem, "public".into(), 42);
        assert_eq!(a.mac_address, b.mac_address);
        assert_eq!(a.device_id, "cable_modem-30001");

        let c = DeviceState::new(30002, DeviceType::CableModem, "public".into(), 42);
        assert_ne!(a.mac_address, c.mac_address);
    }

    #[test]
    fn test_uptime_ticks_follow_forced_uptime() {
        let mut state = DeviceState::new(30001, DeviceType::CableModem, "public".into(), 1);
        state.force_uptime(Duration::from_secs(120));
        let ticks = state.uptime_ticks();
        assert!((12_000..12_200).contains(&ticks), "ticks {ticks}");
    }

    #[test]
    fn test_reboot_resets_state() {
        let mut state = DeviceState::new(39500, DeviceType::Switch, "public".into(), 7);
        state.force_uptime(Duration::from_secs(3600));
        state
            .counters
            .insert("1.3.6.1.2.1.2.2.1.10.1".parse().unwrap(), 123);
        state.status_vars.insert("oper_status".to_string(), 2);
        state.stats.packets_received = 9;

        state.reboot();

        assert!(state.counters.is_empty());
        assert_eq!(state.status_vars["oper_status"], 1);
        assert!(state.uptime() < Duration::from_secs(5));
        // Wire statistics are not part of the simulated device.
        assert_eq!(state.stats.packets_received, 9);
    }
}
