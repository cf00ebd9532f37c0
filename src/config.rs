//! Configuration management for the SNMP Swarm simulator

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The device families the simulator can impersonate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "cable_modem")]
    CableModem,
    #[serde(rename = "mta")]
    Mta,
    #[serde(rename = "switch")]
    Switch,
    #[serde(rename = "router")]
    Router,
    #[serde(rename = "cmts")]
    Cmts,
    #[serde(rename = "server")]
    Server,
    #[serde(rename = "generic")]
    Generic,
}

impl std::str::FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cable_modem" => Ok(DeviceType::CableModem),
            "mta" => Ok(DeviceType::Mta),
            "switch" => Ok(DeviceType::Switch),
            "router" => Ok(DeviceType::Router),
            "cmts" => Ok(DeviceType::Cmts),
            "server" => Ok(DeviceType::Server),
            "generic" => Ok(DeviceType::Generic),
            other => Err(Error::parse(format!("unknown device type {other:?}"))),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::CableModem => "cable_modem",
            DeviceType::Mta => "mta",
            DeviceType::Switch => "switch",
            DeviceType::Router => "router",
            DeviceType::Cmts => "cmts",
            DeviceType::Server => "server",
            DeviceType::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub global: GlobalConfig,
    pub device_groups: Vec<DeviceGroupConfig>,
    pub pool: PoolConfig,
    pub udp: UdpConfig,
    pub upgrade: UpgradeConfig,
    pub jitter: JitterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub max_devices: usize,
    pub max_memory_mb: usize,
    pub host: String,
    pub community: String,
    /// Seed mixed into every device RNG; identical seeds reproduce a run.
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGroupConfig {
    pub name: String,
    pub device_type: DeviceType,
    pub count: usize,
    pub port_range: PortRange,
    pub community: String,
    pub walk_file: Option<PathBuf>,
    /// Behavior tags applied on top of the analyzer defaults; unknown tags
    /// are ignored.
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub error_injection: Option<ErrorInjectionConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    pub fn size(&self) -> usize {
        (self.end as usize).saturating_sub(self.start as usize) + 1
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ErrorInjectionConfig {
    #[serde(default)]
    pub packet_loss_rate: Option<f64>,
    #[serde(default)]
    pub timeout_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Devices idle beyond this are reaped.
    pub idle_timeout_secs: u64,
    /// How often the reaper scans the registry.
    pub reap_interval_secs: u64,
    /// How often access tiers are recomputed.
    pub tier_scan_interval_secs: u64,
    pub tiering_enabled: bool,
    /// Per-device graceful-stop budget before the task is aborted.
    pub stop_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            reap_interval_secs: 300,
            tier_scan_interval_secs: 60,
            tiering_enabled: true,
            stop_timeout_secs: 5,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn tier_scan_interval(&self) -> Duration {
        Duration::from_secs(self.tier_scan_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Responses estimated above this are truncated or answered with tooBig.
    pub max_response_bytes: usize,
    /// Bounded actor inbox; datagrams past it are dropped and counted.
    pub inbox_capacity: usize,
    /// Injected delays at or above this threshold drop the response instead.
    pub drop_delay_threshold_ms: u64,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: 1400,
            inbox_capacity: 256,
            drop_delay_threshold_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Delay between the firmware trigger and oper-status `inProgress`.
    pub start_delay_ms: u64,
    /// Delay between `inProgress` and `complete`.
    pub complete_delay_ms: u64,
    pub max_filename_length: usize,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: 100,
            complete_delay_ms: 2000,
            max_filename_length: 64,
        }
    }
}

/// Jitter applied to simulated values, configurable per metric and
/// device type; the most specific override wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterConfig {
    pub default: JitterSpec,
    #[serde(default)]
    pub overrides: Vec<JitterOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterOverride {
    pub metric: String,
    pub device_type: Option<DeviceType>,
    pub spec: JitterSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum JitterSpec {
    None,
    Uniform { amplitude: f64 },
    Gaussian { sigma: f64 },
    Periodic { amplitude: f64, period_secs: f64 },
    Burst { probability: f64, magnitude: f64 },
    Correlated { factor: f64 },
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            default: JitterSpec::Uniform { amplitude: 0.02 },
            overrides: Vec::new(),
        }
    }
}

impl JitterConfig {
    pub fn spec_for(&self, metric: &str, device_type: DeviceType) -> &JitterSpec {
        let mut fallback = None;
        for over in &self.overrides {
            if over.metric != metric {
                continue;
            }
            match over.device_type {
                Some(dt) if dt == device_type => return &over.spec,
                None => fallback = Some(&over.spec),
                _ => {}
            }
        }
        fallback.unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: LogFormat,
    /// Cap device/pool module chatter at warn unless running verbose;
    /// lifecycle events still surface through the simulator event stream.
    #[serde(default = "default_quiet_device_logs")]
    pub quiet_device_logs: bool,
}

fn default_quiet_device_logs() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Compact,
            quiet_device_logs: true,
        }
    }
}

impl SimulatorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SimulatorConfig = toml::from_str(&contents)
            .map_err(|e| Error::parse(format!("Invalid TOML: {e}")))?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("SNMP_SIM_EX").separator("__"))
            .build()?;
        let config = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.global.max_devices == 0 {
            return Err(Error::invalid_config("global.max_devices", "must be > 0"));
        }
        if self.global.community.is_empty() {
            return Err(Error::invalid_config("global.community", "must not be empty"));
        }
        if self.device_groups.is_empty() {
            return Err(Error::NoDeviceTypes);
        }

        for group in &self.device_groups {
            let field = |suffix: &str| format!("device_groups.{}.{}", group.name, suffix);
            if group.port_range.end < group.port_range.start {
                return Err(Error::invalid_config(
                    field("port_range"),
                    format!("end {} < start {}", group.port_range.end, group.port_range.start),
                ));
            }
            if group.count == 0 {
                return Err(Error::invalid_config(field("count"), "must be > 0"));
            }
            if group.count > group.port_range.size() {
                return Err(Error::invalid_config(
                    field("count"),
                    format!(
                        "{} devices do not fit in {} ports",
                        group.count,
                        group.port_range.size()
                    ),
                ));
            }
            if group.community.is_empty() {
                return Err(Error::invalid_config(field("community"), "must not be empty"));
            }
            if let Some(injection) = &group.error_injection {
                for (name, rate) in [
                    ("packet_loss_rate", injection.packet_loss_rate),
                    ("timeout_rate", injection.timeout_rate),
                ] {
                    if let Some(rate) = rate {
                        if !(0.0..=1.0).contains(&rate) {
                            return Err(Error::invalid_config(
                                field(&format!("error_injection.{name}")),
                                format!("{rate} outside 0..1"),
                            ));
                        }
                    }
                }
            }
        }

        for (i, a) in self.device_groups.iter().enumerate() {
            for b in self.device_groups.iter().skip(i + 1) {
                if a.port_range.overlaps(&b.port_range) {
                    return Err(Error::OverlappingRanges {
                        first: format!("{} ({})", a.name, a.port_range),
                        second: format!("{} ({})", b.name, b.port_range),
                    });
                }
            }
        }

        Ok(())
    }

    /// The stock configuration: the default port-range map with no walk
    /// files attached. Groups without a walk file answer from the built-in
    /// baseline profile of their device type.
    pub fn default_config() -> Self {
        let group = |name: &str, device_type, start, end, count| DeviceGroupConfig {
            name: name.to_string(),
            device_type,
            count,
            port_range: PortRange::new(start, end),
            community: "public".to_string(),
            walk_file: None,
            behaviors: Vec::new(),
            error_injection: None,
        };

        Self {
            global: GlobalConfig {
                max_devices: 10_000,
                max_memory_mb: 4096,
                host: "0.0.0.0".to_string(),
                community: "public".to_string(),
                seed: 0,
            },
            device_groups: vec![
                group("cable-modems", DeviceType::CableModem, 30000, 37999, 8000),
                group("mtas", DeviceType::Mta, 38000, 38499, 500),
                group("servers", DeviceType::Server, 38500, 38999, 500),
                group("routers", DeviceType::Router, 39000, 39499, 500),
                group("switches", DeviceType::Switch, 39500, 39899, 400),
                group("cmts", DeviceType::Cmts, 39950, 39999, 50),
            ],
            pool: PoolConfig::default(),
            udp: UdpConfig::default(),
            upgrade: UpgradeConfig::default(),
            jitter: JitterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
