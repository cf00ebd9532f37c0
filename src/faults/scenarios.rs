//! Named fault scenarios
//!
//! Scenarios are orchestration over the per-device injectors: each one
//! translates into a set of condition installs, possibly staggered over
//! time, across the targeted devices. Nothing here adds behavior the
//! injector does not already have.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::device::DeviceHandle;
use crate::faults::injector::{
    DeviceFailureConfig, ErrorConditionConfig, FailureType, MalformedConfig, PacketLossConfig,
    RecoveryBehavior, SnmpErrorConfig, TimeoutConfig,
};
use crate::pool::DevicePool;
use crate::snmp::ErrorStatus;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutageMode {
    Immediate,
    Gradual,
    Sporadic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationMode {
    Steady,
    Fluctuating,
    Progressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    Steady,
    Bursty,
    Cascade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlappingPattern {
    Regular,
    Irregular,
    Degrading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentalKind {
    Weather,
    Power,
    Temperature,
    Interference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    fn factor(&self) -> f64 {
        match self {
            Severity::Mild => 0.3,
            Severity::Moderate => 0.6,
            Severity::Severe => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "snake_case")]
pub enum Scenario {
    NetworkOutage {
        mode: OutageMode,
        duration_ms: u64,
    },
    SignalDegradation {
        mode: DegradationMode,
        duration_ms: u64,
    },
    HighLoad {
        mode: LoadMode,
        duration_ms: u64,
    },
    DeviceFlapping {
        pattern: FlappingPattern,
        duration_ms: u64,
    },
    CascadingFailure {
        growth_factor: f64,
        max_share: f64,
        duration_ms: u64,
    },
    Environmental {
        kind: EnvironmentalKind,
        severity: Severity,
        duration_ms: u64,
    },
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::NetworkOutage { .. } => "network_outage",
            Scenario::SignalDegradation { .. } => "signal_degradation",
            Scenario::HighLoad { .. } => "high_load",
            Scenario::DeviceFlapping { .. } => "device_flapping",
            Scenario::CascadingFailure { .. } => "cascading_failure",
            Scenario::Environmental { .. } => "environmental",
        }
    }
}

/// What a launched scenario reports back.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioDescriptor {
    pub scenario_id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub devices_affected: usize,
    pub conditions_applied: usize,
    pub estimated_duration_ms: u64,
}

pub struct ScenarioRunner {
    pool: Arc<DevicePool>,
}

impl ScenarioRunner {
    pub fn new(pool: Arc<DevicePool>) -> Self {
        Self { pool }
    }

    /// Launch a scenario against the given ports. Devices are created on
    /// demand; ports outside any assignment are skipped with a warning.
    pub async fn run(&self, scenario: Scenario, ports: &[u16]) -> Result<ScenarioDescriptor> {
        let mut devices = Vec::new();
        for port in ports {
            match self.pool.get_or_create_device(*port).await {
                Ok(handle) => devices.push(handle),
                Err(e) => warn!(port = *port, error = %e, "scenario skips unreachable device"),
            }
        }

        let descriptor = ScenarioDescriptor {
            scenario_id: Uuid::new_v4(),
            name: scenario.name().to_string(),
            start_time: Utc::now(),
            devices_affected: devices.len(),
            conditions_applied: 0,
            estimated_duration_ms: 0,
        };

        let (applied, duration) = match &scenario {
            Scenario::NetworkOutage { mode, duration_ms } => {
                self.network_outage(&devices, *mode, *duration_ms).await
            }
            Scenario::SignalDegradation { mode, duration_ms } => {
                self.signal_degradation(&devices, *mode, *duration_ms).await
            }
            Scenario::HighLoad { mode, duration_ms } => {
                self.high_load(&devices, *mode, *duration_ms).await
            }
            Scenario::DeviceFlapping {
                pattern,
                duration_ms,
            } => self.device_flapping(&devices, *pattern, *duration_ms).await,
            Scenario::CascadingFailure {
                growth_factor,
                max_share,
                duration_ms,
            } => {
                self.cascading_failure(&devices, *growth_factor, *max_share, *duration_ms)
                    .await
            }
            Scenario::Environmental {
                kind,
                severity,
                duration_ms,
            } => {
                self.environmental(&devices, *kind, *severity, *duration_ms)
                    .await
            }
        };

        info!(
            scenario = descriptor.name,
            id = %descriptor.scenario_id,
            devices = descriptor.devices_affected,
            conditions = applied,
            "scenario launched"
        );

        Ok(ScenarioDescriptor {
            conditions_applied: applied,
            estimated_duration_ms: duration,
            ..descriptor
        })
    }

    async fn install_all(
        &self,
        devices: &[DeviceHandle],
        config: ErrorConditionConfig,
    ) -> usize {
        let mut applied = 0;
        for device in devices {
            if device.install_error_condition(config.clone()).await.is_ok() {
                applied += 1;
            }
        }
        applied
    }

    /// Install on each device after a per-device delay, detached.
    fn install_staggered(
        &self,
        devices: &[DeviceHandle],
        config: ErrorConditionConfig,
        step: Duration,
    ) -> usize {
        for (i, device) in devices.iter().enumerate() {
            let device = device.clone();
            let config = config.clone();
            let delay = step * i as u32;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = device.install_error_condition(config).await;
            });
        }
        devices.len()
    }

    async fn network_outage(
        &self,
        devices: &[DeviceHandle],
        mode: OutageMode,
        duration_ms: u64,
    ) -> (usize, u64) {
        let disconnect = ErrorConditionConfig::DeviceFailure(DeviceFailureConfig {
            failure_type: FailureType::NetworkDisconnect,
            duration_ms,
            recovery_behavior: RecoveryBehavior::Normal,
            failure_probability: 1.0,
        });
        match mode {
            OutageMode::Immediate => (self.install_all(devices, disconnect).await, duration_ms),
            OutageMode::Gradual => {
                let step = Duration::from_millis((duration_ms / 10).max(100));
                let applied = self.install_staggered(devices, disconnect, step);
                (applied, duration_ms + step.as_millis() as u64 * devices.len() as u64)
            }
            OutageMode::Sporadic => {
                let loss = ErrorConditionConfig::PacketLoss(PacketLossConfig {
                    loss_rate: 0.4,
                    burst_loss: true,
                    burst_size: 20,
                    recovery_time_ms: (duration_ms / 5).max(200),
                    target_oids: vec![],
                });
                (self.install_all(devices, loss).await, duration_ms)
            }
        }
    }

    async fn signal_degradation(
        &self,
        devices: &[DeviceHandle],
        mode: DegradationMode,
        duration_ms: u64,
    ) -> (usize, u64) {
        let loss_rate = match mode {
            DegradationMode::Steady => 0.15,
            DegradationMode::Fluctuating => 0.25,
            DegradationMode::Progressive => 0.1,
        };
        let loss = ErrorConditionConfig::PacketLoss(PacketLossConfig {
            loss_rate,
            burst_loss: mode == DegradationMode::Fluctuating,
            burst_size: 10,
            recovery_time_ms: 1000,
            target_oids: vec![],
        });
        let mut applied = self.install_all(devices, loss).await;

        if mode == DegradationMode::Progressive {
            // Escalate in a second wave halfway through.
            let heavier = ErrorConditionConfig::PacketLoss(PacketLossConfig {
                loss_rate: 0.5,
                burst_loss: false,
                burst_size: 0,
                recovery_time_ms: 0,
                target_oids: vec![],
            });
            applied += self.install_staggered(
                devices,
                heavier,
                Duration::from_millis((duration_ms / 2).max(100)),
            );
        }
        (applied, duration_ms)
    }

    async fn high_load(
        &self,
        devices: &[DeviceHandle],
        mode: LoadMode,
        duration_ms: u64,
    ) -> (usize, u64) {
        let overload = ErrorConditionConfig::DeviceFailure(DeviceFailureConfig {
            failure_type: FailureType::Overload,
            duration_ms,
            recovery_behavior: RecoveryBehavior::Normal,
            failure_probability: 1.0,
        });
        let slow_responses = ErrorConditionConfig::Timeout(TimeoutConfig {
            probability: match mode {
                LoadMode::Steady => 0.3,
                LoadMode::Bursty => 0.1,
                LoadMode::Cascade => 0.2,
            },
            duration_ms: 400,
            burst_probability: if mode == LoadMode::Bursty { 0.5 } else { 0.0 },
            burst_duration_ms: if mode == LoadMode::Bursty { 2000 } else { 0 },
            target_oids: vec![],
        });

        match mode {
            LoadMode::Cascade => {
                let step = Duration::from_millis((duration_ms / devices.len().max(1) as u64).max(50));
                let mut applied = self.install_staggered(devices, overload, step);
                applied += self.install_all(devices, slow_responses).await;
                (applied, duration_ms)
            }
            _ => {
                let mut applied = self.install_all(devices, overload).await;
                applied += self.install_all(devices, slow_responses).await;
                (applied, duration_ms)
            }
        }
    }

    async fn device_flapping(
        &self,
        devices: &[DeviceHandle],
        pattern: FlappingPattern,
        duration_ms: u64,
    ) -> (usize, u64) {
        let flap_length = match pattern {
            FlappingPattern::Regular => duration_ms / 4,
            FlappingPattern::Irregular => duration_ms / 3,
            FlappingPattern::Degrading => duration_ms / 2,
        }
        .max(200);

        let reboot = ErrorConditionConfig::DeviceFailure(DeviceFailureConfig {
            failure_type: FailureType::Reboot,
            duration_ms: flap_length,
            recovery_behavior: match pattern {
                FlappingPattern::Degrading => RecoveryBehavior::Gradual,
                _ => RecoveryBehavior::Normal,
            },
            failure_probability: 1.0,
        });

        let applied = match pattern {
            FlappingPattern::Regular => self.install_all(devices, reboot).await,
            FlappingPattern::Irregular | FlappingPattern::Degrading => self.install_staggered(
                devices,
                reboot,
                Duration::from_millis((flap_length / 2).max(100)),
            ),
        };
        (applied, duration_ms)
    }

    async fn cascading_failure(
        &self,
        devices: &[DeviceHandle],
        growth_factor: f64,
        max_share: f64,
        duration_ms: u64,
    ) -> (usize, u64) {
        let waves = cascade_waves(devices.len(), growth_factor, max_share);
        let step = Duration::from_millis((duration_ms / (waves.len().max(1) as u64)).max(100));

        let mut applied = 0;
        let mut offset = 0usize;
        for (wave, size) in waves.iter().enumerate() {
            let slice: Vec<DeviceHandle> = devices[offset..offset + size].to_vec();
            offset += size;
            let failure = ErrorConditionConfig::DeviceFailure(DeviceFailureConfig {
                failure_type: FailureType::PowerFailure,
                duration_ms,
                recovery_behavior: RecoveryBehavior::ResetCounters,
                failure_probability: 1.0,
            });
            applied += self.install_staggered(&slice, failure, step * wave as u32);
        }
        (applied, duration_ms + step.as_millis() as u64 * waves.len() as u64)
    }

    async fn environmental(
        &self,
        devices: &[DeviceHandle],
        kind: EnvironmentalKind,
        severity: Severity,
        duration_ms: u64,
    ) -> (usize, u64) {
        let factor = severity.factor();
        let applied = match kind {
            EnvironmentalKind::Weather => {
                let loss = ErrorConditionConfig::PacketLoss(PacketLossConfig {
                    loss_rate: 0.3 * factor,
                    burst_loss: true,
                    burst_size: 15,
                    recovery_time_ms: 2000,
                    target_oids: vec![],
                });
                self.install_all(devices, loss).await
            }
            EnvironmentalKind::Power => {
                let outage = ErrorConditionConfig::DeviceFailure(DeviceFailureConfig {
                    failure_type: FailureType::PowerFailure,
                    duration_ms: (duration_ms as f64 * factor) as u64,
                    recovery_behavior: RecoveryBehavior::ResetCounters,
                    failure_probability: 1.0,
                });
                self.install_all(devices, outage).await
            }
            EnvironmentalKind::Temperature => {
                let overload = ErrorConditionConfig::DeviceFailure(DeviceFailureConfig {
                    failure_type: FailureType::Overload,
                    duration_ms,
                    recovery_behavior: RecoveryBehavior::Normal,
                    failure_probability: 1.0,
                });
                let errors = ErrorConditionConfig::SnmpError(SnmpErrorConfig {
                    kind: ErrorStatus::GenErr,
                    probability: 0.1 * factor,
                    target_oids: vec![],
                    error_index: 1,
                });
                self.install_all(devices, overload).await
                    + self.install_all(devices, errors).await
            }
            EnvironmentalKind::Interference => {
                let malformed = ErrorConditionConfig::Malformed(MalformedConfig {
                    corruption: crate::faults::injector::CorruptionKind::CorruptedVarbinds,
                    probability: 0.2 * factor,
                    severity: factor,
                    target_oids: vec![],
                });
                let loss = ErrorConditionConfig::PacketLoss(PacketLossConfig {
                    loss_rate: 0.2 * factor,
                    burst_loss: false,
                    burst_size: 0,
                    recovery_time_ms: 0,
                    target_oids: vec![],
                });
                self.install_all(devices, malformed).await
                    + self.install_all(devices, loss).await
            }
        };
        (applied, duration_ms)
    }
}

/// Wave sizes for a cascading failure: starts with one device and grows
/// by `growth_factor` until `max_share` of the population is failing.
fn cascade_waves(total: usize, growth_factor: f64, max_share: f64) -> Vec<usize> {
    let budget = ((total as f64) * max_share.clamp(0.0, 1.0)).round() as usize;
    let mut waves = Vec::new();
    let mut assigned = 0usize;
    let mut size = 1f64;
    while assigned < budget {
        let take = (size.round() as usize).max(1).min(budget - assigned);
        waves.push(take);
        assigned += take;
        size *= growth_factor.max(1.0);
    }
    waves
}
