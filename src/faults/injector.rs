//! Programmable fault injection
//!
//! Each device actor owns one injector. Conditions are installed with a
//! typed configuration, consulted on every request, and may cycle through
//! latent / burst-active / recovering phases on timers the actor arms.
//! The injector itself never sleeps; it only decides.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::snmp::{ErrorStatus, Oid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorConditionKind {
    Timeout,
    PacketLoss,
    SnmpError,
    Malformed,
    DeviceFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionKind {
    Truncated,
    InvalidBer,
    WrongCommunity,
    InvalidPduType,
    CorruptedVarbinds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Reboot,
    PowerFailure,
    NetworkDisconnect,
    FirmwareCrash,
    Overload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryBehavior {
    Normal,
    Gradual,
    ResetCounters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub probability: f64,
    pub duration_ms: u64,
    #[serde(default)]
    pub burst_probability: f64,
    #[serde(default)]
    pub burst_duration_ms: u64,
    #[serde(default)]
    pub target_oids: Vec<Oid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketLossConfig {
    pub loss_rate: f64,
    #[serde(default)]
    pub burst_loss: bool,
    #[serde(default)]
    pub burst_size: u32,
    #[serde(default)]
    pub recovery_time_ms: u64,
    #[serde(default)]
    pub target_oids: Vec<Oid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpErrorConfig {
    pub kind: ErrorStatus,
    pub probability: f64,
    #[serde(default)]
    pub target_oids: Vec<Oid>,
    #[serde(default = "default_error_index")]
    pub error_index: u32,
}

fn default_error_index() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalformedConfig {
    pub corruption: CorruptionKind,
    pub probability: f64,
    /// 0..1, how much of the frame the corruption touches.
    #[serde(default = "default_severity")]
    pub severity: f64,
    #[serde(default)]
    pub target_oids: Vec<Oid>,
}

fn default_severity() -> f64 {
    0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFailureConfig {
    pub failure_type: FailureType,
    pub duration_ms: u64,
    pub recovery_behavior: RecoveryBehavior,
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,
}

fn default_failure_probability() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorConditionConfig {
    Timeout(TimeoutConfig),
    PacketLoss(PacketLossConfig),
    SnmpError(SnmpErrorConfig),
    Malformed(MalformedConfig),
    DeviceFailure(DeviceFailureConfig),
}

impl ErrorConditionConfig {
    pub fn kind(&self) -> ErrorConditionKind {
        match self {
            ErrorConditionConfig::Timeout(_) => ErrorConditionKind::Timeout,
            ErrorConditionConfig::PacketLoss(_) => ErrorConditionKind::PacketLoss,
            ErrorConditionConfig::SnmpError(_) => ErrorConditionKind::SnmpError,
            ErrorConditionConfig::Malformed(_) => ErrorConditionKind::Malformed,
            ErrorConditionConfig::DeviceFailure(_) => ErrorConditionKind::DeviceFailure,
        }
    }

    fn target_oids(&self) -> &[Oid] {
        match self {
            ErrorConditionConfig::Timeout(c) => &c.target_oids,
            ErrorConditionConfig::PacketLoss(c) => &c.target_oids,
            ErrorConditionConfig::SnmpError(c) => &c.target_oids,
            ErrorConditionConfig::Malformed(c) => &c.target_oids,
            ErrorConditionConfig::DeviceFailure(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Latent,
    BurstActive,
    Recovering,
}

#[derive(Debug)]
struct ActiveCondition {
    config: ErrorConditionConfig,
    phase: Phase,
    burst_packets_left: u32,
}

/// Timer event the actor schedules on the injector's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledEvent {
    BurstOn,
    BurstOff,
    Recovery,
}

/// A timer the actor must arm: after `after`, feed `event` back in.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub condition_id: Uuid,
    pub after: Duration,
    pub event: ScheduledEvent,
}

/// What to do with the current request.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectionDecision {
    Pass,
    Drop,
    Delay(Duration),
    SnmpError { status: ErrorStatus, index: u32 },
    Malform { corruption: CorruptionKind, severity: f64 },
    Slow(Duration),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InjectorStats {
    pub total_injections: u64,
    pub timeouts: u64,
    pub packet_losses: u64,
    pub snmp_errors: u64,
    pub malformed: u64,
    pub device_failures: u64,
    pub burst_events: u64,
    pub active_conditions: usize,
    pub last_injection: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct ErrorInjector {
    conditions: HashMap<Uuid, ActiveCondition>,
    stats: InjectorStats,
}

impl ErrorInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a condition; returns its id plus any timers to arm.
    pub fn install(&mut self, config: ErrorConditionConfig) -> (Uuid, Vec<Transition>) {
        let id = Uuid::new_v4();
        let mut transitions = Vec::new();
        let mut phase = Phase::Latent;

        match &config {
            ErrorConditionConfig::Timeout(c) => {
                self.stats.timeouts += 1;
                if c.burst_probability > 0.0 && c.burst_duration_ms > 0 {
                    transitions.push(Transition {
                        condition_id: id,
                        after: Duration::from_millis(c.burst_duration_ms * 2),
                        event: ScheduledEvent::BurstOn,
                    });
                }
            }
            ErrorConditionConfig::PacketLoss(c) => {
                self.stats.packet_losses += 1;
                if c.burst_loss && c.recovery_time_ms > 0 {
                    transitions.push(Transition {
                        condition_id: id,
                        after: Duration::from_millis(c.recovery_time_ms),
                        event: ScheduledEvent::BurstOn,
                    });
                }
            }
            ErrorConditionConfig::SnmpError(_) => self.stats.snmp_errors += 1,
            ErrorConditionConfig::Malformed(_) => self.stats.malformed += 1,
            ErrorConditionConfig::DeviceFailure(c) => {
                self.stats.device_failures += 1;
                if c.failure_probability >= 1.0 {
                    phase = Phase::BurstActive;
                    transitions.push(Transition {
                        condition_id: id,
                        after: Duration::from_millis(c.duration_ms),
                        event: ScheduledEvent::Recovery,
                    });
                }
            }
        }

        self.stats.total_injections += 1;
        self.stats.last_injection = Some(Utc::now());
        debug!(condition = ?config.kind(), %id, "installed error condition");

        self.conditions.insert(
            id,
            ActiveCondition {
                config,
                phase,
                burst_packets_left: 0,
            },
        );
        self.stats.active_conditions = self.conditions.len();
        (id, transitions)
    }

    /// Remove every condition of a kind. Returns how many went away.
    pub fn remove_kind(&mut self, kind: ErrorConditionKind) -> usize {
        let before = self.conditions.len();
        self.conditions.retain(|_, c| c.config.kind() != kind);
        self.stats.active_conditions = self.conditions.len();
        before - self.conditions.len()
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let removed = self.conditions.remove(&id).is_some();
        self.stats.active_conditions = self.conditions.len();
        removed
    }

    pub fn clear_all(&mut self) {
        self.conditions.clear();
        self.stats.active_conditions = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn statistics(&self) -> InjectorStats {
        self.stats.clone()
    }

    /// Advance a condition's phase machine on a fired timer. Returns the
    /// recovery behavior to apply (device failures only) and any follow-up
    /// timers.
    pub fn handle_scheduled(
        &mut self,
        condition_id: Uuid,
        event: ScheduledEvent,
    ) -> (Option<RecoveryBehavior>, Vec<Transition>) {
        let Some(condition) = self.conditions.get_mut(&condition_id) else {
            // Condition was removed before its timer fired.
            return (None, Vec::new());
        };

        match event {
            ScheduledEvent::BurstOn => {
                condition.phase = Phase::BurstActive;
                self.stats.burst_events += 1;
                let (burst_len, burst_size) = match &condition.config {
                    ErrorConditionConfig::Timeout(c) => {
                        (Duration::from_millis(c.burst_duration_ms.max(1)), 0)
                    }
                    ErrorConditionConfig::PacketLoss(c) => (
                        Duration::from_millis(c.recovery_time_ms.max(1)),
                        c.burst_size,
                    ),
                    _ => (Duration::from_millis(1), 0),
                };
                condition.burst_packets_left = burst_size;
                (
                    None,
                    vec![Transition {
                        condition_id,
                        after: burst_len,
                        event: ScheduledEvent::BurstOff,
                    }],
                )
            }
            ScheduledEvent::BurstOff => {
                // Recovering behaves like latent for decisions; the next
                // burst-on timer closes the cycle.
                condition.phase = Phase::Recovering;
                let next = match &condition.config {
                    ErrorConditionConfig::Timeout(c) => {
                        Duration::from_millis((c.burst_duration_ms * 2).max(1))
                    }
                    ErrorConditionConfig::PacketLoss(c) => {
                        Duration::from_millis((c.recovery_time_ms * 2).max(1))
                    }
                    _ => Duration::from_millis(1),
                };
                (
                    None,
                    vec![Transition {
                        condition_id,
                        after: next,
                        event: ScheduledEvent::BurstOn,
                    }],
                )
            }
            ScheduledEvent::Recovery => {
                let behavior = match &condition.config {
                    ErrorConditionConfig::DeviceFailure(c) => Some(c.recovery_behavior),
                    _ => None,
                };
                self.conditions.remove(&condition_id);
                self.stats.active_conditions = self.conditions.len();
                (behavior, Vec::new())
            }
        }
    }

    /// Decide the fate of one request touching `request_oids`.
    ///
    /// Precedence mirrors the request path: device failures first, then
    /// packet loss, timeouts, SNMP errors, and malformed responses last.
    pub fn evaluate<R: Rng + ?Sized>(
        &mut self,
        request_oids: &[Oid],
        rng: &mut R,
    ) -> InjectionDecision {
        let mut decision = InjectionDecision::Pass;

        for condition in self.conditions.values_mut() {
            if !targets_match(condition.config.target_oids(), request_oids) {
                continue;
            }
            let candidate = match &condition.config {
                ErrorConditionConfig::DeviceFailure(c) => {
                    evaluate_failure(condition.phase, c, rng)
                }
                ErrorConditionConfig::PacketLoss(c) => {
                    let in_burst = condition.phase == Phase::BurstActive
                        && (c.burst_size == 0 || condition.burst_packets_left > 0);
                    if in_burst {
                        if condition.burst_packets_left > 0 {
                            condition.burst_packets_left -= 1;
                        }
                        InjectionDecision::Drop
                    } else if rng.gen_bool(c.loss_rate.clamp(0.0, 1.0)) {
                        InjectionDecision::Drop
                    } else {
                        InjectionDecision::Pass
                    }
                }
                ErrorConditionConfig::Timeout(c) => {
                    let probability = if condition.phase == Phase::BurstActive {
                        1.0
                    } else {
                        c.probability.clamp(0.0, 1.0)
                    };
                    if rng.gen_bool(probability) {
                        InjectionDecision::Delay(Duration::from_millis(c.duration_ms))
                    } else {
                        InjectionDecision::Pass
                    }
                }
                ErrorConditionConfig::SnmpError(c) => {
                    if rng.gen_bool(c.probability.clamp(0.0, 1.0)) {
                        InjectionDecision::SnmpError {
                            status: c.kind,
                            index: c.error_index,
                        }
                    } else {
                        InjectionDecision::Pass
                    }
                }
                ErrorConditionConfig::Malformed(c) => {
                    if rng.gen_bool(c.probability.clamp(0.0, 1.0)) {
                        InjectionDecision::Malform {
                            corruption: c.corruption,
                            severity: c.severity.clamp(0.0, 1.0),
                        }
                    } else {
                        InjectionDecision::Pass
                    }
                }
            };
            decision = stronger(decision, candidate);
        }

        decision
    }
}

fn evaluate_failure<R: Rng + ?Sized>(
    phase: Phase,
    config: &DeviceFailureConfig,
    rng: &mut R,
) -> InjectionDecision {
    let failing = phase == Phase::BurstActive
        || (config.failure_probability < 1.0
            && rng.gen_bool(config.failure_probability.clamp(0.0, 1.0)));
    if !failing {
        return InjectionDecision::Pass;
    }
    match config.failure_type {
        FailureType::Overload => {
            InjectionDecision::Slow(Duration::from_millis(50 + config.duration_ms / 20))
        }
        FailureType::Reboot
        | FailureType::PowerFailure
        | FailureType::NetworkDisconnect
        | FailureType::FirmwareCrash => InjectionDecision::Drop,
    }
}

fn targets_match(targets: &[Oid], request_oids: &[Oid]) -> bool {
    if targets.is_empty() {
        return true;
    }
    request_oids
        .iter()
        .any(|oid| targets.iter().any(|target| oid.starts_with(target)))
}

/// Pick the more disruptive of two decisions.
fn stronger(a: InjectionDecision, b: InjectionDecision) -> InjectionDecision {
    fn rank(d: &InjectionDecision) -> u8 {
        match d {
            InjectionDecision::Pass => 0,
            InjectionDecision::Slow(_) => 1,
            InjectionDecision::Malform { .. } => 2,
            InjectionDecision::SnmpError { .. } => 3,
            InjectionDecision::Delay(_) => 4,
            InjectionDecision::Drop => 5,
        }
    }
    if rank(&b) > rank(&a) {
        b
    } else {
        a
    }
}
