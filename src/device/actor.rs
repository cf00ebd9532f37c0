//! Per-device actor and UDP listener
//!
//! One actor task per simulated device owns all mutable state; a listener
//! task feeds raw datagrams into a bounded inbox (overflow is dropped and
//! counted, like a real device under load). Control calls and
//! request processing serialize through the same inbox, so an installed
//! error condition is observable on the next request.

use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::{DeviceType, ErrorInjectionConfig, JitterConfig, UpgradeConfig};
use crate::faults::injector::{
    CorruptionKind, ErrorConditionConfig, ErrorConditionKind, ErrorInjector, InjectionDecision,
    InjectorStats, PacketLossConfig, RecoveryBehavior, ScheduledEvent, TimeoutConfig, Transition,
};
use crate::profile::ProfileStore;
use crate::sim::SimContext;
use crate::snmp::{codec, ErrorStatus, Oid, SnmpMessage};
use crate::{Error, Result};

use super::handler::{handle_message, HandlerLimits};
use super::state::{DeviceInfo, DeviceState};

const COMMAND_QUEUE_DEPTH: usize = 32;
/// Default timeout for RPC-style control calls.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a device needs to come up on its port.
#[derive(Debug, Clone)]
pub struct DeviceActorConfig {
    pub host: String,
    pub port: u16,
    pub device_type: DeviceType,
    pub community: String,
    pub seed: u64,
    pub inbox_capacity: usize,
    pub drop_delay_threshold: Duration,
    pub limits: HandlerLimits,
    pub jitter: JitterConfig,
    pub upgrade: UpgradeConfig,
    pub initial_injection: Option<ErrorInjectionConfig>,
}

/// Control messages serialized through the actor.
#[derive(Debug)]
pub enum DeviceCommand {
    GetInfo(oneshot::Sender<DeviceInfo>),
    UpdateCounter { oid: Oid, value: u64 },
    SetGauge { oid: Oid, value: f64 },
    Reboot,
    InstallError {
        config: ErrorConditionConfig,
        reply: oneshot::Sender<Uuid>,
    },
    RemoveErrorKind {
        kind: ErrorConditionKind,
        reply: oneshot::Sender<usize>,
    },
    ClearErrors,
    GetErrorStats(oneshot::Sender<InjectorStats>),
    Scheduled {
        condition_id: Uuid,
        event: ScheduledEvent,
    },
    UpgradeStarted,
    UpgradeCompleted,
    Stop,
}

/// Emitted towards the pool when a device goes away on its own.
#[derive(Debug, Clone, Copy)]
pub enum DeviceEvent {
    Stopped { port: u16 },
}

struct Datagram {
    data: Vec<u8>,
    peer: SocketAddr,
}

/// Cloneable handle the pool hands out; all interaction is by message.
#[derive(Clone)]
pub struct DeviceHandle {
    pub port: u16,
    pub device_type: DeviceType,
    command_tx: mpsc::Sender<DeviceCommand>,
    cancel: CancellationToken,
    spawned: Instant,
    last_access_millis: Arc<AtomicU64>,
}

impl DeviceHandle {
    pub fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// True when both handles point at the same actor instance.
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        self.command_tx.same_channel(&other.command_tx)
    }

    /// Refresh the pool-visible access clock.
    pub fn touch(&self) {
        self.last_access_millis
            .store(self.spawned.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last = self.last_access_millis.load(Ordering::Relaxed);
        self.spawned
            .elapsed()
            .saturating_sub(Duration::from_millis(last))
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> DeviceCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .await
            .map_err(|_| Error::device(format!("device on port {} is gone", self.port)))?;
        tokio::time::timeout(CONTROL_TIMEOUT, rx)
            .await
            .map_err(|_| Error::timeout(format!("device {} control call", self.port)))?
            .map_err(|_| Error::device(format!("device on port {} dropped the call", self.port)))
    }

    pub async fn get_info(&self) -> Result<DeviceInfo> {
        self.call(DeviceCommand::GetInfo).await
    }

    pub async fn update_counter(&self, oid: Oid, value: u64) -> Result<()> {
        self.send(DeviceCommand::UpdateCounter { oid, value }).await
    }

    pub async fn set_gauge(&self, oid: Oid, value: f64) -> Result<()> {
        self.send(DeviceCommand::SetGauge { oid, value }).await
    }

    pub async fn reboot(&self) -> Result<()> {
        self.send(DeviceCommand::Reboot).await
    }

    pub async fn install_error_condition(&self, config: ErrorConditionConfig) -> Result<Uuid> {
        self.call(|reply| DeviceCommand::InstallError { config, reply })
            .await
    }

    pub async fn remove_error_kind(&self, kind: ErrorConditionKind) -> Result<usize> {
        self.call(|reply| DeviceCommand::RemoveErrorKind { kind, reply })
            .await
    }

    pub async fn clear_error_conditions(&self) -> Result<()> {
        self.send(DeviceCommand::ClearErrors).await
    }

    pub async fn error_statistics(&self) -> Result<InjectorStats> {
        self.call(DeviceCommand::GetErrorStats).await
    }

    /// Ask the actor to stop; the pool owns the join handle and enforces
    /// the stop timeout.
    pub async fn stop(&self) {
        let _ = self.command_tx.send(DeviceCommand::Stop).await;
    }

    pub fn force_abort(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, command: DeviceCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::device(format!("device on port {} is gone", self.port)))
    }
}

pub struct DeviceActor {
    config: DeviceActorConfig,
    state: DeviceState,
    injector: ErrorInjector,
    socket: Arc<UdpSocket>,
    profiles: Arc<ProfileStore>,
    command_tx: mpsc::Sender<DeviceCommand>,
    cancel: CancellationToken,
    queue_drops: Arc<AtomicU64>,
    last_access_millis: Arc<AtomicU64>,
    spawned: Instant,
    events: mpsc::UnboundedSender<DeviceEvent>,
}

impl DeviceActor {
    /// Bind the port and start the listener + actor tasks.
    pub async fn spawn(
        config: DeviceActorConfig,
        profiles: Arc<ProfileStore>,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<(DeviceHandle, JoinHandle<()>)> {
        let bind_addr = format!("{}:{}", config.host, config.port);
        let socket = UdpSocket::bind(&bind_addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                Error::AddrInUse { port: config.port }
            } else {
                Error::Io(e)
            }
        })?;
        let socket = Arc::new(socket);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let cancel = CancellationToken::new();
        let queue_drops = Arc::new(AtomicU64::new(0));
        let last_access_millis = Arc::new(AtomicU64::new(0));
        let spawned = Instant::now();

        // Listener half: datagrams in, bounded; overflow is counted loss.
        {
            let socket = Arc::clone(&socket);
            let cancel = cancel.clone();
            let queue_drops = Arc::clone(&queue_drops);
            tokio::spawn(async move {
                let mut buffer = vec![0u8; 2048];
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = socket.recv_from(&mut buffer) => match received {
                            Ok((len, peer)) => {
                                let datagram = Datagram {
                                    data: buffer[..len].to_vec(),
                                    peer,
                                };
                                if inbox_tx.try_send(datagram).is_err() {
                                    queue_drops.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "UDP receive failed");
                                break;
                            }
                        },
                    }
                }
            });
        }

        let state = DeviceState::new(
            config.port,
            config.device_type,
            config.community.clone(),
            config.seed,
        );

        let mut actor = DeviceActor {
            state,
            injector: ErrorInjector::new(),
            socket,
            profiles,
            command_tx: command_tx.clone(),
            cancel: cancel.clone(),
            queue_drops: Arc::clone(&queue_drops),
            last_access_millis: Arc::clone(&last_access_millis),
            spawned,
            events,
            config,
        };
        actor.install_group_injection();

        let handle = DeviceHandle {
            port: actor.config.port,
            device_type: actor.config.device_type,
            command_tx,
            cancel,
            spawned,
            last_access_millis,
        };
        handle.touch();

        info!(
            port = actor.config.port,
            device_type = %actor.config.device_type,
            "device online"
        );
        let join = tokio::spawn(actor.run(command_rx, inbox_rx));
        Ok((handle, join))
    }

    /// Group-level error_injection rates become standing conditions.
    fn install_group_injection(&mut self) {
        let Some(injection) = self.config.initial_injection else {
            return;
        };
        if let Some(rate) = injection.packet_loss_rate.filter(|r| *r > 0.0) {
            self.injector
                .install(ErrorConditionConfig::PacketLoss(PacketLossConfig {
                    loss_rate: rate,
                    burst_loss: false,
                    burst_size: 0,
                    recovery_time_ms: 0,
                    target_oids: vec![],
                }));
        }
        if let Some(rate) = injection.timeout_rate.filter(|r| *r > 0.0) {
            self.injector
                .install(ErrorConditionConfig::Timeout(TimeoutConfig {
                    probability: rate,
                    duration_ms: 1000,
                    burst_probability: 0.0,
                    burst_duration_ms: 0,
                    target_oids: vec![],
                }));
        }
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<DeviceCommand>,
        mut inbox_rx: mpsc::Receiver<Datagram>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = command_rx.recv() => match command {
                    Some(DeviceCommand::Stop) | None => break,
                    Some(command) => self.handle_command(command),
                },
                datagram = inbox_rx.recv() => match datagram {
                    Some(datagram) => self.handle_datagram(datagram).await,
                    None => break,
                },
            }
        }

        self.cancel.cancel();
        let _ = self.events.send(DeviceEvent::Stopped {
            port: self.config.port,
        });
        debug!(port = self.config.port, "device actor stopped");
    }

    fn handle_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::GetInfo(reply) => {
                self.state.stats.queue_drops = self.queue_drops.load(Ordering::Relaxed);
                let _ = reply.send(self.state.info());
            }
            DeviceCommand::UpdateCounter { oid, value } => {
                self.state.counters.insert(oid, value);
            }
            DeviceCommand::SetGauge { oid, value } => {
                self.state.gauges.insert(oid, value);
            }
            DeviceCommand::Reboot => {
                info!(port = self.config.port, "device reboot requested");
                self.state.reboot();
                self.injector.clear_all();
            }
            DeviceCommand::InstallError { config, reply } => {
                let (id, transitions) = self.injector.install(config);
                self.arm_transitions(transitions);
                let _ = reply.send(id);
            }
            DeviceCommand::RemoveErrorKind { kind, reply } => {
                let _ = reply.send(self.injector.remove_kind(kind));
            }
            DeviceCommand::ClearErrors => self.injector.clear_all(),
            DeviceCommand::GetErrorStats(reply) => {
                let _ = reply.send(self.injector.statistics());
            }
            DeviceCommand::Scheduled {
                condition_id,
                event,
            } => {
                let (recovery, transitions) = self.injector.handle_scheduled(condition_id, event);
                self.arm_transitions(transitions);
                if let Some(behavior) = recovery {
                    self.apply_recovery(behavior);
                }
            }
            DeviceCommand::UpgradeStarted => self.state.upgrade.upgrade_started(),
            DeviceCommand::UpgradeCompleted => {
                info!(port = self.config.port, "firmware upgrade completed");
                self.state.upgrade.upgrade_completed();
            }
            // Stop is consumed by the select loop before it gets here.
            DeviceCommand::Stop => {}
        }
    }

    fn apply_recovery(&mut self, behavior: RecoveryBehavior) {
        debug!(port = self.config.port, ?behavior, "device recovering");
        match behavior {
            RecoveryBehavior::Normal => {
                self.state.status_vars.insert("admin_status".to_string(), 1);
                self.state.status_vars.insert("oper_status".to_string(), 1);
            }
            RecoveryBehavior::ResetCounters => {
                self.state.counters.clear();
                self.state.counter_progress.clear();
                self.state.status_vars.insert("admin_status".to_string(), 1);
                self.state.status_vars.insert("oper_status".to_string(), 1);
                self.state.status_vars.insert("last_change".to_string(), 0);
            }
            RecoveryBehavior::Gradual => {
                self.state.status_vars.insert("oper_status".to_string(), 1);
                self.state
                    .status_vars
                    .insert("last_change".to_string(), self.state.uptime_ticks() as i64);
            }
        }
    }

    fn arm_transitions(&self, transitions: Vec<Transition>) {
        for transition in transitions {
            self.schedule(
                DeviceCommand::Scheduled {
                    condition_id: transition.condition_id,
                    event: transition.event,
                },
                transition.after,
            );
        }
    }

    /// Arm a cancellable timer that feeds a command back into the inbox.
    fn schedule(&self, command: DeviceCommand, delay: Duration) {
        let tx = self.command_tx.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(command).await;
                }
            }
        });
    }

    async fn handle_datagram(&mut self, datagram: Datagram) {
        let started = Instant::now();
        self.state.stats.packets_received += 1;
        self.state.touch();
        self.last_access_millis
            .store(self.spawned.elapsed().as_millis() as u64, Ordering::Relaxed);

        let message = match codec::decode_message(&datagram.data) {
            Ok(message) => message,
            Err(e) => {
                self.state.stats.decode_errors += 1;
                trace!(port = self.config.port, error = %e, "undecodable datagram");
                return;
            }
        };

        let request_oids: Vec<Oid> = message
            .pdu
            .bindings()
            .iter()
            .map(|b| b.oid.clone())
            .collect();

        let mut corruption: Option<(CorruptionKind, f64)> = None;
        match self.injector.evaluate(&request_oids, &mut self.state.rng) {
            InjectionDecision::Pass => {}
            InjectionDecision::Drop => {
                self.state.stats.dropped_by_injection += 1;
                return;
            }
            InjectionDecision::Delay(delay) => {
                if delay >= self.config.drop_delay_threshold {
                    self.state.stats.dropped_by_injection += 1;
                    return;
                }
                tokio::time::sleep(delay).await;
            }
            InjectionDecision::Slow(delay) => tokio::time::sleep(delay).await,
            InjectionDecision::SnmpError { status, index } => {
                let response = SnmpMessage::error_response(&message, status, index);
                self.state.stats.error_responses += 1;
                self.send_response(&response, datagram.peer, None).await;
                self.state.stats.record_processing(started.elapsed());
                return;
            }
            InjectionDecision::Malform {
                corruption: kind,
                severity,
            } => corruption = Some((kind, severity)),
        }

        let profile = match self.profiles.profile(self.config.device_type) {
            Some(profile) => profile,
            None => self.profiles.ensure_baseline(self.config.device_type),
        };
        self.state.has_walk_data = profile.metadata.source.is_some();

        let limits = self.config.limits;
        let result = {
            let sim = SimContext {
                now: chrono::Local::now().naive_local(),
                jitter: &self.config.jitter,
            };
            let state = &mut self.state;
            catch_unwind(AssertUnwindSafe(|| {
                handle_message(&message, state, &profile, &sim, &limits)
            }))
        };

        let result = match result {
            Ok(result) => result,
            Err(_) => {
                // A handler panic degrades to genErr; the device survives.
                error!(port = self.config.port, "request handler panicked");
                self.state.stats.error_responses += 1;
                let response = SnmpMessage::error_response(&message, ErrorStatus::GenErr, 0);
                self.send_response(&response, datagram.peer, None).await;
                return;
            }
        };

        for _action in &result.actions {
            // The only action today is the firmware upgrade trigger.
            self.schedule(
                DeviceCommand::UpgradeStarted,
                Duration::from_millis(self.config.upgrade.start_delay_ms),
            );
            self.schedule(
                DeviceCommand::UpgradeCompleted,
                Duration::from_millis(
                    self.config.upgrade.start_delay_ms + self.config.upgrade.complete_delay_ms,
                ),
            );
        }

        if let Some(response) = &result.response {
            self.send_response(response, datagram.peer, corruption).await;
        }
        self.state.stats.record_processing(started.elapsed());
    }

    async fn send_response(
        &mut self,
        response: &SnmpMessage,
        peer: SocketAddr,
        corruption: Option<(CorruptionKind, f64)>,
    ) {
        let mut bytes = codec::encode_message(response);
        if let Some((kind, severity)) = corruption {
            bytes = corrupt_frame(bytes, kind, severity, &mut self.state.rng);
        }
        match self.socket.send_to(&bytes, peer).await {
            Ok(_) => self.state.stats.responses_sent += 1,
            Err(e) => warn!(port = self.config.port, error = %e, "failed to send response"),
        }
    }
}

/// Deliberately damage an encoded response frame.
fn corrupt_frame<R: Rng + ?Sized>(
    mut bytes: Vec<u8>,
    kind: CorruptionKind,
    severity: f64,
    rng: &mut R,
) -> Vec<u8> {
    let severity = severity.clamp(0.0, 1.0);
    match kind {
        CorruptionKind::Truncated => {
            let keep = ((bytes.len() as f64) * (1.0 - 0.8 * severity)).max(1.0) as usize;
            bytes.truncate(keep);
        }
        CorruptionKind::InvalidBer => {
            bytes[0] = 0xff;
            if bytes.len() > 1 {
                bytes[1] = bytes[1].wrapping_add(0x40);
            }
        }
        CorruptionKind::WrongCommunity => {
            // Message layout: 30 len 02 01 vv 04 len community...
            if bytes.len() > 7 && bytes[5] == 0x04 {
                let community_len = bytes[6] as usize;
                for b in bytes.iter_mut().skip(7).take(community_len) {
                    *b ^= 0x20;
                }
            }
        }
        CorruptionKind::InvalidPduType => {
            if let Some(tag) = bytes.iter_mut().find(|b| (0xa0..=0xa5).contains(*b)) {
                *tag = 0xaf;
            }
        }
        CorruptionKind::CorruptedVarbinds => {
            let len = bytes.len();
            let tail = ((len / 2) as f64 * severity).max(1.0) as usize;
            for b in bytes.iter_mut().skip(len - tail.min(len)) {
                *b ^= 0x5a;
            }
        }
    }
    let _ = rng;
    bytes
}
