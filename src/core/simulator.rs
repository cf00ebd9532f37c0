//! Main simulator orchestrator
//!
//! Owns the profile store, the device pool and the scenario runner; wires
//! their event streams together and drives startup/shutdown. Devices
//! themselves come and go lazily with traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{DeviceType, SimulatorConfig};
use crate::device::DeviceHandle;
use crate::faults::{Scenario, ScenarioDescriptor, ScenarioRunner};
use crate::pool::{DevicePool, PoolEvent, PoolStats};
use crate::profile::ProfileStore;
use crate::{Error, Result};

/// Simulator lifecycle and activity events.
#[derive(Debug)]
pub enum SimulatorEvent {
    Started,
    Stopped,
    ProfileLoaded {
        device_type: DeviceType,
        entries: usize,
    },
    Pool(PoolEvent),
}

#[derive(Debug, Clone)]
pub struct SimulatorStatus {
    pub running: bool,
    pub uptime: Duration,
    pub loaded_profiles: Vec<DeviceType>,
    pub pool: Option<PoolStats>,
}

pub struct Simulator {
    config: Arc<SimulatorConfig>,
    profiles: Arc<ProfileStore>,
    pool: Option<Arc<DevicePool>>,
    scenarios: Option<ScenarioRunner>,
    event_tx: mpsc::UnboundedSender<SimulatorEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SimulatorEvent>>,
    start_time: Option<std::time::Instant>,
    is_running: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config: Arc::new(config),
            profiles: Arc::new(ProfileStore::new()),
            pool: None,
            scenarios: None,
            event_tx,
            event_rx: Some(event_rx),
            start_time: None,
            is_running: false,
            tasks: Vec::new(),
        })
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SimulatorEvent>> {
        self.event_rx.take()
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting SNMP device-population simulator");

        self.load_profiles().await?;

        let pool = DevicePool::new(Arc::clone(&self.config), Arc::clone(&self.profiles))?;
        pool.start();

        // Forward pool events onto the simulator stream.
        if let Some(mut pool_events) = pool.take_event_receiver() {
            let event_tx = self.event_tx.clone();
            let task = tokio::spawn(async move {
                while let Some(event) = pool_events.recv().await {
                    let _ = event_tx.send(SimulatorEvent::Pool(event));
                }
            });
            self.tasks.push(task);
        }

        self.scenarios = Some(ScenarioRunner::new(Arc::clone(&pool)));
        self.pool = Some(pool);
        self.is_running = true;
        self.start_time = Some(std::time::Instant::now());
        let _ = self.event_tx.send(SimulatorEvent::Started);

        let total_ports: usize = self
            .config
            .device_groups
            .iter()
            .map(|g| g.port_range.size())
            .sum();
        info!(
            groups = self.config.device_groups.len(),
            assignable_ports = total_ports,
            max_devices = self.config.global.max_devices,
            "simulator ready; devices spawn lazily with traffic"
        );
        Ok(())
    }

    async fn load_profiles(&self) -> Result<()> {
        for group in &self.config.device_groups {
            match &group.walk_file {
                Some(path) => {
                    let profile = self
                        .profiles
                        .load_walk_profile_tagged(group.device_type, path, &group.behaviors)
                        .await?;
                    let _ = self.event_tx.send(SimulatorEvent::ProfileLoaded {
                        device_type: group.device_type,
                        entries: profile.metadata.entry_count,
                    });
                }
                None => {
                    let profile = self.profiles.ensure_baseline(group.device_type);
                    let _ = self.event_tx.send(SimulatorEvent::ProfileLoaded {
                        device_type: group.device_type,
                        entries: profile.metadata.entry_count,
                    });
                }
            }
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping simulator");
        self.is_running = false;

        if let Some(pool) = &self.pool {
            pool.shutdown_all_devices().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.pool = None;
        self.scenarios = None;

        let _ = self.event_tx.send(SimulatorEvent::Stopped);
        info!("Simulator stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub fn pool(&self) -> Option<&Arc<DevicePool>> {
        self.pool.as_ref()
    }

    /// Fetch (or lazily create) the device listening on `port`.
    pub async fn device(&self, port: u16) -> Result<DeviceHandle> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| Error::invalid_state("simulator is not running"))?;
        pool.get_or_create_device(port).await
    }

    /// Launch a named fault scenario over a set of ports.
    pub async fn run_scenario(
        &self,
        scenario: Scenario,
        ports: &[u16],
    ) -> Result<ScenarioDescriptor> {
        let runner = self
            .scenarios
            .as_ref()
            .ok_or_else(|| Error::invalid_state("simulator is not running"))?;
        runner.run(scenario, ports).await
    }

    pub fn status(&self) -> SimulatorStatus {
        SimulatorStatus {
            running: self.is_running,
            uptime: self
                .start_time
                .map(|start| start.elapsed())
                .unwrap_or_default(),
            loaded_profiles: self.profiles.list_profiles(),
            pool: self.pool.as_ref().map(|p| p.get_stats()),
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if self.is_running {
            error!("simulator dropped while running; devices were not drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceType;

    fn local_config() -> SimulatorConfig {
        let mut config = SimulatorConfig::default_config();
        config.global.host = "127.0.0.1".to_string();
        config
    }

    #[tokio::test]
    async fn test_simulator_lifecycle() {
        let mut simulator = Simulator::new(local_config()).unwrap();
        assert!(!simulator.is_running());
        assert_eq!(simulator.status().uptime, Duration::ZERO);

        simulator.start().await.unwrap();
        assert!(simulator.is_running());

        let status = simulator.status();
        assert!(status.running);
        // One baseline profile per configured device family.
        assert_eq!(status.loaded_profiles.len(), 6);
        assert!(status.loaded_profiles.contains(&DeviceType::CableModem));

        simulator.stop().await.unwrap();
        assert!(!simulator.is_running());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_creation() {
        let mut config = local_config();
        config.device_groups.clear();
        assert!(Simulator::new(config).is_err());
    }

    #[tokio::test]
    async fn test_device_access_requires_running() {
        let simulator = Simulator::new(local_config()).unwrap();
        assert!(simulator.device(30001).await.is_err());
    }

    #[tokio::test]
    async fn test_lazy_device_through_simulator() {
        let mut simulator = Simulator::new(local_config()).unwrap();
        simulator.start().await.unwrap();

        let device = simulator.device(30001).await.unwrap();
        assert_eq!(device.device_type, DeviceType::CableModem);
        let again = simulator.device(30001).await.unwrap();
        assert!(device.same_device(&again));

        let status = simulator.status();
        assert_eq!(status.pool.as_ref().unwrap().active_devices, 1);

        simulator.stop().await.unwrap();
        assert!(!device.is_alive());
    }
}
