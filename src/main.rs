//! SNMP Swarm main application

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use snmp_swarm::{
    config::SimulatorConfig,
    core::{Simulator, SimulatorEvent},
    utils::setup_logging,
    Result,
};

#[derive(Parser)]
#[command(name = "snmp-swarm")]
#[command(about = "SNMP device-population simulator")]
#[command(version = snmp_swarm::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the simulator
    Start,
    /// Validate configuration
    ValidateConfig,
    /// Generate default configuration
    GenerateConfig {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(&cli)?;
    if cli.log_level != "info" {
        config.logging.level = cli.log_level.clone();
    }
    // Keeps the non-blocking file writer flushing until exit.
    let _log_guard = setup_logging(&config.logging)?;

    info!("Starting {} v{}", snmp_swarm::NAME, snmp_swarm::VERSION);

    match &cli.command {
        Some(Commands::Start) | None => run_simulator(config).await,
        Some(Commands::ValidateConfig) => validate_configuration(&config),
        Some(Commands::GenerateConfig { output }) => generate_default_config(output.clone()),
    }
}

fn load_configuration(cli: &Cli) -> Result<SimulatorConfig> {
    let config = if let Some(config_path) = &cli.config {
        SimulatorConfig::load_from_file(config_path)?
    } else {
        match SimulatorConfig::load_from_env() {
            Ok(config) => config,
            Err(_) => SimulatorConfig::default_config(),
        }
    };
    config.validate()?;
    Ok(config)
}

async fn run_simulator(config: SimulatorConfig) -> Result<()> {
    let mut simulator = Simulator::new(config)?;

    let mut event_rx = simulator
        .take_event_receiver()
        .ok_or_else(|| snmp_swarm::Error::internal("event receiver already taken"))?;

    simulator.start().await?;

    let simulator = Arc::new(tokio::sync::Mutex::new(simulator));
    let simulator_shutdown = Arc::clone(&simulator);

    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_simulator_event(event);
        }
    });

    let shutdown_task = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully");
                let mut simulator = simulator_shutdown.lock().await;
                if let Err(e) = simulator.stop().await {
                    error!("Error during shutdown: {e}");
                }
            }
            Err(e) => {
                error!("Unable to listen for shutdown signal: {e}");
            }
        }
    });

    tokio::select! {
        _ = event_task => {
            info!("Event handling completed");
        }
        _ = shutdown_task => {
            info!("Shutdown signal handled");
        }
    }

    let mut simulator = simulator.lock().await;
    if simulator.is_running() {
        simulator.stop().await?;
    }

    info!("Simulator shutdown complete");
    Ok(())
}

fn handle_simulator_event(event: SimulatorEvent) {
    match event {
        SimulatorEvent::Started => info!("Simulator started"),
        SimulatorEvent::Stopped => info!("Simulator stopped"),
        SimulatorEvent::ProfileLoaded {
            device_type,
            entries,
        } => info!("Profile for {device_type} ready with {entries} OIDs"),
        SimulatorEvent::Pool(pool_event) => {
            use snmp_swarm::pool::PoolEvent;
            match pool_event {
                PoolEvent::DeviceSpawned { port, device_type } => {
                    info!("Device {device_type} up on port {port}")
                }
                PoolEvent::DeviceReaped { port } => info!("Reaped idle device on port {port}"),
                PoolEvent::DeviceStopped { port } => info!("Device on port {port} stopped"),
                PoolEvent::CapacityReached { limit } => {
                    warn!("Device capacity reached ({limit})")
                }
            }
        }
    }
}

fn validate_configuration(config: &SimulatorConfig) -> Result<()> {
    config.validate()?;

    println!("Configuration is valid");
    println!("  Host: {}", config.global.host);
    println!("  Max devices: {}", config.global.max_devices);
    for group in &config.device_groups {
        println!(
            "  Group {}: {} x {} on ports {} (community {:?})",
            group.name, group.count, group.device_type, group.port_range, group.community
        );
    }
    Ok(())
}

fn generate_default_config(output_path: Option<PathBuf>) -> Result<()> {
    let config = SimulatorConfig::default_config();
    let toml_content = toml::to_string_pretty(&config)
        .map_err(|e| snmp_swarm::Error::internal(format!("Failed to serialize config: {e}")))?;

    match output_path {
        Some(path) => {
            std::fs::write(&path, toml_content)?;
            println!("Default configuration written to: {}", path.display());
        }
        None => println!("{toml_content}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_generation() {
        assert!(generate_default_config(None).is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = SimulatorConfig::default_config();
        assert!(validate_configuration(&config).is_ok());
    }
}
