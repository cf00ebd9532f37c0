//! SNMP Swarm - device-population simulator
//!
//! Impersonates thousands of SNMPv1/v2c network elements (cable modems,
//! MTAs, switches, routers, CMTS, servers) on distinct UDP ports, with
//! values sourced from captured walk files and enriched with time-, load-
//! and environment-dependent behavior, plus programmable fault injection
//! for stress-testing pollers.

pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod faults;
pub mod pool;
pub mod profile;
pub mod sim;
pub mod snmp;
pub mod utils;

pub use error::{Error, Result};

/// Simulator version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
