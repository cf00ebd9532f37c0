//! Error handling for the SNMP Swarm simulator

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration field `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Maximum device count reached ({limit})")]
    MaxDevicesReached { limit: usize },

    #[error("Port {port} does not belong to any configured device range")]
    UnknownPortRange { port: u16 },

    #[error("Port ranges {first} and {second} overlap")]
    OverlappingRanges { first: String, second: String },

    #[error("Invalid port range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },

    #[error("Port assignment covers {requested} ports, exceeding the limit of {limit}")]
    TooManyDevices { requested: usize, limit: usize },

    #[error("Port assignment contains no device types")]
    NoDeviceTypes,

    #[error("Device distribution is empty")]
    EmptyDistribution,

    #[error("UDP port {port} is already in use")]
    AddrInUse { port: u16 },

    #[error("Failed to read {}: {reason}", path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("No MIB definitions compiled for {0}")]
    NoMibsCompiled(String),

    #[error("Unsupported profile source: {0}")]
    UnsupportedSource(String),

    #[error("No profile loaded for device type {0}")]
    ProfileNotLoaded(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_config<S: Into<String>, R: Into<String>>(field: S, reason: R) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::Device(msg.into())
    }

    pub fn scenario<S: Into<String>>(msg: S) -> Self {
        Self::Scenario(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
