//! Core orchestration

pub mod simulator;

pub use simulator::{Simulator, SimulatorEvent, SimulatorStatus};
