//! Simulated devices: state, PDU handling, bulk engine and the actor

pub mod actor;
pub mod bulk;
pub mod handler;
pub mod state;
pub mod upgrade;

pub use actor::{DeviceActor, DeviceActorConfig, DeviceCommand, DeviceEvent, DeviceHandle};
pub use bulk::{process_bulk, BulkError};
pub use handler::{handle_message, HandlerLimits, HandlerResult};
pub use state::{DeviceInfo, DeviceState, ListenerStats};
pub use upgrade::UpgradeState;
