//! Device profiles: walk parsing, the ordered OID tree and the shared store

pub mod behavior;
pub mod mib;
pub mod store;
pub mod tree;
pub mod walk;

pub use behavior::{Behavior, ProfileEntry, VarianceMode};
pub use store::{Profile, ProfileStore};
pub use tree::{NextOid, OidTree};
pub use walk::{parse_walk_text, WalkData, WalkEntry};
