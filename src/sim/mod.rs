//! Value simulation: clock patterns, synthesis engine and correlations

pub mod clock;
pub mod correlation;
pub mod engine;

pub use correlation::{Correlation, CorrelationKind, Metric};
pub use engine::{simulate, SimContext};
