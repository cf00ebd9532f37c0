//! Fault injection: per-device error conditions and composed scenarios

pub mod injector;
pub mod scenarios;

pub use injector::{
    ErrorConditionConfig, ErrorConditionKind, ErrorInjector, InjectionDecision, InjectorStats,
};
pub use scenarios::{Scenario, ScenarioDescriptor, ScenarioRunner};
