//! Configuration loading and validation.

mod loader;
mod types;

pub use types::{
    Config, ControllerConfig, FallbackPolicy, RoutingConfig, SimulatedEndpoint, SimulationConfig,
    TelemetryConfig,
};
