use serde::Deserialize;
use std::time::Duration;

use crate::types::{PowerMask, RouteLocation, RouteSpec, TechMask};

/// Root configuration for the routing engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Controller link behavior
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Routing policy and defaults
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Logging settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Endpoints seeded into the simulated controller (CLI only)
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Controller link behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Controller generation replaces the legacy ISO7816 protocol route
    /// with a zero-length AID table entry
    #[serde(default = "default_true")]
    pub empty_aid_route: bool,

    /// Per-command acknowledgment timeout
    #[serde(default = "default_ack_timeout", with = "humantime_serde")]
    pub ack_timeout: Duration,

    /// Table-activation response timeout
    #[serde(default = "default_commit_timeout", with = "humantime_serde")]
    pub commit_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            empty_aid_route: true,
            ack_timeout: default_ack_timeout(),
            commit_timeout: default_commit_timeout(),
        }
    }
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_commit_timeout() -> Duration {
    Duration::from_millis(1000)
}

/// Routing policy and default destinations.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Default AID-miss destination and power states
    #[serde(default = "default_aid_miss_route")]
    pub default_route: RouteSpec,

    /// Default ISO-DEP destination and power states
    #[serde(default = "default_isodep_route")]
    pub isodep_route: RouteSpec,

    /// Default technology destination and power states
    #[serde(default = "default_tech_route")]
    pub tech_route: RouteSpec,

    /// Technologies the host is able to listen on
    #[serde(default = "default_host_listen_mask")]
    pub host_listen_tech_mask: TechMask,

    /// Technologies removable elements may be offered
    #[serde(default = "default_offhost_listen_mask")]
    pub offhost_listen_tech_mask: TechMask,

    /// Restrict committed power masks to the switched-on states
    #[serde(default = "default_true")]
    pub strict_power: bool,

    /// Reassign technologies between host and removable elements when the
    /// selected element cannot serve both
    #[serde(default)]
    pub fwd_functionality: bool,

    /// Allow AID route mutation
    #[serde(default = "default_true")]
    pub aid_routing: bool,

    /// Second UICC slot present
    #[serde(default)]
    pub dual_uicc: bool,

    /// Where to send a rule whose configured destination is absent
    #[serde(default)]
    pub fallback: FallbackPolicy,

    /// Power states granted to off-host AID routes when the caller
    /// supplies none
    #[serde(default = "default_offhost_aid_power")]
    pub offhost_aid_power: PowerMask,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_route: default_aid_miss_route(),
            isodep_route: default_isodep_route(),
            tech_route: default_tech_route(),
            host_listen_tech_mask: default_host_listen_mask(),
            offhost_listen_tech_mask: default_offhost_listen_mask(),
            strict_power: true,
            fwd_functionality: false,
            aid_routing: true,
            dual_uicc: false,
            fallback: FallbackPolicy::default(),
            offhost_aid_power: default_offhost_aid_power(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_aid_miss_route() -> RouteSpec {
    RouteSpec::new(RouteLocation::EmbeddedSe, PowerMask::FULL)
}

fn default_isodep_route() -> RouteSpec {
    RouteSpec::new(RouteLocation::Host, PowerMask::FULL)
}

fn default_tech_route() -> RouteSpec {
    RouteSpec::new(RouteLocation::Uicc1, PowerMask::FULL)
}

fn default_host_listen_mask() -> TechMask {
    TechMask::AB
}

fn default_offhost_listen_mask() -> TechMask {
    TechMask::ALL
}

fn default_offhost_aid_power() -> PowerMask {
    PowerMask::SWITCH_ON
}

/// Fallback policy for a configured destination that is not present.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Try the embedded SE first, then the host
    #[default]
    Ese,
    /// Straight to the host
    Host,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON log format
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Endpoints the CLI seeds into its simulated controller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub endpoints: Vec<SimulatedEndpoint>,
}

/// One simulated removable endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedEndpoint {
    /// Destination identity
    pub dest: RouteLocation,

    /// Technologies the endpoint physically supports
    pub tech_support: TechMask,
}
