use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;
use crate::types::RouteLocation;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let routing = &self.routing;

        // Uicc2 destinations require the second slot
        if !routing.dual_uicc {
            for (name, spec) in [
                ("default_route", routing.default_route),
                ("isodep_route", routing.isodep_route),
                ("tech_route", routing.tech_route),
            ] {
                if spec.dest == RouteLocation::Uicc2 {
                    anyhow::bail!("{} targets uicc2 but dual_uicc is disabled", name);
                }
            }
            for ep in &self.simulation.endpoints {
                if ep.dest == RouteLocation::Uicc2 {
                    anyhow::bail!("simulated endpoint uicc2 requires dual_uicc");
                }
            }
        }

        // The host is implicitly present; simulating it makes no sense
        for ep in &self.simulation.endpoints {
            if ep.dest == RouteLocation::Host {
                anyhow::bail!("the host cannot be a simulated endpoint");
            }
            if ep.tech_support.is_empty() {
                anyhow::bail!(
                    "simulated endpoint {} must support at least one technology",
                    ep.dest
                );
            }
        }

        if self.controller.commit_timeout.is_zero() {
            anyhow::bail!("commit_timeout must be non-zero");
        }
        if self.controller.ack_timeout.is_zero() {
            anyhow::bail!("ack_timeout must be non-zero");
        }

        info!("configuration validated successfully");
        Ok(())
    }
}
