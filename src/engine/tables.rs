//! Rule tables: one row per technology and one per protocol, populated
//! from configuration plus live discovery facts.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::endpoint::EndpointRegistry;
use crate::types::{PowerMask, Protocol, RouteLocation, RouteSpec, TechMask, Technology};

/// One routing rule row. Disabled rows keep their slot but contribute
/// nothing to consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleEntry {
    pub dest: RouteLocation,
    pub power: PowerMask,
    pub enabled: bool,
}

impl RuleEntry {
    const DISABLED: RuleEntry = RuleEntry {
        dest: RouteLocation::Host,
        power: PowerMask::NONE,
        enabled: false,
    };
}

/// Inputs to one compilation pass. Route specs arrive already resolved
/// against the live endpoint set.
#[derive(Debug, Clone)]
pub struct CompileParams {
    /// AID-miss destination, also the legacy ISO7816 destination
    pub default_route: RouteSpec,
    /// ISO-DEP destination
    pub isodep_route: RouteSpec,
    /// Destination for the technology rows
    pub tech_route: RouteSpec,
    /// Technologies the host can listen on
    pub host_listen: TechMask,
    /// Technologies removable elements may be offered
    pub offhost_listen: TechMask,
    /// Mask committed power down to the switched-on states
    pub strict_power: bool,
    /// Controller generation still wants a blanket ISO7816 protocol route
    pub legacy_iso7816: bool,
}

/// The two rule tables, keyed by technology and protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTables {
    pub tech: BTreeMap<Technology, RuleEntry>,
    pub proto: BTreeMap<Protocol, RuleEntry>,
}

impl RuleTables {
    pub fn new() -> RuleTables {
        let mut tables = RuleTables {
            tech: BTreeMap::new(),
            proto: BTreeMap::new(),
        };
        tables.reset();
        tables
    }

    /// Return every row to its disabled state.
    pub fn reset(&mut self) {
        for tech in Technology::ALL {
            self.tech.insert(tech, RuleEntry::DISABLED);
        }
        for proto in Protocol::ALL {
            self.proto.insert(proto, RuleEntry::DISABLED);
        }
    }

    /// Populate the rows from resolved routes and live endpoint facts.
    pub fn compile(&mut self, params: &CompileParams, registry: &EndpointRegistry) {
        self.reset();

        for tech in Technology::ALL {
            let row = self.compile_tech_row(tech, params, registry);
            debug!(tech = %tech, dest = %row.dest, power = %row.power,
                   enabled = row.enabled, "compiled technology row");
            self.tech.insert(tech, row);
        }

        // T3T is pinned to the host in the unlocked-on state, and only
        // offered at all when the host can listen on technology F.
        self.proto.insert(
            Protocol::T3t,
            RuleEntry {
                dest: RouteLocation::Host,
                power: PowerMask::SWITCH_ON,
                enabled: params.host_listen.contains(Technology::F),
            },
        );

        let isodep = self.compile_proto_row(params.isodep_route, params, registry);
        debug!(proto = %Protocol::IsoDep, dest = %isodep.dest, power = %isodep.power,
               enabled = isodep.enabled, "compiled protocol row");
        self.proto.insert(Protocol::IsoDep, isodep);

        // Newer controller generations take an empty-AID table entry
        // instead of a blanket ISO7816 protocol route.
        if params.legacy_iso7816 {
            let row = self.compile_proto_row(params.default_route, params, registry);
            self.proto.insert(Protocol::Iso7816, row);
        }
    }

    fn compile_tech_row(
        &self,
        tech: Technology,
        params: &CompileParams,
        registry: &EndpointRegistry,
    ) -> RuleEntry {
        let dest = params.tech_route.dest;
        let enabled = if dest.is_host() {
            params.host_listen.contains(tech)
        } else {
            registry
                .tech_support(dest)
                .unwrap_or(TechMask::NONE)
                .and(params.offhost_listen)
                .contains(tech)
        };
        let power = self.effective_power(params.tech_route.power, dest, params);
        RuleEntry {
            dest,
            power,
            enabled: enabled && !power.is_empty(),
        }
    }

    fn compile_proto_row(
        &self,
        spec: RouteSpec,
        params: &CompileParams,
        registry: &EndpointRegistry,
    ) -> RuleEntry {
        let enabled = spec.dest.is_host() || registry.is_live(spec.dest);
        let power = self.effective_power(spec.power, spec.dest, params);
        RuleEntry {
            dest: spec.dest,
            power,
            enabled: enabled && !power.is_empty(),
        }
    }

    fn effective_power(
        &self,
        power: PowerMask,
        dest: RouteLocation,
        params: &CompileParams,
    ) -> PowerMask {
        let mut power = power;
        if params.strict_power {
            power = power.and(PowerMask::STRICT);
        }
        if dest.is_host() {
            power = power.for_host();
        }
        power
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tech, row) in &self.tech {
            writeln!(
                f,
                "tech  {:8} dest={} power={} enabled={}",
                tech.to_string(),
                row.dest,
                row.power,
                row.enabled
            )?;
        }
        for (proto, row) in &self.proto {
            writeln!(
                f,
                "proto {:8} dest={} power={} enabled={}",
                proto.to_string(),
                row.dest,
                row.power,
                row.enabled
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CompileParams {
        CompileParams {
            default_route: RouteSpec::new(RouteLocation::EmbeddedSe, PowerMask::FULL),
            isodep_route: RouteSpec::new(RouteLocation::Host, PowerMask::FULL),
            tech_route: RouteSpec::new(RouteLocation::Uicc1, PowerMask::FULL),
            host_listen: TechMask::AB,
            offhost_listen: TechMask::ALL,
            strict_power: true,
            legacy_iso7816: false,
        }
    }

    fn registry() -> EndpointRegistry {
        let reg = EndpointRegistry::new(false);
        reg.discovered(RouteLocation::EmbeddedSe, TechMask::AB);
        reg.discovered(RouteLocation::Uicc1, TechMask::A);
        reg
    }

    #[test]
    fn test_reset_disables_every_row() {
        let mut tables = RuleTables::new();
        tables.compile(&params(), &registry());
        tables.reset();
        assert!(tables.tech.values().all(|e| !e.enabled));
        assert!(tables.proto.values().all(|e| !e.enabled));
    }

    #[test]
    fn test_tech_rows_follow_endpoint_support() {
        let mut tables = RuleTables::new();
        tables.compile(&params(), &registry());

        // uicc1 supports A only
        assert!(tables.tech[&Technology::A].enabled);
        assert!(!tables.tech[&Technology::B].enabled);
        assert!(!tables.tech[&Technology::F].enabled);
        assert_eq!(tables.tech[&Technology::A].dest, RouteLocation::Uicc1);
    }

    #[test]
    fn test_strict_power_masks_rows() {
        let mut tables = RuleTables::new();
        tables.compile(&params(), &registry());
        assert_eq!(tables.tech[&Technology::A].power, PowerMask::STRICT);

        let mut relaxed = params();
        relaxed.strict_power = false;
        tables.compile(&relaxed, &registry());
        assert_eq!(tables.tech[&Technology::A].power, PowerMask::FULL);
    }

    #[test]
    fn test_host_rows_lose_unpowered_states() {
        let mut p = params();
        p.strict_power = false;
        let mut tables = RuleTables::new();
        tables.compile(&p, &registry());
        // host-bound ISO-DEP cannot be active without power
        assert_eq!(
            tables.proto[&Protocol::IsoDep].power,
            PowerMask::FULL.for_host()
        );
    }

    #[test]
    fn test_t3t_pinned_to_host_unlocked() {
        let mut p = params();
        p.host_listen = TechMask::ALL;
        let mut tables = RuleTables::new();
        tables.compile(&p, &registry());

        let t3t = tables.proto[&Protocol::T3t];
        assert!(t3t.enabled);
        assert_eq!(t3t.dest, RouteLocation::Host);
        assert_eq!(t3t.power, PowerMask::SWITCH_ON);

        // no F listening on the host, no T3T
        p.host_listen = TechMask::AB;
        tables.compile(&p, &registry());
        assert!(!tables.proto[&Protocol::T3t].enabled);
    }

    #[test]
    fn test_legacy_iso7816_row() {
        let mut p = params();
        p.legacy_iso7816 = true;
        let mut tables = RuleTables::new();
        tables.compile(&p, &registry());

        let row = tables.proto[&Protocol::Iso7816];
        assert!(row.enabled);
        assert_eq!(row.dest, RouteLocation::EmbeddedSe);

        p.legacy_iso7816 = false;
        tables.compile(&p, &registry());
        assert!(!tables.proto[&Protocol::Iso7816].enabled);
    }
}
