//! Forward-functionality resolution.
//!
//! Single-technology removable elements would otherwise silence the
//! technology they cannot serve. This pass hands the missing technology to
//! the host so a reader presenting either technology still gets an answer.

use tracing::{debug, info};

use super::tables::{RuleEntry, RuleTables};
use crate::types::{PowerMask, RouteLocation, TechMask, Technology};

/// Reassign technologies between the host and the removable element
/// carrying the technology rows.
///
/// `removable` is the destination of the technology rows; the pass is only
/// meaningful when that destination is off-host. When the element supports
/// both A and B this is a deliberate no-op: single-technology filtering is
/// not available in that configuration.
pub fn resolve_forwarding(
    tables: &mut RuleTables,
    host_listen: TechMask,
    removable: RouteLocation,
    removable_support: TechMask,
) {
    if removable.is_host() {
        return;
    }

    let supports_a = removable_support.contains(Technology::A);
    let supports_b = removable_support.contains(Technology::B);
    if supports_a && supports_b {
        debug!(dest = %removable, "element serves both technologies, nothing to forward");
        return;
    }

    match host_listen.and(TechMask::AB) {
        TechMask::A => resolve_single(tables, Technology::A, supports_a),
        TechMask::B => resolve_single(tables, Technology::B, supports_b),
        TechMask::AB => {
            // Host listens on both: claim whichever one the element lacks.
            if supports_a && !supports_b {
                reassign_to_host(tables, Technology::B);
            } else if supports_b && !supports_a {
                reassign_to_host(tables, Technology::A);
            }
        }
        _ => {}
    }
}

/// Host-listen is restricted to one technology.
fn resolve_single(tables: &mut RuleTables, wanted: Technology, element_has_it: bool) {
    let complement = match wanted {
        Technology::A => Technology::B,
        Technology::B => Technology::A,
        Technology::F => return,
    };
    if element_has_it {
        // The removable path already serves the wanted technology; do not
        // also claim it for the host, just drop the complement.
        if let Some(row) = tables.tech.get_mut(&complement) {
            if row.enabled {
                debug!(tech = %complement, "disabling complementary technology");
                row.enabled = false;
            }
        }
    } else {
        reassign_to_host(tables, wanted);
    }
}

fn reassign_to_host(tables: &mut RuleTables, tech: Technology) {
    info!(tech = %tech, "forwarding technology to the host");
    tables.tech.insert(
        tech,
        RuleEntry {
            dest: RouteLocation::Host,
            power: PowerMask::STRICT,
            enabled: true,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointRegistry;
    use crate::engine::tables::CompileParams;
    use crate::types::RouteSpec;

    fn compiled(host_listen: TechMask, uicc_support: TechMask) -> RuleTables {
        let reg = EndpointRegistry::new(false);
        reg.discovered(RouteLocation::Uicc1, uicc_support);
        let params = CompileParams {
            default_route: RouteSpec::new(RouteLocation::Uicc1, PowerMask::FULL),
            isodep_route: RouteSpec::new(RouteLocation::Host, PowerMask::FULL),
            tech_route: RouteSpec::new(RouteLocation::Uicc1, PowerMask::FULL),
            host_listen,
            offhost_listen: TechMask::ALL,
            strict_power: true,
            legacy_iso7816: false,
        };
        let mut tables = RuleTables::new();
        tables.compile(&params, &reg);
        resolve_forwarding(&mut tables, host_listen, RouteLocation::Uicc1, uicc_support);
        tables
    }

    #[test]
    fn test_missing_technology_forwarded_to_host() {
        // host wants A, element only has B
        let tables = compiled(TechMask::A, TechMask::B);

        let a = tables.tech[&Technology::A];
        assert!(a.enabled);
        assert_eq!(a.dest, RouteLocation::Host);
        assert_eq!(a.power, PowerMask::STRICT);

        let b = tables.tech[&Technology::B];
        assert!(b.enabled);
        assert_eq!(b.dest, RouteLocation::Uicc1);
    }

    #[test]
    fn test_served_technology_stays_offhost() {
        // host wants A, element has A: element keeps it, B is dropped
        let tables = compiled(TechMask::A, TechMask::A);

        let a = tables.tech[&Technology::A];
        assert!(a.enabled);
        assert_eq!(a.dest, RouteLocation::Uicc1);
        assert!(!tables.tech[&Technology::B].enabled);
    }

    #[test]
    fn test_dual_listen_claims_the_gap() {
        let tables = compiled(TechMask::AB, TechMask::A);

        assert_eq!(tables.tech[&Technology::A].dest, RouteLocation::Uicc1);
        let b = tables.tech[&Technology::B];
        assert!(b.enabled);
        assert_eq!(b.dest, RouteLocation::Host);
    }

    #[test]
    fn test_dual_support_is_a_no_op() {
        let before = {
            let reg = EndpointRegistry::new(false);
            reg.discovered(RouteLocation::Uicc1, TechMask::AB);
            let params = CompileParams {
                default_route: RouteSpec::new(RouteLocation::Uicc1, PowerMask::FULL),
                isodep_route: RouteSpec::new(RouteLocation::Host, PowerMask::FULL),
                tech_route: RouteSpec::new(RouteLocation::Uicc1, PowerMask::FULL),
                host_listen: TechMask::A,
                offhost_listen: TechMask::ALL,
                strict_power: true,
                legacy_iso7816: false,
            };
            let mut tables = RuleTables::new();
            tables.compile(&params, &reg);
            tables
        };
        let mut after = before.clone();
        resolve_forwarding(&mut after, TechMask::A, RouteLocation::Uicc1, TechMask::AB);
        assert_eq!(before, after);
    }

    #[test]
    fn test_host_destination_is_a_no_op() {
        let mut tables = RuleTables::new();
        let before = tables.clone();
        resolve_forwarding(&mut tables, TechMask::A, RouteLocation::Host, TechMask::NONE);
        assert_eq!(before, tables);
    }
}
