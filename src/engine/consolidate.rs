//! Consolidation: fold the two rule tables into one record per
//! destination, the shape the controller's per-destination commands take.

use std::collections::BTreeMap;
use std::fmt;

use super::tables::RuleTables;
use crate::controller::RouteMasks;
use crate::types::RouteLocation;

/// Technology and protocol bitmasks for one destination, one mask per
/// power state. Technology and protocol namespaces stay separate: the
/// controller routes them through independent commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsolidatedEntry {
    pub tech: RouteMasks,
    pub proto: RouteMasks,
}

impl ConsolidatedEntry {
    pub fn is_empty(&self) -> bool {
        self.tech.is_zero() && self.proto.is_zero()
    }
}

/// Fold every enabled rule row into its destination's entry. Rows
/// targeting the same destination and power state compose by union.
pub fn consolidate(tables: &RuleTables) -> BTreeMap<RouteLocation, ConsolidatedEntry> {
    let mut out: BTreeMap<RouteLocation, ConsolidatedEntry> = BTreeMap::new();

    for (tech, row) in &tables.tech {
        if !row.enabled {
            continue;
        }
        let masks = RouteMasks::from_rule(tech.mask().bits(), row.power);
        out.entry(row.dest).or_default().tech.merge(&masks);
    }

    for (proto, row) in &tables.proto {
        if !row.enabled {
            continue;
        }
        let masks = RouteMasks::from_rule(proto.mask().bits(), row.power);
        out.entry(row.dest).or_default().proto.merge(&masks);
    }

    out
}

/// Human-readable dump of a consolidated table, one destination per line.
pub struct TableDump<'a>(pub &'a BTreeMap<RouteLocation, ConsolidatedEntry>);

impl fmt::Display for TableDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(empty)");
        }
        for (i, (dest, entry)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(
                f,
                "{:6} tech[{}] proto[{}]",
                dest.to_string(),
                entry.tech,
                entry.proto
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tables::RuleEntry;
    use crate::types::{PowerMask, PowerState, Protocol, Technology};

    fn tables() -> RuleTables {
        let mut t = RuleTables::new();
        t.tech.insert(
            Technology::A,
            RuleEntry {
                dest: RouteLocation::Uicc1,
                power: PowerMask::STRICT,
                enabled: true,
            },
        );
        t.tech.insert(
            Technology::B,
            RuleEntry {
                dest: RouteLocation::Uicc1,
                power: PowerMask::SWITCH_ON,
                enabled: true,
            },
        );
        t.proto.insert(
            Protocol::IsoDep,
            RuleEntry {
                dest: RouteLocation::Host,
                power: PowerMask::STRICT,
                enabled: true,
            },
        );
        t
    }

    #[test]
    fn test_rows_accumulate_by_union() {
        let out = consolidate(&tables());
        let uicc = &out[&RouteLocation::Uicc1];

        // A active in both strict states, B only while unlocked
        assert_eq!(uicc.tech.switch_on, 0x03);
        assert_eq!(uicc.tech.screen_lock, 0x01);
        assert!(uicc.proto.is_zero());

        let host = &out[&RouteLocation::Host];
        assert_eq!(host.proto.switch_on, Protocol::IsoDep.mask().bits());
        assert!(host.tech.is_zero());
    }

    #[test]
    fn test_disabled_rows_contribute_nothing() {
        let mut t = tables();
        for row in t.tech.values_mut() {
            row.enabled = false;
        }
        let out = consolidate(&t);
        assert!(!out.contains_key(&RouteLocation::Uicc1));
    }

    #[test]
    fn test_every_enabled_bit_is_conserved() {
        let t = tables();
        let out = consolidate(&t);
        for (tech, row) in &t.tech {
            if !row.enabled {
                continue;
            }
            let entry = &out[&row.dest];
            for state in row.power.states() {
                assert_ne!(
                    entry.tech.get(state) & tech.mask().bits(),
                    0,
                    "bit lost for {} in {:?}",
                    tech,
                    state
                );
            }
        }
    }

    #[test]
    fn test_no_double_counting_across_destinations() {
        let out = consolidate(&tables());
        // two tech rows enabled in switch-on, so at most two bits set
        let total: u32 = out
            .values()
            .map(|e| e.tech.get(PowerState::SwitchOn).count_ones())
            .sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_dump_renders_every_destination() {
        let out = consolidate(&tables());
        let dump = TableDump(&out).to_string();
        assert!(dump.contains("host"));
        assert!(dump.contains("uicc1"));
    }
}
