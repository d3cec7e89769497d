//! Route-location, technology, protocol and power-state vocabulary.

use std::fmt;

use serde::Deserialize;

/// Maximum AID length accepted by the controller (ISO 7816-4).
pub const MAX_AID_LEN: usize = 16;

/// A destination that can receive routed listen-mode traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLocation {
    /// Host processor (device host / HCE).
    Host,
    /// Embedded secure element.
    #[serde(rename = "ese")]
    EmbeddedSe,
    /// First UICC slot.
    Uicc1,
    /// Second UICC slot. Only valid with dual-UICC support enabled.
    Uicc2,
}

impl RouteLocation {
    /// All destinations the controller knows about, host first.
    pub const ALL: [RouteLocation; 4] = [
        RouteLocation::Host,
        RouteLocation::EmbeddedSe,
        RouteLocation::Uicc1,
        RouteLocation::Uicc2,
    ];

    /// Whether this destination is a removable secure element.
    pub fn is_uicc(self) -> bool {
        matches!(self, RouteLocation::Uicc1 | RouteLocation::Uicc2)
    }

    pub fn is_host(self) -> bool {
        self == RouteLocation::Host
    }
}

impl fmt::Display for RouteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteLocation::Host => "host",
            RouteLocation::EmbeddedSe => "ese",
            RouteLocation::Uicc1 => "uicc1",
            RouteLocation::Uicc2 => "uicc2",
        };
        f.write_str(s)
    }
}

/// Listen-mode RF technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Technology {
    A,
    B,
    F,
}

impl Technology {
    pub const ALL: [Technology; 3] = [Technology::A, Technology::B, Technology::F];

    pub const fn mask(self) -> TechMask {
        match self {
            Technology::A => TechMask::A,
            Technology::B => TechMask::B,
            Technology::F => TechMask::F,
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Technology::A => "A",
            Technology::B => "B",
            Technology::F => "F",
        };
        f.write_str(s)
    }
}

/// Bitmask over listen technologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct TechMask(u8);

impl TechMask {
    pub const NONE: TechMask = TechMask(0x00);
    pub const A: TechMask = TechMask(0x01);
    pub const B: TechMask = TechMask(0x02);
    pub const F: TechMask = TechMask(0x04);
    pub const AB: TechMask = TechMask(0x03);
    pub const ALL: TechMask = TechMask(0x07);

    pub const fn new(bits: u8) -> TechMask {
        TechMask(bits & 0x07)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, tech: Technology) -> bool {
        self.0 & tech.mask().0 != 0
    }

    pub const fn intersects(self, other: TechMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn and(self, other: TechMask) -> TechMask {
        TechMask(self.0 & other.0)
    }

    pub const fn or(self, other: TechMask) -> TechMask {
        TechMask(self.0 | other.0)
    }
}

impl fmt::Display for TechMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Listen-mode protocol routed through the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// Felica T3T, only offered on the host in the unlocked-on state.
    T3t,
    /// ISO-DEP (ISO 14443-4).
    IsoDep,
    /// Legacy ISO 7816 default-application route. Newer controller
    /// generations replace it with an empty-AID table entry.
    Iso7816,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::T3t, Protocol::IsoDep, Protocol::Iso7816];

    pub fn mask(self) -> ProtoMask {
        match self {
            Protocol::T3t => ProtoMask::T3T,
            Protocol::IsoDep => ProtoMask::ISO_DEP,
            Protocol::Iso7816 => ProtoMask::ISO_7816,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::T3t => "T3T",
            Protocol::IsoDep => "ISO-DEP",
            Protocol::Iso7816 => "ISO7816",
        };
        f.write_str(s)
    }
}

/// Bitmask over routable protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtoMask(u8);

impl ProtoMask {
    pub const NONE: ProtoMask = ProtoMask(0x00);
    pub const T3T: ProtoMask = ProtoMask(0x01);
    pub const ISO_DEP: ProtoMask = ProtoMask(0x02);
    pub const ISO_7816: ProtoMask = ProtoMask(0x04);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn or(self, other: ProtoMask) -> ProtoMask {
        ProtoMask(self.0 | other.0)
    }
}

impl fmt::Display for ProtoMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Device power/screen condition under which a route is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PowerState {
    SwitchOn,
    SwitchOff,
    BatteryOff,
    ScreenOff,
    ScreenLock,
    ScreenOffLock,
}

impl PowerState {
    pub const ALL: [PowerState; 6] = [
        PowerState::SwitchOn,
        PowerState::SwitchOff,
        PowerState::BatteryOff,
        PowerState::ScreenOff,
        PowerState::ScreenLock,
        PowerState::ScreenOffLock,
    ];

    pub const fn bit(self) -> u8 {
        match self {
            PowerState::SwitchOn => 0x01,
            PowerState::SwitchOff => 0x02,
            PowerState::BatteryOff => 0x04,
            PowerState::ScreenOff => 0x08,
            PowerState::ScreenLock => 0x10,
            PowerState::ScreenOffLock => 0x20,
        }
    }
}

/// Set of power states in which a rule is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct PowerMask(u8);

impl PowerMask {
    pub const NONE: PowerMask = PowerMask(0x00);
    pub const SWITCH_ON: PowerMask = PowerMask(0x01);
    pub const FULL: PowerMask = PowerMask(0x3F);
    /// Strict routing policy: switched-on states only, locked or unlocked.
    pub const STRICT: PowerMask = PowerMask(0x11);
    /// States the host can never serve.
    pub const HOST_FORBIDDEN: PowerMask = PowerMask(0x06);

    pub const fn new(bits: u8) -> PowerMask {
        PowerMask(bits & 0x3F)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, state: PowerState) -> bool {
        self.0 & state.bit() != 0
    }

    pub const fn and(self, other: PowerMask) -> PowerMask {
        PowerMask(self.0 & other.0)
    }

    pub const fn or(self, other: PowerMask) -> PowerMask {
        PowerMask(self.0 | other.0)
    }

    /// Strip the switched-off and battery-off states. Applied to every
    /// host-bound rule: the host cannot listen without power.
    pub const fn for_host(self) -> PowerMask {
        PowerMask(self.0 & !Self::HOST_FORBIDDEN.0)
    }

    pub fn states(self) -> impl Iterator<Item = PowerState> {
        PowerState::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl fmt::Display for PowerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// A destination paired with the power states it should serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RouteSpec {
    pub dest: RouteLocation,
    pub power: PowerMask,
}

impl RouteSpec {
    pub fn new(dest: RouteLocation, power: PowerMask) -> RouteSpec {
        RouteSpec { dest, power }
    }
}

impl fmt::Display for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dest, self.power)
    }
}
