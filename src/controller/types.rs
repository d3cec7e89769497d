use std::fmt;

use crate::types::{PowerMask, PowerState, RouteLocation, TechMask};

/// Status carried by a controller acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Command accepted
    Ok,
    /// Command rejected with a controller status code
    Rejected(u8),
    /// AID routing table has no room left
    BufferFull,
}

impl CommandStatus {
    pub fn is_ok(self) -> bool {
        self == CommandStatus::Ok
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Ok => f.write_str("ok"),
            CommandStatus::Rejected(code) => write!(f, "rejected(0x{:02x})", code),
            CommandStatus::BufferFull => f.write_str("buffer-full"),
        }
    }
}

/// Six per-power-state masks, the shape of a tech-route or proto-route
/// command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteMasks {
    pub switch_on: u8,
    pub switch_off: u8,
    pub battery_off: u8,
    pub screen_lock: u8,
    pub screen_off: u8,
    pub screen_off_lock: u8,
}

impl RouteMasks {
    pub const ZERO: RouteMasks = RouteMasks {
        switch_on: 0,
        switch_off: 0,
        battery_off: 0,
        screen_lock: 0,
        screen_off: 0,
        screen_off_lock: 0,
    };

    /// Expand one rule: the value mask is placed in every power state the
    /// rule is active in.
    pub fn from_rule(value: u8, power: PowerMask) -> RouteMasks {
        let mut masks = RouteMasks::ZERO;
        for state in power.states() {
            *masks.get_mut(state) |= value;
        }
        masks
    }

    pub fn get(&self, state: PowerState) -> u8 {
        match state {
            PowerState::SwitchOn => self.switch_on,
            PowerState::SwitchOff => self.switch_off,
            PowerState::BatteryOff => self.battery_off,
            PowerState::ScreenLock => self.screen_lock,
            PowerState::ScreenOff => self.screen_off,
            PowerState::ScreenOffLock => self.screen_off_lock,
        }
    }

    pub fn get_mut(&mut self, state: PowerState) -> &mut u8 {
        match state {
            PowerState::SwitchOn => &mut self.switch_on,
            PowerState::SwitchOff => &mut self.switch_off,
            PowerState::BatteryOff => &mut self.battery_off,
            PowerState::ScreenLock => &mut self.screen_lock,
            PowerState::ScreenOff => &mut self.screen_off,
            PowerState::ScreenOffLock => &mut self.screen_off_lock,
        }
    }

    /// Accumulate another set of masks by union.
    pub fn merge(&mut self, other: &RouteMasks) {
        for state in PowerState::ALL {
            *self.get_mut(state) |= other.get(state);
        }
    }

    /// Zero every mask except switch-on. Secure-NFC policy.
    pub fn switch_on_only(&self) -> RouteMasks {
        RouteMasks {
            switch_on: self.switch_on,
            ..RouteMasks::ZERO
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == RouteMasks::ZERO
    }
}

impl fmt::Display for RouteMasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "on=0x{:02x} off=0x{:02x} batt=0x{:02x} lock=0x{:02x} scroff=0x{:02x} scrofflock=0x{:02x}",
            self.switch_on,
            self.switch_off,
            self.battery_off,
            self.screen_lock,
            self.screen_off,
            self.screen_off_lock
        )
    }
}

/// Command issued to the controller. Each command is followed by exactly
/// one matching [`ControllerEvent`], except where noted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the technology routing masks for one destination
    SetTechRoute {
        dest: RouteLocation,
        routes: RouteMasks,
    },
    /// Replace the protocol routing masks for one destination
    SetProtoRoute {
        dest: RouteLocation,
        routes: RouteMasks,
    },
    /// Add one AID binding to the controller-resident table
    AddAidRoute {
        aid: Vec<u8>,
        dest: RouteLocation,
        power: PowerMask,
        category: u8,
    },
    /// Remove one AID binding
    RemoveAidRoute { aid: Vec<u8> },
    /// Remove every AID binding
    ClearAidRoutes,
    /// Activate the staged table
    ActivateTableNow,
}

impl Command {
    /// Destination the command targets, if any.
    pub fn dest(&self) -> Option<RouteLocation> {
        match self {
            Command::SetTechRoute { dest, .. }
            | Command::SetProtoRoute { dest, .. }
            | Command::AddAidRoute { dest, .. } => Some(*dest),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetTechRoute { dest, routes } => {
                write!(f, "set-tech-route dest={} {}", dest, routes)
            }
            Command::SetProtoRoute { dest, routes } => {
                write!(f, "set-proto-route dest={} {}", dest, routes)
            }
            Command::AddAidRoute {
                aid, dest, power, ..
            } => {
                write!(f, "add-aid len={} dest={} power={}", aid.len(), dest, power)
            }
            Command::RemoveAidRoute { aid } => write!(f, "remove-aid len={}", aid.len()),
            Command::ClearAidRoutes => f.write_str("clear-aid-routes"),
            Command::ActivateTableNow => f.write_str("activate-table"),
        }
    }
}

/// Asynchronous event delivered by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Acknowledgment of [`Command::SetTechRoute`]
    TechRouteSet { status: CommandStatus },
    /// Acknowledgment of [`Command::SetProtoRoute`]
    ProtoRouteSet { status: CommandStatus },
    /// Acknowledgment of [`Command::AddAidRoute`]
    AidAdded { status: CommandStatus },
    /// Acknowledgment of [`Command::RemoveAidRoute`] / [`Command::ClearAidRoutes`]
    AidRemoved { status: CommandStatus },
    /// The staged table is live
    TableActivated,
    /// Endpoint discovery completed for one endpoint
    EndpointDiscovered {
        dest: RouteLocation,
        tech_support: TechMask,
    },
    /// Endpoint dropped off the bus
    EndpointRemoved { dest: RouteLocation },
    /// A previously removed endpoint recovered
    EndpointRestored { dest: RouteLocation },
}

impl ControllerEvent {
    /// The acknowledgment status, for events that acknowledge a command.
    pub fn ack_status(&self) -> Option<CommandStatus> {
        match self {
            ControllerEvent::TechRouteSet { status }
            | ControllerEvent::ProtoRouteSet { status }
            | ControllerEvent::AidAdded { status }
            | ControllerEvent::AidRemoved { status } => Some(*status),
            ControllerEvent::TableActivated => Some(CommandStatus::Ok),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_masks_from_rule() {
        let masks = RouteMasks::from_rule(0x01, PowerMask::STRICT);
        assert_eq!(masks.switch_on, 0x01);
        assert_eq!(masks.screen_lock, 0x01);
        assert_eq!(masks.switch_off, 0x00);
        assert_eq!(masks.battery_off, 0x00);
    }

    #[test]
    fn test_route_masks_merge_is_union() {
        let mut a = RouteMasks::from_rule(0x01, PowerMask::FULL);
        let b = RouteMasks::from_rule(0x02, PowerMask::STRICT);
        a.merge(&b);
        assert_eq!(a.switch_on, 0x03);
        assert_eq!(a.screen_lock, 0x03);
        assert_eq!(a.switch_off, 0x01);
    }

    #[test]
    fn test_secure_masking() {
        let masks = RouteMasks::from_rule(0x04, PowerMask::FULL).switch_on_only();
        assert_eq!(masks.switch_on, 0x04);
        assert!(RouteMasks { switch_on: 0, ..masks }.is_zero());
    }

    #[test]
    fn test_status_is_ok() {
        assert!(CommandStatus::Ok.is_ok());
        assert!(!CommandStatus::BufferFull.is_ok());
        assert!(!CommandStatus::Rejected(0x03).is_ok());
    }

    #[test]
    fn test_ack_status() {
        let ev = ControllerEvent::AidAdded {
            status: CommandStatus::BufferFull,
        };
        assert_eq!(ev.ack_status(), Some(CommandStatus::BufferFull));
        let ev = ControllerEvent::EndpointRemoved {
            dest: RouteLocation::Uicc1,
        };
        assert_eq!(ev.ack_status(), None);
    }
}
