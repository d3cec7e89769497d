//! AID route mutation. The table itself lives on the controller; this
//! side validates, resolves destinations, and issues the commands.

use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use super::Shared;
use crate::controller::{Command, CommandStatus};
use crate::types::{PowerMask, RouteLocation, RouteSpec, TechMask, MAX_AID_LEN};

/// Category byte marking the zero-length entry as a prefix match, so it
/// catches every selection no explicit AID claims.
const EMPTY_AID_QUALIFIER: u8 = 0x10;

impl Shared {
    pub(crate) async fn add_aid(
        &self,
        aid: Vec<u8>,
        dest: RouteLocation,
        power: PowerMask,
        category: u8,
    ) -> bool {
        if !self.aid_routing.load(Ordering::SeqCst) {
            warn!("aid routing is administratively disabled");
            return false;
        }
        if aid.is_empty() || aid.len() > MAX_AID_LEN {
            warn!(len = aid.len(), "rejecting implausible aid length");
            return false;
        }

        let mut dest = self.registry.canonical(dest);
        if !self.registry.is_live(dest) {
            debug!(dest = %dest, "destination not present, falling back to the host");
            dest = RouteLocation::Host;
        }

        let mut power = power;
        if power.is_empty() {
            power = if dest.is_host() {
                PowerMask::STRICT
            } else {
                self.offhost_aid_power
            };
        }
        if dest.is_host() {
            power = power.for_host();
        }
        if self.secure_nfc.load(Ordering::SeqCst) {
            power = power.and(PowerMask::SWITCH_ON);
        }

        let cmd = Command::AddAidRoute {
            aid,
            dest,
            power,
            category,
        };
        match self.issue_and_wait(cmd, self.ack_timeout).await {
            Some(CommandStatus::Ok) => true,
            // the table-full notification goes out on the event bus; the
            // caller decides whether to evict and retry
            Some(CommandStatus::BufferFull) => {
                warn!("aid table is full");
                false
            }
            Some(status) => {
                warn!(status = %status, "aid add rejected");
                false
            }
            None => {
                warn!("aid add unacknowledged");
                false
            }
        }
    }

    pub(crate) async fn remove_aid(&self, aid: Vec<u8>) -> bool {
        if aid.is_empty() || aid.len() > MAX_AID_LEN {
            warn!(len = aid.len(), "rejecting implausible aid length");
            return false;
        }
        self.issue_and_wait(Command::RemoveAidRoute { aid }, self.ack_timeout)
            .await
            .map_or(false, CommandStatus::is_ok)
    }

    pub(crate) async fn clear_aids(&self) -> bool {
        self.issue_and_wait(Command::ClearAidRoutes, self.ack_timeout)
            .await
            .map_or(false, CommandStatus::is_ok)
    }

    /// Install the zero-length AID entry newer controller generations use
    /// in place of a blanket ISO7816 protocol route.
    pub(crate) async fn set_empty_aid_entry(&self, spec: RouteSpec, secure: bool) {
        let dest = spec.dest;
        if !dest.is_host() {
            let support = self.registry.tech_support(dest).unwrap_or(TechMask::NONE);
            if !support.intersects(TechMask::AB) {
                debug!(dest = %dest, "skipping empty-aid entry, destination serves neither A nor B");
                return;
            }
        }

        let mut power = spec.power;
        if dest.is_host() {
            power = power.for_host();
        }
        if secure {
            power = power.and(PowerMask::SWITCH_ON);
        }

        let cmd = Command::AddAidRoute {
            aid: Vec::new(),
            dest,
            power,
            category: EMPTY_AID_QUALIFIER,
        };
        match self.issue_and_wait(cmd, self.ack_timeout).await {
            Some(CommandStatus::Ok) => debug!(dest = %dest, "empty-aid entry installed"),
            Some(status) => warn!(status = %status, "empty-aid entry rejected"),
            None => warn!("empty-aid entry unacknowledged"),
        }
    }
}
