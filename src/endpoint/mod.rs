//! Endpoint registry: which destinations exist, what they can listen on,
//! and which of them are mid-recovery.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::types::{RouteLocation, TechMask};

/// Live view of the controller's endpoints.
///
/// The host is implicitly present and always live. Removable elements and
/// the embedded SE appear through discovery events and may drop off the bus;
/// while one is gone, commit traffic toward it is suspended rather than
/// failed.
#[derive(Debug)]
pub struct EndpointRegistry {
    inner: Mutex<Inner>,
    /// Endpoints currently mid-recovery. Watch channel so waiters can park
    /// on membership changes.
    removed_tx: watch::Sender<BTreeSet<RouteLocation>>,
    dual_uicc: bool,
}

#[derive(Debug)]
struct Inner {
    tech_support: BTreeMap<RouteLocation, TechMask>,
    active_uicc: RouteLocation,
}

impl EndpointRegistry {
    pub fn new(dual_uicc: bool) -> EndpointRegistry {
        let (removed_tx, _) = watch::channel(BTreeSet::new());
        EndpointRegistry {
            inner: Mutex::new(Inner {
                tech_support: BTreeMap::new(),
                active_uicc: RouteLocation::Uicc1,
            }),
            removed_tx,
            dual_uicc,
        }
    }

    /// Record a discovery notification for one endpoint.
    pub fn discovered(&self, dest: RouteLocation, tech_support: TechMask) {
        if dest.is_host() {
            return;
        }
        info!(dest = %dest, tech_support = %tech_support, "endpoint discovered");
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tech_support
            .insert(dest, tech_support);
        self.removed_tx.send_modify(|set| {
            set.remove(&dest);
        });
    }

    /// Mark an endpoint as dropped off the bus. Returns true if this
    /// started a recovery (the endpoint was not already removed).
    pub fn removed(&self, dest: RouteLocation) -> bool {
        if dest.is_host() {
            warn!("ignoring removal notification for the host");
            return false;
        }
        warn!(dest = %dest, "endpoint removed, suspending traffic toward it");
        let mut started = false;
        self.removed_tx.send_modify(|set| {
            started = set.insert(dest);
        });
        started
    }

    /// Clear the recovery state for an endpoint. Returns true if it was
    /// actually mid-recovery.
    pub fn restored(&self, dest: RouteLocation) -> bool {
        let mut cleared = false;
        self.removed_tx.send_modify(|set| {
            cleared = set.remove(&dest);
        });
        if cleared {
            info!(dest = %dest, "endpoint restored");
        }
        cleared
    }

    /// Technologies the endpoint can listen on, or `None` when it has
    /// never been discovered. The host is not tracked here; its listen
    /// mask comes from configuration.
    pub fn tech_support(&self, dest: RouteLocation) -> Option<TechMask> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tech_support
            .get(&dest)
            .copied()
    }

    /// Whether routed traffic can reach the destination at all.
    pub fn is_live(&self, dest: RouteLocation) -> bool {
        if dest.is_host() {
            return true;
        }
        if dest == RouteLocation::Uicc2 && !self.dual_uicc {
            return false;
        }
        self.tech_support(dest).is_some_and(|m| !m.is_empty())
    }

    /// Every destination that should receive routing commands: the host
    /// plus every discovered endpoint.
    pub fn known(&self) -> Vec<RouteLocation> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = vec![RouteLocation::Host];
        out.extend(inner.tech_support.keys().copied());
        out
    }

    pub fn is_recovery_ongoing(&self) -> bool {
        !self.removed_tx.borrow().is_empty()
    }

    /// Park until the destination is not mid-recovery. Returns immediately
    /// for a healthy endpoint.
    pub async fn wait_ready(&self, dest: RouteLocation) {
        let mut rx = self.removed_tx.subscribe();
        let _ = rx.wait_for(|set| !set.contains(&dest)).await;
    }

    /// Park until the destination enters recovery. Used to interrupt an
    /// in-flight acknowledgment wait.
    pub async fn wait_recovery_start(&self, dest: RouteLocation) {
        let mut rx = self.removed_tx.subscribe();
        let _ = rx.wait_for(|set| set.contains(&dest)).await;
    }

    /// Select which UICC slot UICC-bound rules resolve to.
    pub fn select_uicc_slot(&self, slot: RouteLocation) -> bool {
        if !slot.is_uicc() {
            warn!(slot = %slot, "slot selection rejected, not a uicc");
            return false;
        }
        if slot == RouteLocation::Uicc2 && !self.dual_uicc {
            warn!("slot selection rejected, second slot not configured");
            return false;
        }
        info!(slot = %slot, "active uicc slot selected");
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_uicc = slot;
        true
    }

    pub fn active_uicc(&self) -> RouteLocation {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_uicc
    }

    /// Map a destination to the one actually addressed: UICC references
    /// follow the active slot, everything else passes through.
    pub fn canonical(&self, dest: RouteLocation) -> RouteLocation {
        if dest.is_uicc() {
            self.active_uicc()
        } else {
            dest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_host_always_live() {
        let reg = EndpointRegistry::new(false);
        assert!(reg.is_live(RouteLocation::Host));
        assert!(!reg.is_live(RouteLocation::EmbeddedSe));
    }

    #[test]
    fn test_discovery_makes_endpoint_live() {
        let reg = EndpointRegistry::new(false);
        reg.discovered(RouteLocation::EmbeddedSe, TechMask::AB);
        assert!(reg.is_live(RouteLocation::EmbeddedSe));
        assert_eq!(reg.tech_support(RouteLocation::EmbeddedSe), Some(TechMask::AB));
    }

    #[test]
    fn test_uicc2_needs_dual_slot() {
        let reg = EndpointRegistry::new(false);
        reg.discovered(RouteLocation::Uicc2, TechMask::ALL);
        assert!(!reg.is_live(RouteLocation::Uicc2));
        assert!(!reg.select_uicc_slot(RouteLocation::Uicc2));

        let reg = EndpointRegistry::new(true);
        reg.discovered(RouteLocation::Uicc2, TechMask::ALL);
        assert!(reg.is_live(RouteLocation::Uicc2));
        assert!(reg.select_uicc_slot(RouteLocation::Uicc2));
        assert_eq!(reg.canonical(RouteLocation::Uicc1), RouteLocation::Uicc2);
    }

    #[test]
    fn test_removal_and_restore_cycle() {
        let reg = EndpointRegistry::new(false);
        reg.discovered(RouteLocation::Uicc1, TechMask::A);
        assert!(!reg.is_recovery_ongoing());

        assert!(reg.removed(RouteLocation::Uicc1));
        assert!(!reg.removed(RouteLocation::Uicc1)); // already removed
        assert!(reg.is_recovery_ongoing());
        assert!(reg.is_live(RouteLocation::Uicc1)); // still known

        assert!(reg.restored(RouteLocation::Uicc1));
        assert!(!reg.is_recovery_ongoing());
    }

    #[tokio::test]
    async fn test_wait_ready_parks_during_recovery() {
        let reg = Arc::new(EndpointRegistry::new(false));
        reg.discovered(RouteLocation::EmbeddedSe, TechMask::AB);
        reg.removed(RouteLocation::EmbeddedSe);

        let waiter = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move { reg.wait_ready(RouteLocation::EmbeddedSe).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        reg.restored(RouteLocation::EmbeddedSe);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_known_includes_host_first() {
        let reg = EndpointRegistry::new(false);
        reg.discovered(RouteLocation::Uicc1, TechMask::B);
        reg.discovered(RouteLocation::EmbeddedSe, TechMask::AB);
        assert_eq!(
            reg.known(),
            vec![
                RouteLocation::Host,
                RouteLocation::EmbeddedSe,
                RouteLocation::Uicc1
            ]
        );
    }
}
