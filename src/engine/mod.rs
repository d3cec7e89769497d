//! The routing engine: compiles rule tables, consolidates them per
//! destination, and commits the result to the controller.

mod aid;
mod commit;
mod consolidate;
mod fwd;
mod tables;

pub use commit::CommitPhase;
pub use consolidate::{consolidate, ConsolidatedEntry, TableDump};
pub use fwd::resolve_forwarding;
pub use tables::{CompileParams, RuleEntry, RuleTables};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{Config, FallbackPolicy, RoutingConfig};
use crate::controller::{AckSlot, CommandStatus, ControllerEvent, ControllerLink};
use crate::endpoint::EndpointRegistry;
use crate::events::{EngineEvent, EventBus};
use crate::types::{PowerMask, RouteLocation, RouteSpec, TechMask};

/// State shared between the engine and its event dispatcher task.
pub(crate) struct Shared {
    link: Arc<dyn ControllerLink>,
    ack: AckSlot,
    registry: EndpointRegistry,
    bus: EventBus,
    ack_timeout: Duration,
    commit_timeout: Duration,
    offhost_aid_power: PowerMask,
    secure_nfc: AtomicBool,
    aid_routing: AtomicBool,
}

/// Single-owner routing engine. Construct one per controller link and
/// hand references to callers; table mutation is serialized internally,
/// one compile/commit pass at a time.
pub struct RoutingEngine {
    shared: Arc<Shared>,
    routing: RoutingConfig,
    empty_aid_route: bool,
    /// Rule tables, locked for the duration of a pass
    tables: Mutex<RuleTables>,
    /// Last consolidated table, for diagnostics
    snapshot: StdMutex<BTreeMap<RouteLocation, ConsolidatedEntry>>,
    dispatcher: JoinHandle<()>,
}

impl RoutingEngine {
    /// Build an engine over a controller link. `events` is the channel the
    /// link delivers acknowledgments and lifecycle notifications on.
    pub fn new(
        config: &Config,
        link: Arc<dyn ControllerLink>,
        events: mpsc::Receiver<ControllerEvent>,
    ) -> RoutingEngine {
        let shared = Arc::new(Shared {
            link,
            ack: AckSlot::new(),
            registry: EndpointRegistry::new(config.routing.dual_uicc),
            bus: EventBus::new(),
            ack_timeout: config.controller.ack_timeout,
            commit_timeout: config.controller.commit_timeout,
            offhost_aid_power: config.routing.offhost_aid_power,
            secure_nfc: AtomicBool::new(false),
            aid_routing: AtomicBool::new(config.routing.aid_routing),
        });
        let dispatcher = tokio::spawn(dispatch_events(Arc::clone(&shared), events));
        RoutingEngine {
            shared,
            routing: config.routing.clone(),
            empty_aid_route: config.controller.empty_aid_route,
            tables: Mutex::new(RuleTables::new()),
            snapshot: StdMutex::new(BTreeMap::new()),
            dispatcher,
        }
    }

    /// Compile the rule tables from the given route selections, consolidate
    /// them, and commit the result. Returns whether table activation was
    /// confirmed; per-destination sub-step failures are logged only.
    pub async fn compile_and_commit(
        &self,
        default_route: RouteSpec,
        proto_route: RouteSpec,
        tech_route: RouteSpec,
    ) -> bool {
        let mut tables = self.tables.lock().await;

        let default_route = self.resolve_route(default_route);
        let isodep_route = self.resolve_route(proto_route);
        let tech_route = self.resolve_route(tech_route);
        info!(
            default = %default_route, isodep = %isodep_route, tech = %tech_route,
            "compiling routing table"
        );

        let params = CompileParams {
            default_route,
            isodep_route,
            tech_route,
            host_listen: self.routing.host_listen_tech_mask,
            offhost_listen: self.routing.offhost_listen_tech_mask,
            strict_power: self.routing.strict_power,
            legacy_iso7816: !self.empty_aid_route,
        };
        tables.compile(&params, &self.shared.registry);

        if self.routing.fwd_functionality && !tech_route.dest.is_host() {
            let support = self
                .shared
                .registry
                .tech_support(tech_route.dest)
                .unwrap_or(TechMask::NONE);
            resolve_forwarding(&mut tables, params.host_listen, tech_route.dest, support);
        }

        debug!(tables = %*tables, "compiled rule tables");
        let consolidated = consolidate(&tables);
        info!(table = %TableDump(&consolidated), "consolidated routing table");
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = consolidated.clone();

        let empty_aid = self.empty_aid_route.then_some(default_route);
        self.shared.run_commit(&consolidated, empty_aid).await
    }

    /// Zero every route and drop every AID binding, then activate the
    /// empty table.
    pub async fn clear_all_routing(&self) -> bool {
        let _tables = self.tables.lock().await;
        info!("clearing all routing");
        let aids_cleared = self.shared.clear_aids().await;
        let empty = BTreeMap::new();
        let activated = self.shared.run_commit(&empty, None).await;
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = empty;
        aids_cleared && activated
    }

    /// Bind one AID to a destination. Falls back to the host when the
    /// destination is absent; returns false on rejection, timeout, or a
    /// full table (the latter also announced on the event bus).
    pub async fn add_aid(
        &self,
        aid: Vec<u8>,
        dest: RouteLocation,
        power: PowerMask,
        category: u8,
    ) -> bool {
        self.shared.add_aid(aid, dest, power, category).await
    }

    pub async fn remove_aid(&self, aid: Vec<u8>) -> bool {
        self.shared.remove_aid(aid).await
    }

    /// Whether any endpoint is currently mid-recovery. Data-path callers
    /// consult this before racing a removed endpoint.
    pub fn is_recovery_ongoing(&self) -> bool {
        self.shared.registry.is_recovery_ongoing()
    }

    /// Restrict committed routes to the switched-on state. Takes effect on
    /// the next pass.
    pub fn set_secure_nfc(&self, enabled: bool) {
        info!(enabled, "secure-nfc mode changed");
        self.shared.secure_nfc.store(enabled, Ordering::SeqCst);
    }

    /// Select which UICC slot UICC-bound rules resolve to. A fresh
    /// compile/commit pass is needed for the change to reach the table.
    pub fn select_uicc_slot(&self, slot: RouteLocation) -> bool {
        self.shared.registry.select_uicc_slot(slot)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.bus.subscribe()
    }

    /// The consolidated table produced by the most recent pass.
    pub fn consolidated_snapshot(&self) -> BTreeMap<RouteLocation, ConsolidatedEntry> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Resolve a configured route against the live endpoint set. An absent
    /// destination degrades silently per the fallback policy, ultimately
    /// to the host with the unlock-only power mask.
    fn resolve_route(&self, spec: RouteSpec) -> RouteSpec {
        let dest = self.shared.registry.canonical(spec.dest);
        if dest.is_host() || self.shared.registry.is_live(dest) {
            return RouteSpec::new(dest, spec.power);
        }
        match self.routing.fallback {
            FallbackPolicy::Ese if self.shared.registry.is_live(RouteLocation::EmbeddedSe) => {
                debug!(configured = %spec.dest, "destination absent, falling back to the embedded se");
                RouteSpec::new(RouteLocation::EmbeddedSe, spec.power)
            }
            _ => {
                debug!(configured = %spec.dest, "destination absent, falling back to the host");
                RouteSpec::new(RouteLocation::Host, PowerMask::SWITCH_ON)
            }
        }
    }
}

impl Drop for RoutingEngine {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Consume controller events: lifecycle notifications update the registry
/// and the bus, acknowledgments resolve the single outstanding command.
async fn dispatch_events(shared: Arc<Shared>, mut events: mpsc::Receiver<ControllerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ControllerEvent::EndpointDiscovered { dest, tech_support } => {
                shared.registry.discovered(dest, tech_support);
                shared
                    .bus
                    .publish(EngineEvent::EndpointDiscovered { dest, tech_support });
            }
            ControllerEvent::EndpointRemoved { dest } => {
                if shared.registry.removed(dest) {
                    shared.bus.publish(EngineEvent::RecoveryStarted { dest });
                }
            }
            ControllerEvent::EndpointRestored { dest } => {
                if shared.registry.restored(dest) {
                    shared.bus.publish(EngineEvent::RecoveryCleared { dest });
                }
            }
            ref ack_event => {
                if let Some(status) = ack_event.ack_status() {
                    if matches!(
                        ack_event,
                        ControllerEvent::AidAdded {
                            status: CommandStatus::BufferFull
                        }
                    ) {
                        shared.bus.publish(EngineEvent::AidTableFull);
                    }
                    if !shared.ack.resolve(status) {
                        debug!(event = ?ack_event, "late acknowledgment, no waiter");
                    }
                }
            }
        }
    }
    debug!("controller event channel closed");
}
