//! Engine event bus.
//!
//! Subscribers observe routing lifecycle transitions without being able to
//! influence them. The bus is a lossy broadcast: a slow subscriber misses
//! events rather than blocking the engine.

use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{RouteLocation, TechMask};

/// Events published by the routing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The controller reported its AID table is out of room.
    AidTableFull,
    /// An endpoint dropped off the bus; commits touching it are suspended.
    RecoveryStarted { dest: RouteLocation },
    /// A removed endpoint came back.
    RecoveryCleared { dest: RouteLocation },
    /// A commit pass finished. `activated` is false when table activation
    /// was not confirmed.
    RoutingCommitted { activated: bool },
    /// Endpoint discovery completed.
    EndpointDiscovered {
        dest: RouteLocation,
        tech_support: TechMask,
    },
}

const EVENT_BUS_CAPACITY: usize = 256;

/// Broadcast fan-out for [`EngineEvent`].
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> EventBus {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        EventBus { tx }
    }

    /// Publish an event. Delivery is best-effort; having no subscribers is
    /// not an error.
    pub fn publish(&self, event: EngineEvent) {
        trace!(event = ?event, "publishing engine event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::AidTableFull);
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::AidTableFull);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::RoutingCommitted { activated: true });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_each_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(EngineEvent::RecoveryStarted {
            dest: RouteLocation::Uicc1,
        });
        bus.publish(EngineEvent::RecoveryCleared {
            dest: RouteLocation::Uicc1,
        });
        for rx in [&mut a, &mut b] {
            assert_eq!(
                rx.recv().await.unwrap(),
                EngineEvent::RecoveryStarted {
                    dest: RouteLocation::Uicc1
                }
            );
            assert_eq!(
                rx.recv().await.unwrap(),
                EngineEvent::RecoveryCleared {
                    dest: RouteLocation::Uicc1
                }
            );
        }
    }
}
