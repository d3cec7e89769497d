//! Mock controller for testing without hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, trace};

use super::link::{ControllerLink, LinkError};
use super::types::{Command, CommandStatus, ControllerEvent};

/// Scripted controller peer. Records every submitted command and emits
/// the matching acknowledgment on the event channel, with configurable
/// status, latency, and selective silence.
pub struct MockController {
    /// Event channel to the engine dispatcher
    events_tx: mpsc::Sender<ControllerEvent>,
    /// Every command submitted, in order
    captured: Mutex<Vec<Command>>,
    /// Acknowledgment status for route-set commands
    route_status: Mutex<CommandStatus>,
    /// Acknowledgment status for AID add commands
    aid_status: Mutex<CommandStatus>,
    /// Simulated acknowledgment latency
    latency: Mutex<Duration>,
    /// Never acknowledge table activation
    mute_activation: AtomicBool,
    /// Never acknowledge anything
    mute_all: AtomicBool,
    /// Total commands submitted
    command_count: AtomicU64,
}

impl MockController {
    /// Create a mock that acknowledges everything with OK.
    pub fn new() -> (MockController, mpsc::Receiver<ControllerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let mock = MockController {
            events_tx,
            captured: Mutex::new(Vec::new()),
            route_status: Mutex::new(CommandStatus::Ok),
            aid_status: Mutex::new(CommandStatus::Ok),
            latency: Mutex::new(Duration::ZERO),
            mute_activation: AtomicBool::new(false),
            mute_all: AtomicBool::new(false),
            command_count: AtomicU64::new(0),
        };
        (mock, events_rx)
    }

    /// Set simulated acknowledgment latency.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
        self
    }

    /// Acknowledge AID adds with the given status.
    pub fn with_aid_status(self, status: CommandStatus) -> Self {
        *self.aid_status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        self
    }

    /// Acknowledge route-set commands with the given status.
    pub fn with_route_status(self, status: CommandStatus) -> Self {
        *self.route_status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        self
    }

    /// Swallow the activation command without responding.
    pub fn with_muted_activation(self) -> Self {
        self.mute_activation.store(true, Ordering::SeqCst);
        self
    }

    /// Stop acknowledging anything from now on.
    pub fn mute(&self) {
        self.mute_all.store(true, Ordering::SeqCst);
    }

    /// Deliver an unsolicited event (endpoint lifecycle notifications).
    pub async fn inject(&self, event: ControllerEvent) {
        debug!(event = ?event, "mock: injecting event");
        let _ = self.events_tx.send(event).await;
    }

    /// Snapshot of every command submitted so far.
    pub fn commands(&self) -> Vec<Command> {
        self.captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn command_count(&self) -> u64 {
        self.command_count.load(Ordering::Relaxed)
    }

    fn response_for(&self, cmd: &Command) -> Option<ControllerEvent> {
        let route_status = *self.route_status.lock().unwrap_or_else(|e| e.into_inner());
        let aid_status = *self.aid_status.lock().unwrap_or_else(|e| e.into_inner());
        match cmd {
            Command::SetTechRoute { .. } => Some(ControllerEvent::TechRouteSet {
                status: route_status,
            }),
            Command::SetProtoRoute { .. } => Some(ControllerEvent::ProtoRouteSet {
                status: route_status,
            }),
            Command::AddAidRoute { .. } => Some(ControllerEvent::AidAdded { status: aid_status }),
            Command::RemoveAidRoute { .. } | Command::ClearAidRoutes => {
                Some(ControllerEvent::AidRemoved {
                    status: CommandStatus::Ok,
                })
            }
            Command::ActivateTableNow => {
                if self.mute_activation.load(Ordering::SeqCst) {
                    None
                } else {
                    Some(ControllerEvent::TableActivated)
                }
            }
        }
    }
}

#[async_trait]
impl ControllerLink for MockController {
    async fn submit(&self, cmd: Command) -> Result<(), LinkError> {
        self.command_count.fetch_add(1, Ordering::Relaxed);
        trace!(cmd = %cmd, "mock: command received");
        self.captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(cmd.clone());

        if self.mute_all.load(Ordering::SeqCst) {
            debug!(cmd = %cmd, "mock: muted, swallowing command");
            return Ok(());
        }

        let Some(event) = self.response_for(&cmd) else {
            debug!(cmd = %cmd, "mock: no response scripted");
            return Ok(());
        };

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        let tx = self.events_tx.clone();
        if latency.is_zero() {
            tx.send(event).await.map_err(|_| LinkError::Closed)?;
        } else {
            tokio::spawn(async move {
                sleep(latency).await;
                let _ = tx.send(event).await;
            });
        }
        Ok(())
    }
}
