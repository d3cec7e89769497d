use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::types::{Command, CommandStatus};

/// Transport to the controller peer. Commands are fire-and-forget at this
/// layer; acknowledgments arrive on the event channel handed to the engine.
#[async_trait]
pub trait ControllerLink: Send + Sync {
    async fn submit(&self, cmd: Command) -> Result<(), LinkError>;
}

/// Controller link errors.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("controller link closed")]
    Closed,
}

/// Single-outstanding-request acknowledgment slot.
///
/// The commit pass arms the slot before submitting a command; the event
/// dispatcher resolves it when the matching acknowledgment arrives. Arming
/// drops any stale sender from an abandoned wait, so one slot serves every
/// sequential sub-step.
pub struct AckSlot {
    pending: Mutex<Option<oneshot::Sender<CommandStatus>>>,
}

impl AckSlot {
    pub fn new() -> AckSlot {
        AckSlot {
            pending: Mutex::new(None),
        }
    }

    /// Arm the slot for the next command. Replaces any stale waiter.
    pub fn arm(&self) -> oneshot::Receiver<CommandStatus> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = Some(tx);
        rx
    }

    /// Resolve the armed waiter. Returns false when nothing was waiting
    /// (late acknowledgment after a timeout).
    pub fn resolve(&self, status: CommandStatus) -> bool {
        let tx = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match tx {
            Some(tx) => tx.send(status).is_ok(),
            None => false,
        }
    }
}

impl Default for AckSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AckSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let armed = self
            .pending
            .lock()
            .map(|p| p.is_some())
            .unwrap_or(false);
        f.debug_struct("AckSlot").field("armed", &armed).finish()
    }
}
