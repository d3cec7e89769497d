//! Commit protocol: push the consolidated table to the controller,
//! destination by destination, then activate it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::consolidate::ConsolidatedEntry;
use super::Shared;
use crate::controller::{Command, CommandStatus, RouteMasks};
use crate::events::EngineEvent;
use crate::types::{RouteLocation, RouteSpec};

/// Phase of an in-flight commit pass, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Zero-mask every known destination so no stale bits survive
    ClearingAll,
    /// Issue the non-zero entries
    Setting,
    /// Activate the staged table
    Committing,
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommitPhase::ClearingAll => "clearing-all",
            CommitPhase::Setting => "setting",
            CommitPhase::Committing => "committing",
        };
        f.write_str(s)
    }
}

impl Shared {
    /// Issue one command and wait for its acknowledgment.
    ///
    /// Returns `None` on link failure or acknowledgment timeout. Commands
    /// targeting a destination first park until that destination is out of
    /// recovery; if it drops mid-flight the command is reissued once the
    /// endpoint returns instead of burning the timeout.
    pub(crate) async fn issue_and_wait(
        &self,
        cmd: Command,
        wait: Duration,
    ) -> Option<CommandStatus> {
        let dest = cmd.dest();
        loop {
            if let Some(dest) = dest {
                self.registry.wait_ready(dest).await;
            }
            let rx = self.ack.arm();
            debug!(cmd = %cmd, "issuing controller command");
            if let Err(err) = self.link.submit(cmd.clone()).await {
                warn!(cmd = %cmd, error = %err, "controller link failure");
                return None;
            }
            match dest {
                Some(dest) => {
                    tokio::select! {
                        res = timeout(wait, rx) => {
                            return match res {
                                Ok(Ok(status)) => Some(status),
                                _ => None,
                            };
                        }
                        _ = self.registry.wait_recovery_start(dest) => {
                            info!(dest = %dest, "endpoint entered recovery mid-command, parking");
                            self.registry.wait_ready(dest).await;
                            // endpoint is back; reissue
                        }
                    }
                }
                None => {
                    return match timeout(wait, rx).await {
                        Ok(Ok(status)) => Some(status),
                        _ => None,
                    };
                }
            }
        }
    }

    /// One routing sub-step. Rejections and timeouts are logged and
    /// swallowed: a pass runs to completion rather than aborting with the
    /// controller half-cleared.
    async fn issue_route_step(&self, cmd: Command) {
        match self.issue_and_wait(cmd.clone(), self.ack_timeout).await {
            Some(CommandStatus::Ok) => {}
            Some(status) => {
                warn!(cmd = %cmd, status = %status, "route step rejected, continuing")
            }
            None => warn!(cmd = %cmd, "route step unacknowledged, continuing"),
        }
    }

    /// Push a consolidated table and activate it. Returns whether
    /// activation was confirmed; per-destination failures only show up in
    /// the logs.
    pub(crate) async fn run_commit(
        &self,
        table: &BTreeMap<RouteLocation, ConsolidatedEntry>,
        empty_aid: Option<RouteSpec>,
    ) -> bool {
        let secure = self.secure_nfc.load(Ordering::SeqCst);

        let mut phase = CommitPhase::ClearingAll;
        debug!(phase = %phase, "commit pass started");
        for dest in self.registry.known() {
            self.issue_route_step(Command::SetTechRoute {
                dest,
                routes: RouteMasks::ZERO,
            })
            .await;
            self.issue_route_step(Command::SetProtoRoute {
                dest,
                routes: RouteMasks::ZERO,
            })
            .await;
        }

        phase = CommitPhase::Setting;
        debug!(phase = %phase, destinations = table.len(), "issuing consolidated entries");
        for (dest, entry) in table {
            if entry.is_empty() {
                continue;
            }
            let (tech, proto) = if secure {
                (entry.tech.switch_on_only(), entry.proto.switch_on_only())
            } else {
                (entry.tech, entry.proto)
            };
            if !tech.is_zero() {
                self.issue_route_step(Command::SetTechRoute {
                    dest: *dest,
                    routes: tech,
                })
                .await;
            }
            if !proto.is_zero() {
                self.issue_route_step(Command::SetProtoRoute {
                    dest: *dest,
                    routes: proto,
                })
                .await;
            }
        }

        if let Some(spec) = empty_aid {
            self.set_empty_aid_entry(spec, secure).await;
        }

        phase = CommitPhase::Committing;
        debug!(phase = %phase, "activating table");
        let activated = self
            .issue_and_wait(Command::ActivateTableNow, self.commit_timeout)
            .await
            .map_or(false, CommandStatus::is_ok);
        if activated {
            info!("routing table activated");
        } else {
            warn!("table activation not confirmed within the timeout");
        }
        self.bus.publish(EngineEvent::RoutingCommitted { activated });
        activated
    }
}
