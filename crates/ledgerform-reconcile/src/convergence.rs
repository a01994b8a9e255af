//! Convergence waiting
//!
//! After a run, committed instantiations still take a moment to become
//! visible on every peer. The waiter polls owned peers until each of them
//! reports every target chaincode, or the deadline passes. Running out of
//! time is a report, not an error: the caller decides what a partially
//! converged network means.

use crate::errors::ReconcileError;
use crate::probe::TopologyProbe;
use ledgerform_core::{ChaincodeId, ChannelHandle, ClientContext, LedgerClient, PeerHandle};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One channel the waiter watches
#[derive(Debug)]
pub struct WaitTarget {
    /// Identity used for the probes
    pub context: ClientContext,
    /// Initialized channel handle
    pub handle: ChannelHandle,
    /// Chaincodes every peer must report
    pub chaincodes: BTreeSet<ChaincodeId>,
    /// Owned peers to watch
    pub peers: Vec<PeerHandle>,
}

impl WaitTarget {
    /// Channel name
    pub fn channel(&self) -> &str {
        self.handle.name()
    }
}

/// A peer still missing target chaincodes at the deadline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPeer {
    /// Channel name
    pub channel: String,
    /// Peer name
    pub peer: String,
    /// Target chaincodes the peer did not report on its last poll
    pub missing: Vec<ChaincodeId>,
}

/// Outcome of waiting for convergence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvergenceReport {
    /// Whether every channel converged before the deadline
    pub converged: bool,
    /// Time spent waiting
    #[serde(serialize_with = "ledgerform_core::config::duration_ms::serialize")]
    pub elapsed: Duration,
    /// Poll rounds performed
    pub polls: u32,
    /// Unmet `(channel, peer, chaincodes)` at the deadline
    pub pending: Vec<PendingPeer>,
}

impl ConvergenceReport {
    fn converged(elapsed: Duration, polls: u32) -> Self {
        Self {
            converged: true,
            elapsed,
            polls,
            pending: Vec::new(),
        }
    }
}

struct ChannelWait {
    target: WaitTarget,
    pending: Vec<(PeerHandle, Vec<ChaincodeId>)>,
}

impl ChannelWait {
    fn new(target: WaitTarget) -> Self {
        let pending = target
            .peers
            .iter()
            .map(|peer| (peer.clone(), target.chaincodes.iter().cloned().collect()))
            .collect();
        Self { target, pending }
    }

    /// Poll every pending peer once; returns whether the channel converged
    async fn poll(&mut self, probe: TopologyProbe<'_>) -> Result<bool, ReconcileError> {
        if self.target.chaincodes.is_empty() {
            return Ok(true);
        }

        let mut still_pending = Vec::with_capacity(self.pending.len());
        for (peer, _) in self.pending.drain(..) {
            let seen = probe
                .instantiated_chaincodes(&self.target.context, &self.target.handle, &peer)
                .await
                .map_err(|source| {
                    ReconcileError::in_channel(
                        self.target.handle.name(),
                        ReconcileError::InfrastructureFault {
                            peer: peer.name().to_string(),
                            source,
                        },
                    )
                })?;
            let missing: Vec<ChaincodeId> =
                self.target.chaincodes.difference(&seen).cloned().collect();
            if missing.is_empty() {
                debug!(channel = %self.target.channel(), peer = %peer, "peer converged");
            } else {
                still_pending.push((peer, missing));
            }
        }
        self.pending = still_pending;
        Ok(self.pending.is_empty())
    }
}

/// Polls owned peers until target chaincodes are observable
#[derive(Clone, Copy)]
pub struct ConvergenceWaiter<'a> {
    client: &'a dyn LedgerClient,
    poll_interval: Duration,
}

impl<'a> ConvergenceWaiter<'a> {
    /// Waiter polling through `client` every `poll_interval`
    pub fn new(client: &'a dyn LedgerClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Wait until every target converged or `timeout` elapsed
    ///
    /// Returns without sleeping when the first poll already finds every
    /// target satisfied. A probe failure on a watched peer is an error.
    /// Chaincodes match on name and version, so a peer still running an
    /// older version has not converged.
    pub async fn wait(
        &self,
        targets: Vec<WaitTarget>,
        timeout: Duration,
    ) -> Result<ConvergenceReport, ReconcileError> {
        let probe = TopologyProbe::new(self.client);
        let started = Instant::now();
        let mut waiting: Vec<ChannelWait> = targets.into_iter().map(ChannelWait::new).collect();
        let mut polls = 0;

        loop {
            polls += 1;
            let mut unconverged = Vec::with_capacity(waiting.len());
            for mut channel in waiting {
                if channel.poll(probe).await? {
                    debug!(channel = %channel.target.channel(), "channel converged");
                } else {
                    unconverged.push(channel);
                }
            }
            waiting = unconverged;

            let elapsed = started.elapsed();
            if waiting.is_empty() {
                info!(elapsed_ms = elapsed.as_millis() as u64, polls, "network converged");
                return Ok(ConvergenceReport::converged(elapsed, polls));
            }

            if elapsed >= timeout {
                let pending: Vec<PendingPeer> = waiting
                    .iter()
                    .flat_map(|channel| {
                        channel.pending.iter().map(|(peer, missing)| PendingPeer {
                            channel: channel.target.channel().to_string(),
                            peer: peer.name().to_string(),
                            missing: missing.clone(),
                        })
                    })
                    .collect();
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    pending = pending.len(),
                    "convergence deadline passed"
                );
                return Ok(ConvergenceReport {
                    converged: false,
                    elapsed,
                    polls,
                    pending,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerform_core::SigningIdentity;
    use ledgerform_testkit::MockLedger;

    fn target(channel: &str, peers: &[&str], chaincodes: &[ChaincodeId]) -> WaitTarget {
        WaitTarget {
            context: ClientContext::new(
                "org1",
                SigningIdentity::new("admin", "Org1MSP", "cert", "key"),
            ),
            handle: ChannelHandle::new(channel),
            chaincodes: chaincodes.iter().cloned().collect(),
            peers: peers
                .iter()
                .map(|p| PeerHandle::new(*p, *p, format!("grpc://{p}:7051")))
                .collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_target_converges_without_probing() {
        let ledger = MockLedger::new();
        let waiter = ConvergenceWaiter::new(&ledger, Duration::from_secs(1));

        let report = waiter
            .wait(vec![target("trade", &["peer0"], &[])], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(report.converged);
        assert_eq!(report.elapsed, Duration::ZERO);
        assert_eq!(ledger.instantiated_probes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converged_peers_are_not_probed_again() {
        let ledger = MockLedger::new();
        let mapcc = ChaincodeId::new("mapcc", "1");
        ledger.seed_joined("peer0", "trade");
        ledger.seed_joined("peer1", "trade");
        ledger.seed_instantiated("trade", mapcc.clone());
        ledger.hide_instantiation("peer1", "mapcc");
        let waiter = ConvergenceWaiter::new(&ledger, Duration::from_secs(1));

        let report = waiter
            .wait(
                vec![target("trade", &["peer0", "peer1"], &[mapcc])],
                Duration::from_secs(3),
            )
            .await
            .unwrap();

        assert!(!report.converged);
        assert_eq!(report.polls, 4);
        assert_eq!(report.pending.len(), 1);
        assert_eq!(report.pending[0].peer, "peer1");
        // peer0 once, peer1 on every poll
        assert_eq!(ledger.instantiated_probes(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_mismatch_is_missing() {
        let ledger = MockLedger::new();
        ledger.seed_joined("peer0", "trade");
        ledger.seed_instantiated("trade", ChaincodeId::new("mapcc", "1"));
        let waiter = ConvergenceWaiter::new(&ledger, Duration::from_secs(1));

        let wanted = ChaincodeId::new("mapcc", "2");
        let report = waiter
            .wait(
                vec![target("trade", &["peer0"], &[wanted.clone()])],
                Duration::ZERO,
            )
            .await
            .unwrap();

        assert!(!report.converged);
        assert_eq!(report.polls, 1);
        assert_eq!(report.pending[0].missing, vec![wanted]);
    }
}
