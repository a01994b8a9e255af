//! Network manager
//!
//! Entry point tying the reconcilers together. Channels are processed one at
//! a time in declaration order; the first fatal failure ends the run and is
//! returned wrapped with its channel name, leaving later channels untouched.

use crate::channel::{ChannelReconciler, LiveChannelView};
use crate::configurator::ChannelConfigurator;
use crate::convergence::{ConvergenceReport, ConvergenceWaiter, WaitTarget};
use crate::errors::ReconcileError;
use crate::lifecycle::{ChaincodeLifecycleReconciler, LifecycleAction};
use crate::pipeline::TransactionPipeline;
use crate::report::{ChannelReport, NetworkReport};
use ledgerform_core::{
    ChaincodeId, ChannelChaincode, CommitEvent, ConfigTranscoder, EngineConfig,
    IdentityProvider, LedgerClient, ProposalKind, ProposalRequest, Topology,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Chaincode keys an operation is restricted to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChaincodeFilter {
    names: BTreeSet<String>,
}

impl ChaincodeFilter {
    /// Every chaincode
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the named chaincode keys
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether chaincode key `name` passes; an empty filter passes everything
    pub fn matches(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.contains(name)
    }
}

/// Reconciles declared topologies against the live network
#[derive(Clone)]
pub struct NetworkManager {
    client: Arc<dyn LedgerClient>,
    identities: Arc<dyn IdentityProvider>,
    config: EngineConfig,
}

impl NetworkManager {
    /// Manager with default settings
    pub fn new(client: Arc<dyn LedgerClient>, identities: Arc<dyn IdentityProvider>) -> Self {
        Self::with_config(client, identities, EngineConfig::default())
    }

    /// Manager with explicit settings
    pub fn with_config(
        client: Arc<dyn LedgerClient>,
        identities: Arc<dyn IdentityProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            identities,
            config,
        }
    }

    /// Active settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Channel configuration access through the same collaborators
    pub fn configurator(&self, transcoder: Arc<dyn ConfigTranscoder>) -> ChannelConfigurator {
        ChannelConfigurator::new(
            Arc::clone(&self.client),
            Arc::clone(&self.identities),
            transcoder,
            self.config.clone(),
        )
    }

    fn channels(&self) -> ChannelReconciler<'_> {
        ChannelReconciler::new(self.client.as_ref(), self.identities.as_ref(), &self.config)
    }

    fn lifecycle(&self) -> ChaincodeLifecycleReconciler<'_> {
        ChaincodeLifecycleReconciler::new(self.client.as_ref(), &self.config)
    }

    /// Bring every declared channel and chaincode to the declared state
    ///
    /// Re-running against a converged network performs no joins, installs,
    /// instantiations or upgrades.
    #[instrument(skip_all, fields(channels = topology.channels.len()))]
    pub async fn reconcile_network(&self, topology: &Topology) -> Result<NetworkReport, ReconcileError> {
        if topology.channels.is_empty() {
            return Err(ReconcileError::NoChannels);
        }

        let mut report = NetworkReport::default();
        for name in topology.channels.keys() {
            let channel = self.reconcile_channel(topology, name).await.map_err(|err| {
                error!(channel = %name, error = %err, "channel reconciliation failed");
                ReconcileError::in_channel(name, err)
            })?;
            report.channels.push(channel);
        }

        info!(noop = report.is_noop(), "network reconciled");
        Ok(report)
    }

    async fn reconcile_channel(
        &self,
        topology: &Topology,
        name: &str,
    ) -> Result<ChannelReport, ReconcileError> {
        let spec = topology.channel(name)?;
        let mut view = self.channels().reconcile(topology, name).await?;
        let mut report = ChannelReport::from_view(&view);

        // Trusted members are checked even when there is nothing to install
        let lifecycle = self.lifecycle();
        lifecycle.observe_instantiated(&mut view).await?;
        for entry in &spec.chaincodes {
            let id = topology.chaincode(&entry.name)?.chaincode_id();
            let action = LifecycleAction::for_observed(&view.instantiated, &id);
            let outcome = lifecycle
                .reconcile_chaincode(topology, &mut view, entry, action)
                .await?;
            report.chaincodes.push(outcome);
        }
        Ok(report)
    }

    /// Install and instantiate the filtered chaincodes of one channel, or of all
    ///
    /// Channels are attached, never created or joined.
    pub async fn install_and_activate(
        &self,
        topology: &Topology,
        channel: Option<&str>,
        filter: &ChaincodeFilter,
    ) -> Result<Vec<ChannelReport>, ReconcileError> {
        self.apply_lifecycle(topology, channel, filter, LifecycleAction::Instantiate)
            .await
    }

    /// Install and upgrade the filtered chaincodes of one channel, or of all
    pub async fn install_and_upgrade(
        &self,
        topology: &Topology,
        channel: Option<&str>,
        filter: &ChaincodeFilter,
    ) -> Result<Vec<ChannelReport>, ReconcileError> {
        self.apply_lifecycle(topology, channel, filter, LifecycleAction::Upgrade)
            .await
    }

    #[instrument(skip_all, fields(action = ?action))]
    async fn apply_lifecycle(
        &self,
        topology: &Topology,
        channel: Option<&str>,
        filter: &ChaincodeFilter,
        action: LifecycleAction,
    ) -> Result<Vec<ChannelReport>, ReconcileError> {
        let mut reports = Vec::new();
        for name in selected_channels(topology, channel)? {
            let report = self
                .apply_lifecycle_to_channel(topology, name, filter, action)
                .await
                .map_err(|err| {
                    error!(channel = %name, error = %err, "chaincode lifecycle failed");
                    ReconcileError::in_channel(name, err)
                })?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn apply_lifecycle_to_channel(
        &self,
        topology: &Topology,
        name: &str,
        filter: &ChaincodeFilter,
        action: LifecycleAction,
    ) -> Result<ChannelReport, ReconcileError> {
        let entries: Vec<&ChannelChaincode> = topology
            .channel(name)?
            .chaincodes
            .iter()
            .filter(|entry| filter.matches(&entry.name))
            .collect();

        let mut view = self.channels().attach(topology, name).await?;
        let mut report = ChannelReport::from_view(&view);
        if entries.is_empty() {
            return Ok(report);
        }

        let lifecycle = self.lifecycle();
        lifecycle.observe_instantiated(&mut view).await?;
        for entry in entries {
            let outcome = lifecycle
                .reconcile_chaincode(topology, &mut view, entry, action)
                .await?;
            report.chaincodes.push(outcome);
        }
        Ok(report)
    }

    /// Wait until every owned peer reports the filtered chaincodes of its channels
    ///
    /// Channels with nothing to wait for are not contacted.
    #[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn wait_for_convergence(
        &self,
        topology: &Topology,
        filter: &ChaincodeFilter,
        timeout: Duration,
    ) -> Result<ConvergenceReport, ReconcileError> {
        let mut targets = Vec::new();
        for (name, spec) in &topology.channels {
            let chaincodes: BTreeSet<ChaincodeId> = spec
                .chaincodes
                .iter()
                .filter(|entry| filter.matches(&entry.name))
                .map(|entry| topology.chaincode(&entry.name).map(|cc| cc.chaincode_id()))
                .collect::<Result<_, _>>()?;
            if chaincodes.is_empty() {
                continue;
            }

            let view = self
                .channels()
                .attach(topology, name)
                .await
                .map_err(|err| ReconcileError::in_channel(name, err))?;
            targets.push(wait_target(view, chaincodes));
        }

        ConvergenceWaiter::new(self.client.as_ref(), self.config.poll_interval)
            .wait(targets, timeout)
            .await
    }

    /// Reconcile the network, then wait for every declared chaincode
    pub async fn reconcile_and_wait(
        &self,
        topology: &Topology,
        timeout: Duration,
    ) -> Result<(NetworkReport, ConvergenceReport), ReconcileError> {
        let report = self.reconcile_network(topology).await?;
        let convergence = self
            .wait_for_convergence(topology, &ChaincodeFilter::all(), timeout)
            .await?;
        Ok((report, convergence))
    }

    /// Submit a transaction on `chaincode` to the endorsing peers of `channel`
    ///
    /// Read conflicts are retried up to the configured transaction budget.
    pub async fn invoke(
        &self,
        topology: &Topology,
        channel: &str,
        chaincode: &str,
        function: &str,
        args: &[&str],
    ) -> Result<CommitEvent, ReconcileError> {
        let (view, request) = self
            .prepare_proposal(topology, channel, chaincode, ProposalKind::Transaction, function, args)
            .await?;
        let commit = TransactionPipeline::new(self.client.as_ref())
            .invoke(
                &view.context,
                &view.handle,
                request,
                &view.endorsing_peers(),
                self.config.transaction_retries,
            )
            .await?;
        Ok(commit)
    }

    /// Evaluate `function` on `chaincode` without ordering it
    pub async fn query(
        &self,
        topology: &Topology,
        channel: &str,
        chaincode: &str,
        function: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ReconcileError> {
        let (view, request) = self
            .prepare_proposal(topology, channel, chaincode, ProposalKind::Query, function, args)
            .await?;
        let peers: Vec<_> = view
            .peers
            .iter()
            .filter(|peer| peer.roles.chaincode_query)
            .map(|peer| peer.handle.clone())
            .collect();
        let payload = TransactionPipeline::new(self.client.as_ref())
            .query(&view.context, &view.handle, &request, &peers)
            .await?;
        Ok(payload)
    }

    async fn prepare_proposal(
        &self,
        topology: &Topology,
        channel: &str,
        chaincode: &str,
        kind: ProposalKind,
        function: &str,
        args: &[&str],
    ) -> Result<(LiveChannelView, ProposalRequest), ReconcileError> {
        let spec = topology.chaincode(chaincode)?;
        let view = self.channels().attach(topology, channel).await?;
        let request = ProposalRequest::new(kind, spec.chaincode_id(), function)
            .with_args(args.iter().copied())
            .with_language(spec.language)
            .with_wait_time(self.config.proposal_wait_time);
        Ok((view, request))
    }
}

fn selected_channels<'t>(
    topology: &'t Topology,
    channel: Option<&'t str>,
) -> Result<Vec<&'t str>, ReconcileError> {
    match channel {
        Some(name) => {
            topology.channel(name)?;
            Ok(vec![name])
        }
        None => Ok(topology.channels.keys().map(String::as_str).collect()),
    }
}

fn wait_target(view: LiveChannelView, chaincodes: BTreeSet<ChaincodeId>) -> WaitTarget {
    let peers = view
        .owned_peers()
        .map(|peer| peer.handle.clone())
        .collect();
    WaitTarget {
        context: view.context,
        handle: view.handle,
        chaincodes,
        peers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(ChaincodeFilter::all().matches("mapcc"));

        let only = ChaincodeFilter::only(["assets"]);
        assert!(only.matches("assets"));
        assert!(!only.matches("mapcc"));
    }
}
