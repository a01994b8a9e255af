//! Live state probes
//!
//! One remote query per call, never retried. An empty answer is a valid
//! answer; only a peer that cannot or will not answer produces an error.

use crate::errors::{ProbeError, ProbeKind};
use ledgerform_core::{ChaincodeId, ChannelHandle, ClientContext, LedgerClient, PeerHandle};
use std::collections::BTreeSet;
use tracing::debug;

/// Queries the live state of individual peers
#[derive(Clone, Copy)]
pub struct TopologyProbe<'a> {
    client: &'a dyn LedgerClient,
}

impl<'a> TopologyProbe<'a> {
    /// Probe issuing queries through `client`
    pub fn new(client: &'a dyn LedgerClient) -> Self {
        Self { client }
    }

    /// Channels `peer` has joined
    pub async fn joined_channel_names(
        &self,
        ctx: &ClientContext,
        peer: &PeerHandle,
    ) -> Result<BTreeSet<String>, ProbeError> {
        let names = self
            .client
            .query_joined_channels(ctx, peer)
            .await
            .map_err(|e| ProbeError::from_ledger(peer.name(), ProbeKind::JoinedChannels, e))?;
        debug!(peer = %peer, channels = ?names, "joined channels");
        Ok(names.into_iter().collect())
    }

    /// Whether `peer` has joined `channel`; names compare case-insensitively
    pub async fn is_member(
        &self,
        ctx: &ClientContext,
        peer: &PeerHandle,
        channel: &str,
    ) -> Result<bool, ProbeError> {
        let joined = self.joined_channel_names(ctx, peer).await?;
        Ok(joined.iter().any(|name| name.eq_ignore_ascii_case(channel)))
    }

    /// Chaincodes installed on `peer`
    pub async fn installed_chaincodes(
        &self,
        ctx: &ClientContext,
        peer: &PeerHandle,
    ) -> Result<BTreeSet<ChaincodeId>, ProbeError> {
        let installed = self
            .client
            .query_installed_chaincodes(ctx, peer)
            .await
            .map_err(|e| ProbeError::from_ledger(peer.name(), ProbeKind::InstalledChaincodes, e))?;
        debug!(peer = %peer, count = installed.len(), "installed chaincodes");
        Ok(installed.into_iter().collect())
    }

    /// Chaincodes instantiated on `channel` as seen by `peer`
    pub async fn instantiated_chaincodes(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        peer: &PeerHandle,
    ) -> Result<BTreeSet<ChaincodeId>, ProbeError> {
        let instantiated = self
            .client
            .query_instantiated_chaincodes(ctx, channel, peer)
            .await
            .map_err(|e| {
                ProbeError::from_ledger(peer.name(), ProbeKind::InstantiatedChaincodes, e)
            })?;
        debug!(
            channel = %channel.name(),
            peer = %peer,
            count = instantiated.len(),
            "instantiated chaincodes"
        );
        Ok(instantiated.into_iter().collect())
    }
}
