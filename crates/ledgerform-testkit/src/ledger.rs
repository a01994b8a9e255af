//! In-memory ledger network
//!
//! `MockLedger` implements `LedgerClient` over a small model of a permissioned
//! network: channels known to the ordering service, per-peer joined channels
//! and installed chaincodes, and per-channel instantiated chaincodes. Every
//! mutating call is recorded so tests can assert exactly which joins,
//! installs and orderer submissions an engine run performed, and faults can
//! be injected per peer.
//!
//! Peers are identified by their handle name, which is the declared display
//! name or, when none is declared, the declaration key.

use async_trait::async_trait;
use ledgerform_core::{
    ChaincodeId, ChannelDefinition, ChannelHandle, ClientContext, CommitEvent, ConfigSignature,
    EndorsedTransaction, EndorsementResponse, EventSourceHandle, InstallRequest, LedgerClient,
    LedgerError, NodeSpec, OrdererHandle, PeerHandle, ProposalKind, ProposalRequest,
    ValidationCode,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::trace;

/// A peer joined to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCall {
    /// Channel name
    pub channel: String,
    /// Peer name
    pub peer: String,
}

/// A chaincode installed on a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCall {
    /// Peer name
    pub peer: String,
    /// Installed chaincode
    pub chaincode: ChaincodeId,
}

/// A proposal delivered to a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalCall {
    /// Peer name
    pub peer: String,
    /// Proposal kind
    pub kind: ProposalKind,
    /// Target chaincode
    pub chaincode: ChaincodeId,
}

/// A transaction accepted by the ordering service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionCall {
    /// Channel name
    pub channel: String,
    /// Proposal kind of the transaction
    pub kind: ProposalKind,
    /// Target chaincode
    pub chaincode: ChaincodeId,
    /// Transaction id
    pub tx_id: String,
}

/// A channel configuration update applied to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdateCall {
    /// Channel name
    pub channel: String,
    /// Update bytes
    pub update: Vec<u8>,
    /// Number of signatures supplied
    pub signatures: usize,
}

#[derive(Debug, Default)]
struct ChannelRecord {
    config: Vec<u8>,
    instantiated: BTreeMap<String, ChaincodeId>,
}

#[derive(Debug, Default)]
struct PeerRecord {
    joined: BTreeSet<String>,
    installed: BTreeSet<ChaincodeId>,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: BTreeSet<String>,
    denied: BTreeSet<String>,
    join_failures: BTreeMap<String, u32>,
    denied_joins: BTreeSet<String>,
    install_failures: BTreeMap<String, String>,
    endorsement_failures: BTreeMap<String, String>,
    divergent_payloads: BTreeMap<String, Vec<u8>>,
    hidden_instantiations: BTreeSet<(String, String)>,
    signing_failure: Option<String>,
    creation_failure: Option<String>,
    initialize_failure: Option<String>,
    orderer_rejections: u32,
    commit_codes: VecDeque<ValidationCode>,
}

#[derive(Debug, Default)]
struct CallLog {
    creations: Vec<String>,
    join_attempts: Vec<JoinCall>,
    joins: Vec<JoinCall>,
    installs: Vec<InstallCall>,
    proposals: Vec<ProposalCall>,
    submissions: Vec<SubmissionCall>,
    config_updates: Vec<ConfigUpdateCall>,
    orderer_connections: Vec<String>,
    initializations: Vec<String>,
    instantiated_probes: u32,
}

#[derive(Debug, Default)]
struct NetworkState {
    channels: BTreeMap<String, ChannelRecord>,
    peers: BTreeMap<String, PeerRecord>,
    query_results: BTreeMap<(String, String), Vec<u8>>,
    faults: Faults,
    calls: CallLog,
    block_height: u64,
}

impl NetworkState {
    fn check_reachable(&self, peer: &str) -> Result<(), LedgerError> {
        if self.faults.unreachable.contains(peer) {
            return Err(LedgerError::unreachable(peer, "connection refused"));
        }
        Ok(())
    }

    /// Peer-scoped admin queries additionally honor `deny_queries`
    fn check_peer_query(&self, peer: &str) -> Result<(), LedgerError> {
        self.check_reachable(peer)?;
        if self.faults.denied.contains(peer) {
            return Err(LedgerError::access_denied(peer, "creator is not an admin of this peer"));
        }
        Ok(())
    }

    fn is_joined(&self, peer: &str, channel: &str) -> bool {
        self.peers
            .get(peer)
            .is_some_and(|record| record.joined.contains(channel))
    }

    fn endorsement_payload(&self, request: &ProposalRequest) -> Vec<u8> {
        if request.kind == ProposalKind::Query {
            let key = (request.chaincode.name.clone(), request.function.clone());
            if let Some(result) = self.query_results.get(&key) {
                return result.clone();
            }
        }
        format!(
            "{}|{}|{}|{}",
            request.kind,
            request.chaincode,
            request.function,
            request.args.join(",")
        )
        .into_bytes()
    }
}

/// In-memory `LedgerClient`
#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<NetworkState>,
}

impl MockLedger {
    /// Empty network: no channels, no joins, no installs
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    /// Register a channel with the ordering service
    pub fn seed_channel(&self, channel: &str) {
        let mut state = self.state.lock();
        state
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| ChannelRecord {
                config: format!("config:{channel}").into_bytes(),
                ..ChannelRecord::default()
            });
    }

    /// Mark `peer` as joined to `channel`, registering the channel if needed
    pub fn seed_joined(&self, peer: &str, channel: &str) {
        self.seed_channel(channel);
        let mut state = self.state.lock();
        state
            .peers
            .entry(peer.to_string())
            .or_default()
            .joined
            .insert(channel.to_string());
    }

    /// Mark `chaincode` as installed on `peer`
    pub fn seed_installed(&self, peer: &str, chaincode: ChaincodeId) {
        let mut state = self.state.lock();
        state
            .peers
            .entry(peer.to_string())
            .or_default()
            .installed
            .insert(chaincode);
    }

    /// Mark `chaincode` as instantiated on `channel`
    pub fn seed_instantiated(&self, channel: &str, chaincode: ChaincodeId) {
        self.seed_channel(channel);
        let mut state = self.state.lock();
        if let Some(record) = state.channels.get_mut(channel) {
            record.instantiated.insert(chaincode.name.clone(), chaincode);
        }
    }

    /// Fixed payload returned by query proposals for `function` on `chaincode`
    pub fn seed_query_result(&self, chaincode: &str, function: &str, payload: &[u8]) {
        self.state.lock().query_results.insert(
            (chaincode.to_string(), function.to_string()),
            payload.to_vec(),
        );
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Every call targeting `peer` fails as unreachable
    pub fn set_unreachable(&self, peer: &str) {
        self.state.lock().faults.unreachable.insert(peer.to_string());
    }

    /// Joined-channel and installed-chaincode queries to `peer` fail with access denied
    ///
    /// Channel-scoped queries and proposals are still answered.
    pub fn deny_queries(&self, peer: &str) {
        self.state.lock().faults.denied.insert(peer.to_string());
    }

    /// The next `times` joins of `peer` fail as not yet ready
    pub fn fail_joins(&self, peer: &str, times: u32) {
        self.state
            .lock()
            .faults
            .join_failures
            .insert(peer.to_string(), times);
    }

    /// Every join of `peer` is refused by the channel writers policy
    pub fn deny_joins(&self, peer: &str) {
        self.state.lock().faults.denied_joins.insert(peer.to_string());
    }

    /// Install proposals to `peer` are answered with a failure
    pub fn fail_installs(&self, peer: &str, reason: &str) {
        self.state
            .lock()
            .faults
            .install_failures
            .insert(peer.to_string(), reason.to_string());
    }

    /// Channel proposals to `peer` are answered with a failure
    pub fn fail_endorsements(&self, peer: &str, reason: &str) {
        self.state
            .lock()
            .faults
            .endorsement_failures
            .insert(peer.to_string(), reason.to_string());
    }

    /// `peer` endorses successfully but with `payload` instead of the common result
    pub fn diverge_endorsement(&self, peer: &str, payload: &[u8]) {
        self.state
            .lock()
            .faults
            .divergent_payloads
            .insert(peer.to_string(), payload.to_vec());
    }

    /// `peer` never reports `chaincode` as instantiated
    pub fn hide_instantiation(&self, peer: &str, chaincode: &str) {
        self.state
            .lock()
            .faults
            .hidden_instantiations
            .insert((peer.to_string(), chaincode.to_string()));
    }

    /// Undo `hide_instantiation`
    pub fn reveal_instantiation(&self, peer: &str, chaincode: &str) {
        self.state
            .lock()
            .faults
            .hidden_instantiations
            .remove(&(peer.to_string(), chaincode.to_string()));
    }

    /// Signing a channel definition fails with `reason`
    pub fn fail_definition_signing(&self, reason: &str) {
        self.state.lock().faults.signing_failure = Some(reason.to_string());
    }

    /// Channel creation fails with `reason`
    pub fn fail_channel_creation(&self, reason: &str) {
        self.state.lock().faults.creation_failure = Some(reason.to_string());
    }

    /// Channel initialization fails with `reason`
    pub fn fail_initialization(&self, reason: &str) {
        self.state.lock().faults.initialize_failure = Some(reason.to_string());
    }

    /// The next `times` orderer submissions are rejected
    pub fn reject_orders(&self, times: u32) {
        self.state.lock().faults.orderer_rejections = times;
    }

    /// Validation codes reported for the next commits, in order
    pub fn queue_commit_codes(&self, codes: impl IntoIterator<Item = ValidationCode>) {
        self.state.lock().faults.commit_codes.extend(codes);
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Channel creations that succeeded
    pub fn creations(&self) -> Vec<String> {
        self.state.lock().calls.creations.clone()
    }

    /// Successful joins
    pub fn joins(&self) -> Vec<JoinCall> {
        self.state.lock().calls.joins.clone()
    }

    /// Every join attempt, successful or not
    pub fn join_attempts(&self) -> Vec<JoinCall> {
        self.state.lock().calls.join_attempts.clone()
    }

    /// Successful installs
    pub fn installs(&self) -> Vec<InstallCall> {
        self.state.lock().calls.installs.clone()
    }

    /// Proposals delivered to peers
    pub fn proposals(&self) -> Vec<ProposalCall> {
        self.state.lock().calls.proposals.clone()
    }

    /// Transactions accepted by the ordering service
    pub fn submissions(&self) -> Vec<SubmissionCall> {
        self.state.lock().calls.submissions.clone()
    }

    /// Applied channel configuration updates
    pub fn config_updates(&self) -> Vec<ConfigUpdateCall> {
        self.state.lock().calls.config_updates.clone()
    }

    /// Orderer keys connected, in connection order
    pub fn orderer_connections(&self) -> Vec<String> {
        self.state.lock().calls.orderer_connections.clone()
    }

    /// Channels initialized, in order
    pub fn initializations(&self) -> Vec<String> {
        self.state.lock().calls.initializations.clone()
    }

    /// Number of instantiated-chaincode probes served
    pub fn instantiated_probes(&self) -> u32 {
        self.state.lock().calls.instantiated_probes
    }

    /// Creations, joins, installs and submissions recorded so far
    pub fn mutation_count(&self) -> usize {
        let state = self.state.lock();
        state.calls.creations.len()
            + state.calls.joins.len()
            + state.calls.installs.len()
            + state.calls.submissions.len()
    }

    /// Forget recorded calls, keeping network state and faults
    pub fn reset_calls(&self) {
        self.state.lock().calls = CallLog::default();
    }

    /// Whether `peer` has joined `channel`
    pub fn is_joined(&self, peer: &str, channel: &str) -> bool {
        self.state.lock().is_joined(peer, channel)
    }

    /// Whether `chaincode` is instantiated on `channel`, as the ordering service sees it
    pub fn is_instantiated(&self, channel: &str, chaincode: &ChaincodeId) -> bool {
        self.state
            .lock()
            .channels
            .get(channel)
            .and_then(|record| record.instantiated.get(&chaincode.name))
            .is_some_and(|current| current == chaincode)
    }

    /// Current configuration bytes of `channel`
    pub fn channel_config(&self, channel: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|record| record.config.clone())
    }
}

fn sign(ctx: &ClientContext, content: &[u8]) -> ConfigSignature {
    let mut hasher = blake3::Hasher::new();
    hasher.update(ctx.identity().certificate_pem.as_bytes());
    hasher.update(content);
    ConfigSignature {
        signer_msp: ctx.identity().msp_id.clone(),
        bytes: hasher.finalize().as_bytes().to_vec(),
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn connect_peer(
        &self,
        _ctx: &ClientContext,
        key: &str,
        spec: &NodeSpec,
    ) -> Result<PeerHandle, LedgerError> {
        Ok(PeerHandle::new(key, spec.display_name(key), spec.url.clone()))
    }

    async fn connect_orderer(
        &self,
        _ctx: &ClientContext,
        key: &str,
        spec: &NodeSpec,
    ) -> Result<OrdererHandle, LedgerError> {
        self.state
            .lock()
            .calls
            .orderer_connections
            .push(key.to_string());
        Ok(OrdererHandle::new(key, spec.display_name(key), spec.url.clone()))
    }

    async fn connect_event_source(
        &self,
        _ctx: &ClientContext,
        key: &str,
        spec: &NodeSpec,
    ) -> Result<EventSourceHandle, LedgerError> {
        Ok(EventSourceHandle::new(
            key,
            spec.display_name(key),
            spec.url.clone(),
        ))
    }

    async fn sign_channel_definition(
        &self,
        ctx: &ClientContext,
        definition: &ChannelDefinition,
    ) -> Result<ConfigSignature, LedgerError> {
        if let Some(reason) = self.state.lock().faults.signing_failure.clone() {
            return Err(LedgerError::invalid_argument(reason));
        }
        Ok(sign(ctx, definition.as_bytes()))
    }

    async fn create_channel(
        &self,
        _ctx: &ClientContext,
        channel: &str,
        orderer: OrdererHandle,
        _definition: &ChannelDefinition,
        _signature: &ConfigSignature,
    ) -> Result<ChannelHandle, LedgerError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.faults.creation_failure.clone() {
            return Err(LedgerError::rejected(orderer.name(), reason));
        }
        if state.channels.contains_key(channel) {
            return Err(LedgerError::rejected(
                orderer.name(),
                format!("channel {channel} already exists"),
            ));
        }
        state.channels.insert(
            channel.to_string(),
            ChannelRecord {
                config: format!("config:{channel}").into_bytes(),
                ..ChannelRecord::default()
            },
        );
        state.calls.creations.push(channel.to_string());

        let mut handle = ChannelHandle::new(channel);
        handle.add_orderer(orderer);
        Ok(handle)
    }

    async fn join_channel(
        &self,
        _ctx: &ClientContext,
        channel: &ChannelHandle,
        peer: &PeerHandle,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let call = JoinCall {
            channel: channel.name().to_string(),
            peer: peer.name().to_string(),
        };
        state.calls.join_attempts.push(call.clone());

        if state.faults.unreachable.contains(peer.name()) {
            return Err(LedgerError::unreachable(peer.name(), "connection refused"));
        }
        if state.faults.denied_joins.contains(peer.name()) {
            return Err(LedgerError::access_denied(
                peer.name(),
                "creator not in channel writers policy",
            ));
        }
        if let Some(remaining) = state.faults.join_failures.get_mut(peer.name()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::unreachable(
                    peer.name(),
                    "channel genesis block not yet available",
                ));
            }
        }
        if !state.channels.contains_key(channel.name()) {
            return Err(LedgerError::not_found(format!(
                "channel {} unknown to the ordering service",
                channel.name()
            )));
        }
        let record = state.peers.entry(peer.name().to_string()).or_default();
        if !record.joined.insert(channel.name().to_string()) {
            return Err(LedgerError::rejected(
                peer.name(),
                format!("peer already joined to {}", channel.name()),
            ));
        }
        state.calls.joins.push(call);
        Ok(())
    }

    async fn initialize_channel(
        &self,
        _ctx: &ClientContext,
        channel: &ChannelHandle,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.faults.initialize_failure.clone() {
            return Err(LedgerError::other(reason));
        }
        if !state.channels.contains_key(channel.name()) {
            return Err(LedgerError::not_found(format!(
                "channel {} unknown to the ordering service",
                channel.name()
            )));
        }
        state.calls.initializations.push(channel.name().to_string());
        Ok(())
    }

    async fn query_joined_channels(
        &self,
        _ctx: &ClientContext,
        peer: &PeerHandle,
    ) -> Result<Vec<String>, LedgerError> {
        let state = self.state.lock();
        state.check_peer_query(peer.name())?;
        Ok(state
            .peers
            .get(peer.name())
            .map(|record| record.joined.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn query_installed_chaincodes(
        &self,
        _ctx: &ClientContext,
        peer: &PeerHandle,
    ) -> Result<Vec<ChaincodeId>, LedgerError> {
        let state = self.state.lock();
        state.check_peer_query(peer.name())?;
        Ok(state
            .peers
            .get(peer.name())
            .map(|record| record.installed.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn query_instantiated_chaincodes(
        &self,
        _ctx: &ClientContext,
        channel: &ChannelHandle,
        peer: &PeerHandle,
    ) -> Result<Vec<ChaincodeId>, LedgerError> {
        let mut state = self.state.lock();
        state.calls.instantiated_probes += 1;
        state.check_reachable(peer.name())?;
        if !state.is_joined(peer.name(), channel.name()) {
            return Err(LedgerError::rejected(
                peer.name(),
                format!("peer is not joined to channel {}", channel.name()),
            ));
        }
        let hidden = &state.faults.hidden_instantiations;
        Ok(state
            .channels
            .get(channel.name())
            .map(|record| {
                record
                    .instantiated
                    .values()
                    .filter(|id| !hidden.contains(&(peer.name().to_string(), id.name.clone())))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn propose_install(
        &self,
        _ctx: &ClientContext,
        request: &InstallRequest,
        peer: &PeerHandle,
    ) -> Result<EndorsementResponse, LedgerError> {
        let mut state = self.state.lock();
        state.check_peer_query(peer.name())?;
        if let Some(reason) = state.faults.install_failures.get(peer.name()) {
            return Ok(EndorsementResponse::failure(peer.name(), "", reason.clone()));
        }
        let record = state.peers.entry(peer.name().to_string()).or_default();
        if !record.installed.insert(request.chaincode.clone()) {
            return Ok(EndorsementResponse::failure(
                peer.name(),
                "",
                format!("chaincode {} already installed", request.chaincode),
            ));
        }
        state.calls.installs.push(InstallCall {
            peer: peer.name().to_string(),
            chaincode: request.chaincode.clone(),
        });
        trace!(peer = %peer.name(), chaincode = %request.chaincode, "mock install");
        Ok(EndorsementResponse::success(peer.name(), "", Vec::new()))
    }

    async fn send_proposal(
        &self,
        _ctx: &ClientContext,
        channel: &ChannelHandle,
        request: &ProposalRequest,
        peer: &PeerHandle,
    ) -> Result<EndorsementResponse, LedgerError> {
        let mut state = self.state.lock();
        state.check_reachable(peer.name())?;
        state.calls.proposals.push(ProposalCall {
            peer: peer.name().to_string(),
            kind: request.kind,
            chaincode: request.chaincode.clone(),
        });

        let tx_id = request.tx_id();
        if let Some(reason) = state.faults.endorsement_failures.get(peer.name()) {
            return Ok(EndorsementResponse::failure(peer.name(), tx_id, reason.clone()));
        }
        if !state.is_joined(peer.name(), channel.name()) {
            return Ok(EndorsementResponse::failure(
                peer.name(),
                tx_id,
                format!("peer is not joined to channel {}", channel.name()),
            ));
        }
        let installed = state
            .peers
            .get(peer.name())
            .is_some_and(|record| record.installed.contains(&request.chaincode));
        let ready = match request.kind {
            ProposalKind::Instantiate | ProposalKind::Upgrade => installed,
            ProposalKind::Transaction | ProposalKind::Query => state
                .channels
                .get(channel.name())
                .is_some_and(|record| record.instantiated.contains_key(&request.chaincode.name)),
        };
        if !ready {
            return Ok(EndorsementResponse::failure(
                peer.name(),
                tx_id,
                format!("chaincode {} is not available on this peer", request.chaincode),
            ));
        }

        let payload = state
            .faults
            .divergent_payloads
            .get(peer.name())
            .cloned()
            .unwrap_or_else(|| state.endorsement_payload(request));
        Ok(EndorsementResponse::success(peer.name(), tx_id, payload))
    }

    async fn submit_to_orderer(
        &self,
        _ctx: &ClientContext,
        channel: &ChannelHandle,
        transaction: EndorsedTransaction,
    ) -> Result<CommitEvent, LedgerError> {
        let mut state = self.state.lock();
        let orderer = channel
            .orderers()
            .first()
            .map(|o| o.name().to_string())
            .unwrap_or_else(|| "orderer".to_string());
        if state.faults.orderer_rejections > 0 {
            state.faults.orderer_rejections -= 1;
            return Err(LedgerError::rejected(orderer, "SERVICE_UNAVAILABLE"));
        }

        let proposal = &transaction.proposal;
        let Some(record) = state.channels.get(channel.name()) else {
            return Err(LedgerError::not_found(format!(
                "channel {} unknown to the ordering service",
                channel.name()
            )));
        };
        if proposal.kind == ProposalKind::Upgrade
            && !record.instantiated.contains_key(&proposal.chaincode.name)
        {
            return Err(LedgerError::rejected(
                orderer,
                format!("cannot upgrade {}: not instantiated", proposal.chaincode.name),
            ));
        }

        state.block_height += 1;
        let block_number = state.block_height;
        let validation = state
            .faults
            .commit_codes
            .pop_front()
            .unwrap_or(ValidationCode::Valid);

        if validation.is_valid() {
            if matches!(proposal.kind, ProposalKind::Instantiate | ProposalKind::Upgrade) {
                if let Some(record) = state.channels.get_mut(channel.name()) {
                    record
                        .instantiated
                        .insert(proposal.chaincode.name.clone(), proposal.chaincode.clone());
                }
            }
            state.calls.submissions.push(SubmissionCall {
                channel: channel.name().to_string(),
                kind: proposal.kind,
                chaincode: proposal.chaincode.clone(),
                tx_id: transaction.tx_id().to_string(),
            });
        }

        Ok(CommitEvent {
            tx_id: transaction.tx_id().to_string(),
            block_number,
            validation,
        })
    }

    async fn fetch_channel_config(
        &self,
        _ctx: &ClientContext,
        channel: &ChannelHandle,
    ) -> Result<Vec<u8>, LedgerError> {
        self.state
            .lock()
            .channels
            .get(channel.name())
            .map(|record| record.config.clone())
            .ok_or_else(|| LedgerError::not_found(format!("channel {}", channel.name())))
    }

    async fn sign_channel_update(
        &self,
        ctx: &ClientContext,
        update: &[u8],
    ) -> Result<ConfigSignature, LedgerError> {
        Ok(sign(ctx, update))
    }

    async fn update_channel_config(
        &self,
        _ctx: &ClientContext,
        channel: &ChannelHandle,
        update: &[u8],
        signatures: &[ConfigSignature],
    ) -> Result<(), LedgerError> {
        if signatures.is_empty() {
            return Err(LedgerError::invalid_argument(
                "configuration update carries no signatures",
            ));
        }
        let mut state = self.state.lock();
        let Some(record) = state.channels.get_mut(channel.name()) else {
            return Err(LedgerError::not_found(format!("channel {}", channel.name())));
        };
        record.config = update.to_vec();
        state.calls.config_updates.push(ConfigUpdateCall {
            channel: channel.name().to_string(),
            update: update.to_vec(),
            signatures: signatures.len(),
        });
        Ok(())
    }
}
