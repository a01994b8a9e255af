//! Ledger client interface
//!
//! `LedgerClient` is the engine's only path to the remote network. It covers
//! node connections, channel lifecycle, chaincode install and proposals,
//! ordering, the three state probes and channel configuration.
//!
//! # Handles
//!
//! Connections are represented by handles produced by the client. An
//! `OrdererHandle` is deliberately not `Clone`: creating a channel consumes
//! the handle it was created against, and a caller that needs the orderer
//! again after a failed creation must connect a fresh one.

use crate::effects::identity::ClientContext;
use crate::errors::LedgerError;
use crate::identifiers::ChaincodeId;
use crate::topology::{ChaincodeLanguage, NodeSpec};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Node handles
// =============================================================================

/// Connected peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerHandle {
    key: String,
    name: String,
    url: String,
}

impl PeerHandle {
    /// Handle for the peer declared under `key`
    pub fn new(key: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Declaration key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Node name as presented to the network
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Connected orderer; consumed by channel creation
#[derive(Debug, PartialEq, Eq)]
pub struct OrdererHandle {
    key: String,
    name: String,
    url: String,
}

impl OrdererHandle {
    /// Handle for the orderer declared under `key`
    pub fn new(key: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Declaration key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Node name as presented to the network
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Connected event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSourceHandle {
    key: String,
    name: String,
    url: String,
}

impl EventSourceHandle {
    /// Handle for the event source declared under `key`
    pub fn new(key: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Declaration key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Node name as presented to the network
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Locally assembled view of a channel: the nodes calls on it are routed to
#[derive(Debug)]
pub struct ChannelHandle {
    name: String,
    orderers: Vec<OrdererHandle>,
    peers: Vec<PeerHandle>,
    event_sources: Vec<EventSourceHandle>,
    initialized: bool,
}

impl ChannelHandle {
    /// Empty handle for channel `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            orderers: Vec::new(),
            peers: Vec::new(),
            event_sources: Vec::new(),
            initialized: false,
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach an orderer
    pub fn add_orderer(&mut self, orderer: OrdererHandle) {
        self.orderers.push(orderer);
    }

    /// Attach a peer
    pub fn add_peer(&mut self, peer: PeerHandle) {
        self.peers.push(peer);
    }

    /// Attach an event source
    pub fn add_event_source(&mut self, source: EventSourceHandle) {
        self.event_sources.push(source);
    }

    /// Attached orderers, in attach order
    pub fn orderers(&self) -> &[OrdererHandle] {
        &self.orderers
    }

    /// Attached peers, in attach order
    pub fn peers(&self) -> &[PeerHandle] {
        &self.peers
    }

    /// Attached event sources
    pub fn event_sources(&self) -> &[EventSourceHandle] {
        &self.event_sources
    }

    /// Record that the client initialized this handle
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Whether the handle was initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

// =============================================================================
// Channel creation material
// =============================================================================

/// Serialized channel creation transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDefinition {
    bytes: Vec<u8>,
}

impl ChannelDefinition {
    /// Wrap raw definition bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Read a definition file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        std::fs::read(path).map(Self::new)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Signature over a channel definition or configuration update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSignature {
    /// MSP id of the signer
    pub signer_msp: String,
    /// Signature bytes
    pub bytes: Vec<u8>,
}

// =============================================================================
// Proposals
// =============================================================================

/// What a proposal asks endorsers to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalKind {
    /// Instantiate a chaincode on a channel
    Instantiate,
    /// Upgrade an instantiated chaincode to a new version
    Upgrade,
    /// Ordinary state-changing transaction
    Transaction,
    /// Read-only evaluation, never ordered
    Query,
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProposalKind::Instantiate => "instantiate",
            ProposalKind::Upgrade => "upgrade",
            ProposalKind::Transaction => "transaction",
            ProposalKind::Query => "query",
        };
        f.write_str(label)
    }
}

/// Proposal sent to endorsing peers
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalRequest {
    /// Proposal kind
    pub kind: ProposalKind,
    /// Target chaincode
    pub chaincode: ChaincodeId,
    /// Chaincode language, relevant for instantiate and upgrade
    pub language: ChaincodeLanguage,
    /// Function to call
    pub function: String,
    /// Call arguments
    pub args: Vec<String>,
    /// Transient data, never written to the ledger
    pub transient: BTreeMap<String, Vec<u8>>,
    /// Endorsement policy for instantiate and upgrade
    pub endorsement_policy: Option<Vec<u8>>,
    /// Private data collection configuration for instantiate and upgrade
    pub collection_config: Option<serde_json::Value>,
    /// How long a peer may take to answer
    pub wait_time: Duration,
    tx_id: String,
}

impl ProposalRequest {
    /// Proposal calling `function` on `chaincode`
    pub fn new(kind: ProposalKind, chaincode: ChaincodeId, function: impl Into<String>) -> Self {
        Self {
            kind,
            chaincode,
            language: ChaincodeLanguage::default(),
            function: function.into(),
            args: Vec::new(),
            transient: BTreeMap::new(),
            endorsement_policy: None,
            collection_config: None,
            wait_time: Duration::from_secs(120),
            tx_id: Uuid::new_v4().to_string(),
        }
    }

    /// Set call arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set peer wait time
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Set chaincode language
    pub fn with_language(mut self, language: ChaincodeLanguage) -> Self {
        self.language = language;
        self
    }

    /// Set endorsement policy bytes
    pub fn with_endorsement_policy(mut self, policy: Vec<u8>) -> Self {
        self.endorsement_policy = Some(policy);
        self
    }

    /// Set collection configuration
    pub fn with_collection_config(mut self, config: serde_json::Value) -> Self {
        self.collection_config = Some(config);
        self
    }

    /// Add a transient entry
    pub fn with_transient(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.transient.insert(key.into(), value);
        self
    }

    /// Transaction id every endorser signs over
    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Assign a fresh transaction id, used when the transaction is recreated
    pub fn renew_tx_id(&mut self) {
        self.tx_id = Uuid::new_v4().to_string();
    }
}

/// Outcome of one peer's endorsement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndorsementOutcome {
    /// Peer endorsed; `payload` is the simulated result
    Success {
        /// Proposal response payload
        payload: Vec<u8>,
    },
    /// Peer did not endorse
    Failure {
        /// Message returned by the peer or the transport
        reason: String,
    },
}

/// One peer's answer to a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementResponse {
    /// Responding peer name
    pub peer: String,
    /// Transaction id echoed by the peer
    pub tx_id: String,
    /// Success payload or failure reason
    pub outcome: EndorsementOutcome,
}

impl EndorsementResponse {
    /// Successful endorsement
    pub fn success(peer: impl Into<String>, tx_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            peer: peer.into(),
            tx_id: tx_id.into(),
            outcome: EndorsementOutcome::Success { payload },
        }
    }

    /// Failed endorsement
    pub fn failure(
        peer: impl Into<String>,
        tx_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            peer: peer.into(),
            tx_id: tx_id.into(),
            outcome: EndorsementOutcome::Failure {
                reason: reason.into(),
            },
        }
    }

    /// Whether the peer endorsed
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EndorsementOutcome::Success { .. })
    }

    /// Payload of a successful endorsement
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.outcome {
            EndorsementOutcome::Success { payload } => Some(payload),
            EndorsementOutcome::Failure { .. } => None,
        }
    }

    /// Reason of a failed endorsement
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            EndorsementOutcome::Success { .. } => None,
            EndorsementOutcome::Failure { reason } => Some(reason),
        }
    }
}

/// Endorsed transaction ready for ordering
#[derive(Debug, Clone, PartialEq)]
pub struct EndorsedTransaction {
    /// Proposal that was endorsed
    pub proposal: ProposalRequest,
    /// Consistent successful endorsements
    pub endorsements: Vec<EndorsementResponse>,
}

impl EndorsedTransaction {
    /// Transaction id
    pub fn tx_id(&self) -> &str {
        self.proposal.tx_id()
    }
}

/// Validation result recorded when a transaction is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    /// Committed and valid
    Valid,
    /// A key read during simulation changed before commit
    MvccReadConflict,
    /// A range read during simulation changed before commit
    PhantomReadConflict,
    /// Endorsements did not satisfy the endorsement policy
    EndorsementPolicyFailure,
    /// Any other validation code
    Other(i32),
}

impl ValidationCode {
    /// Whether the transaction took effect
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationCode::Valid)
    }

    /// Whether recreating the transaction may succeed
    pub fn is_read_conflict(&self) -> bool {
        matches!(
            self,
            ValidationCode::MvccReadConflict | ValidationCode::PhantomReadConflict
        )
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationCode::Valid => f.write_str("VALID"),
            ValidationCode::MvccReadConflict => f.write_str("MVCC_READ_CONFLICT"),
            ValidationCode::PhantomReadConflict => f.write_str("PHANTOM_READ_CONFLICT"),
            ValidationCode::EndorsementPolicyFailure => f.write_str("ENDORSEMENT_POLICY_FAILURE"),
            ValidationCode::Other(code) => write!(f, "CODE_{code}"),
        }
    }
}

/// Commit observed for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    /// Committed transaction id
    pub tx_id: String,
    /// Block holding the transaction
    pub block_number: u64,
    /// Validation result
    pub validation: ValidationCode,
}

/// Chaincode install proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Chaincode to install
    pub chaincode: ChaincodeId,
    /// Source path
    pub source_location: String,
    /// Directory the source path is relative to
    pub source_prefix: Option<PathBuf>,
    /// Source language
    pub language: ChaincodeLanguage,
}

// =============================================================================
// Client trait
// =============================================================================

/// Remote ledger network operations
///
/// Implementations perform exactly one remote interaction per call and never
/// retry on their own; retry and classification decisions belong to the engine.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Connect the peer declared under `key`
    async fn connect_peer(
        &self,
        ctx: &ClientContext,
        key: &str,
        spec: &NodeSpec,
    ) -> Result<PeerHandle, LedgerError>;

    /// Connect the orderer declared under `key`
    async fn connect_orderer(
        &self,
        ctx: &ClientContext,
        key: &str,
        spec: &NodeSpec,
    ) -> Result<OrdererHandle, LedgerError>;

    /// Connect the event source declared under `key`
    async fn connect_event_source(
        &self,
        ctx: &ClientContext,
        key: &str,
        spec: &NodeSpec,
    ) -> Result<EventSourceHandle, LedgerError>;

    /// Sign a channel creation transaction
    async fn sign_channel_definition(
        &self,
        ctx: &ClientContext,
        definition: &ChannelDefinition,
    ) -> Result<ConfigSignature, LedgerError>;

    /// Create `channel` through `orderer`, consuming the orderer handle
    ///
    /// On success the returned handle already has the orderer attached.
    async fn create_channel(
        &self,
        ctx: &ClientContext,
        channel: &str,
        orderer: OrdererHandle,
        definition: &ChannelDefinition,
        signature: &ConfigSignature,
    ) -> Result<ChannelHandle, LedgerError>;

    /// Join `peer` to the channel
    async fn join_channel(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        peer: &PeerHandle,
    ) -> Result<(), LedgerError>;

    /// Initialize the channel handle (fetch configuration, start event delivery)
    async fn initialize_channel(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
    ) -> Result<(), LedgerError>;

    /// Names of the channels `peer` has joined
    async fn query_joined_channels(
        &self,
        ctx: &ClientContext,
        peer: &PeerHandle,
    ) -> Result<Vec<String>, LedgerError>;

    /// Chaincodes installed on `peer`
    async fn query_installed_chaincodes(
        &self,
        ctx: &ClientContext,
        peer: &PeerHandle,
    ) -> Result<Vec<ChaincodeId>, LedgerError>;

    /// Chaincodes instantiated on the channel as seen by `peer`
    async fn query_instantiated_chaincodes(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        peer: &PeerHandle,
    ) -> Result<Vec<ChaincodeId>, LedgerError>;

    /// Send an install proposal to `peer`
    async fn propose_install(
        &self,
        ctx: &ClientContext,
        request: &InstallRequest,
        peer: &PeerHandle,
    ) -> Result<EndorsementResponse, LedgerError>;

    /// Send a channel proposal to `peer` for endorsement or evaluation
    async fn send_proposal(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        request: &ProposalRequest,
        peer: &PeerHandle,
    ) -> Result<EndorsementResponse, LedgerError>;

    /// Submit an endorsed transaction for ordering and wait for its commit
    async fn submit_to_orderer(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        transaction: EndorsedTransaction,
    ) -> Result<CommitEvent, LedgerError>;

    /// Current channel configuration, protobuf encoded
    async fn fetch_channel_config(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
    ) -> Result<Vec<u8>, LedgerError>;

    /// Sign a channel configuration update
    async fn sign_channel_update(
        &self,
        ctx: &ClientContext,
        update: &[u8],
    ) -> Result<ConfigSignature, LedgerError>;

    /// Apply a signed channel configuration update
    async fn update_channel_config(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        update: &[u8],
        signatures: &[ConfigSignature],
    ) -> Result<(), LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewed_tx_id_differs() {
        let mut request = ProposalRequest::new(
            ProposalKind::Transaction,
            ChaincodeId::new("mapcc", "1"),
            "put",
        )
        .with_args(["k", "v"]);
        let first = request.tx_id().to_string();
        request.renew_tx_id();
        assert_ne!(first, request.tx_id());
        assert_eq!(request.args, vec!["k".to_string(), "v".to_string()]);
    }

    #[test]
    fn test_response_accessors() {
        let ok = EndorsementResponse::success("peer0", "tx1", b"ok".to_vec());
        assert!(ok.is_success());
        assert_eq!(ok.payload(), Some(&b"ok"[..]));

        let failed = EndorsementResponse::failure("peer1", "tx1", "chaincode not installed");
        assert!(!failed.is_success());
        assert_eq!(failed.failure_reason(), Some("chaincode not installed"));
    }

    #[test]
    fn test_read_conflicts_are_retryable() {
        assert!(ValidationCode::MvccReadConflict.is_read_conflict());
        assert!(ValidationCode::PhantomReadConflict.is_read_conflict());
        assert!(!ValidationCode::EndorsementPolicyFailure.is_read_conflict());
        assert!(ValidationCode::Valid.is_valid());
    }

    #[test]
    fn test_definition_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channel.tx");
        std::fs::write(&path, b"definition").unwrap();
        let definition = ChannelDefinition::load(&path).unwrap();
        assert_eq!(definition.as_bytes(), b"definition");
        assert!(ChannelDefinition::load(&dir.path().join("missing.tx")).is_err());
    }
}
