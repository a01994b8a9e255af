//! Engine error types
//!
//! Three layers, innermost first: `ProbeError` for a single state query,
//! `PipelineError` for one pass through endorsement and ordering, and
//! `ReconcileError` for everything a run can fail with. Fatal errors are
//! wrapped with the chaincode and channel they occurred in; the wrapped error
//! stays reachable through `source()`.

use crate::pipeline::ConsistencyGroup;
use ledgerform_core::{
    IdentityError, LedgerError, RetryError, TopologyLookupError, ValidationCode,
};
use std::fmt;
use std::path::PathBuf;

/// State query issued by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Channels a peer has joined
    JoinedChannels,
    /// Chaincodes installed on a peer
    InstalledChaincodes,
    /// Chaincodes instantiated on a channel
    InstantiatedChaincodes,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProbeKind::JoinedChannels => "joined channels",
            ProbeKind::InstalledChaincodes => "installed chaincodes",
            ProbeKind::InstantiatedChaincodes => "instantiated chaincodes",
        };
        f.write_str(label)
    }
}

/// Failure of a single state query
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// Peer could not answer
    #[error("{peer} could not answer the {probe} probe: {source}")]
    Unavailable {
        /// Probed peer
        peer: String,
        /// Query issued
        probe: ProbeKind,
        /// Client failure
        #[source]
        source: LedgerError,
    },
    /// Peer refused to answer for our identity
    #[error("{peer} denied the {probe} probe: {source}")]
    Denied {
        /// Probed peer
        peer: String,
        /// Query issued
        probe: ProbeKind,
        /// Client failure
        #[source]
        source: LedgerError,
    },
}

impl ProbeError {
    /// Classify a client failure of `probe` against `peer`
    pub fn from_ledger(peer: &str, probe: ProbeKind, source: LedgerError) -> Self {
        if source.is_access_denied() {
            ProbeError::Denied {
                peer: peer.to_string(),
                probe,
                source,
            }
        } else {
            ProbeError::Unavailable {
                peer: peer.to_string(),
                probe,
                source,
            }
        }
    }

    /// Whether the peer refused the query
    pub fn is_denied(&self) -> bool {
        matches!(self, ProbeError::Denied { .. })
    }
}

/// A peer that did not endorse, with its reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementFailure {
    /// Peer name
    pub peer: String,
    /// Reason reported by the peer or the transport
    pub reason: String,
}

impl fmt::Display for EndorsementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.peer, self.reason)
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of one endorsement and ordering pass
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// No peer was given to endorse
    #[error("no endorsing peers supplied")]
    NoEndorsers,

    /// Every endorser failed
    #[error("no successful endorsement for {tx_id}: {}", join_display(.failures))]
    NoSuccessfulEndorsement {
        /// Transaction id
        tx_id: String,
        /// Every failed endorsement
        failures: Vec<EndorsementFailure>,
    },

    /// Successful endorsements do not agree on the result
    #[error(
        "endorsements for {tx_id} diverge into {} consistency groups: {}",
        .groups.len(),
        join_display(.groups)
    )]
    EndorsementDivergence {
        /// Transaction id
        tx_id: String,
        /// Groups of peers returning identical payloads
        groups: Vec<ConsistencyGroup>,
    },

    /// Ordering service refused the transaction
    #[error("ordering of {tx_id} failed: {source}")]
    OrdererRejected {
        /// Transaction id
        tx_id: String,
        /// Client failure
        #[source]
        source: LedgerError,
    },

    /// Transaction was ordered but committed invalid
    #[error("transaction {tx_id} committed with validation code {code}")]
    CommitInvalid {
        /// Transaction id
        tx_id: String,
        /// Validation code reported by the committer
        code: ValidationCode,
    },

    /// Query got no successful response
    #[error("query failed: {reason}")]
    QueryFailed {
        /// Last failure seen
        reason: String,
    },
}

/// Failure of an engine operation
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Nothing to reconcile
    #[error("topology declares no channels")]
    NoChannels,

    /// A referenced key is not declared
    #[error(transparent)]
    Lookup(#[from] TopologyLookupError),

    /// Admin identity could not be resolved
    #[error("cannot resolve identity of admin '{admin}': {source}")]
    Identity {
        /// Admin key
        admin: String,
        /// Provider failure
        #[source]
        source: IdentityError,
    },

    /// Connecting a node failed
    #[error("cannot connect {node}: {source}")]
    Connect {
        /// Node key
        node: String,
        /// Client failure
        #[source]
        source: LedgerError,
    },

    /// Channel lists no orderer to create or reach it through
    #[error("no orderer declared for the channel")]
    NoOrderers,

    /// Channel creation transaction could not be read
    #[error("cannot read channel definition {path}: {source}")]
    ChannelDefinition {
        /// Definition file
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Channel creation transaction could not be signed
    #[error("cannot sign channel definition: {source}")]
    DefinitionSigning {
        /// Client failure
        #[source]
        source: LedgerError,
    },

    /// A peer did not join within the retry budget, or was refused
    #[error("peer {peer} did not join: {source}")]
    Join {
        /// Peer name
        peer: String,
        /// Every attempt's cause
        #[source]
        source: RetryError<LedgerError>,
    },

    /// Channel handle initialization failed
    #[error("channel initialization failed: {source}")]
    Initialize {
        /// Client failure
        #[source]
        source: LedgerError,
    },

    /// A peer trusted to be a member is not one
    #[error("assumption violated: assumed member {peer} does not serve the channel: {source}")]
    AssumptionViolated {
        /// Peer name
        peer: String,
        /// Probe failure
        #[source]
        source: ProbeError,
    },

    /// An owned peer failed a state query
    #[error("infrastructure fault on owned peer {peer}: {source}")]
    InfrastructureFault {
        /// Peer name
        peer: String,
        /// Probe failure
        #[source]
        source: ProbeError,
    },

    /// Policy material referenced by a chaincode could not be read
    #[error("cannot read {what} {path}: {source}")]
    PolicyFile {
        /// Kind of policy
        what: &'static str,
        /// Policy file
        path: PathBuf,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Collection policy file is not valid JSON
    #[error("invalid collection policy {path}: {message}")]
    CollectionPolicy {
        /// Policy file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Endorsement or ordering failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Channel configuration could not be read, transcoded or updated
    #[error("channel configuration {operation} failed: {source}")]
    ChannelConfig {
        /// Step that failed
        operation: &'static str,
        /// Client or transcoder failure
        #[source]
        source: LedgerError,
    },

    /// Failure while reconciling one chaincode
    #[error("chaincode {chaincode}: {source}")]
    Chaincode {
        /// Chaincode key
        chaincode: String,
        /// Wrapped failure
        #[source]
        source: Box<ReconcileError>,
    },

    /// Failure while reconciling one channel
    #[error("channel {channel}: {source}")]
    Channel {
        /// Channel name
        channel: String,
        /// Wrapped failure
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Wrap `error` with the channel it occurred in
    pub fn in_channel(channel: &str, error: ReconcileError) -> Self {
        ReconcileError::Channel {
            channel: channel.to_string(),
            source: Box::new(error),
        }
    }

    /// Wrap `error` with the chaincode it occurred in
    pub fn in_chaincode(chaincode: &str, error: ReconcileError) -> Self {
        ReconcileError::Chaincode {
            chaincode: chaincode.to_string(),
            source: Box::new(error),
        }
    }

    /// Innermost error below any channel and chaincode wrapping
    pub fn root(&self) -> &ReconcileError {
        match self {
            ReconcileError::Channel { source, .. } | ReconcileError::Chaincode { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// Channel this error was wrapped with, if any
    pub fn channel(&self) -> Option<&str> {
        match self {
            ReconcileError::Channel { channel, .. } => Some(channel),
            _ => None,
        }
    }
}
