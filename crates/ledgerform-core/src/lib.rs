//! Ledgerform Core - Declared Network Model and Collaborator Interfaces
//!
//! This crate holds everything the convergence engine shares with the outside
//! world: the immutable declared topology, chaincode identifiers, the traits
//! through which the remote ledger network and identity material are reached,
//! and the bounded retry primitive used by the "not yet ready" steps.
//!
//! # Layers
//!
//! ## Declared Model
//! - `Topology`: channels, peers, orderers, event sources, chaincodes, admins
//! - `ChaincodeId`: `(name, version)` pair used for every membership comparison
//!
//! ## Collaborator Interfaces (no implementations)
//! - `LedgerClient`: connect, create/join/initialize channels, install, propose,
//!   order, query, channel configuration
//! - `IdentityProvider`: admin key to `SigningIdentity`
//! - `ConfigTranscoder`: JSON/protobuf conversion of channel configuration
//!
//! ## Reliability
//! - `RetryPolicy`: fixed-delay bounded retry accumulating every cause

#![forbid(unsafe_code)]

// === Core Modules ===

/// Declared network topology
pub mod topology;

/// Chaincode identifiers
pub mod identifiers;

/// Collaborator interfaces (ledger, identity, transcoder, reliability)
pub mod effects;

/// Engine tuning knobs
pub mod config;

/// Shared error types
pub mod errors;

// === Public API Re-exports ===

pub use config::EngineConfig;
pub use effects::{
    identity::{ClientContext, IdentityProvider, SigningIdentity},
    ledger::{
        ChannelDefinition, ChannelHandle, CommitEvent, ConfigSignature, EndorsedTransaction,
        EndorsementOutcome, EndorsementResponse, EventSourceHandle, InstallRequest,
        LedgerClient, OrdererHandle, PeerHandle, ProposalKind, ProposalRequest,
        ValidationCode,
    },
    reliability::{RetryError, RetryPolicy},
    transcoder::ConfigTranscoder,
};
pub use errors::{IdentityError, LedgerError, LedgerErrorKind, TopologyLookupError};
pub use identifiers::ChaincodeId;
pub use topology::{
    AdminSpec, ChaincodeLanguage, ChaincodeSpec, ChannelChaincode, ChannelSpec,
    CollectionPolicy, NodeSpec, PeerRoles, Topology,
};
