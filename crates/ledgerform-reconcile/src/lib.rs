//! Ledgerform Reconcile - Declarative Network Convergence
//!
//! Drives a live permissioned ledger network towards a declared `Topology`
//! and keeps chaincode current. Every step observes before it mutates, so a
//! run against a converged network changes nothing.
//!
//! # Components
//!
//! - `TopologyProbe`: joined channels, installed and instantiated chaincodes
//!   of one peer
//! - `TransactionPipeline`: concurrent endorsement, single consistency group
//!   check, ordering and commit resolution
//! - `ChannelReconciler`: create or attach, join, initialize
//! - `ChaincodeLifecycleReconciler`: install where missing, instantiate or
//!   upgrade unless already live
//! - `ConvergenceWaiter`: poll owned peers until chaincodes are observable
//! - `ChannelConfigurator`: channel configuration read, update and sign
//! - `NetworkManager`: the operations above in run order
//!
//! # Trust boundary
//!
//! Peers declared `external` are operated by other organizations. They are
//! assumed to be channel members and are never joined or installed to. If
//! such a peer later fails to answer a channel probe the run stops with
//! `ReconcileError::AssumptionViolated`, which is distinct from the
//! `InfrastructureFault` raised for owned peers.

#![forbid(unsafe_code)]

pub mod channel;
pub mod configurator;
pub mod convergence;
pub mod errors;
pub mod lifecycle;
pub mod manager;
pub mod pipeline;
pub mod probe;
pub mod report;

pub use channel::{ChannelPeer, ChannelReconciler, ChannelState, LiveChannelView};
pub use configurator::ChannelConfigurator;
pub use convergence::{ConvergenceReport, ConvergenceWaiter, PendingPeer, WaitTarget};
pub use errors::{EndorsementFailure, PipelineError, ProbeError, ProbeKind, ReconcileError};
pub use lifecycle::{ChaincodeLifecycleReconciler, LifecycleAction};
pub use manager::{ChaincodeFilter, NetworkManager};
pub use pipeline::{consistency_groups, ConsistencyGroup, TransactionPipeline};
pub use probe::TopologyProbe;
pub use report::{
    ChaincodeAction, ChaincodeReport, ChannelReport, InstallFailure, NetworkReport,
    PartialOutcome,
};
