//! Ledgerform Testing Infrastructure
//!
//! In-memory collaborators and fixtures shared by the workspace's tests:
//! a `MockLedger` network with call recording and fault injection, a
//! transparent `MockTranscoder`, a `StaticIdentityProvider`, topology
//! builders and ready-made networks.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! ledgerform-testkit = { workspace = true }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod builders;
pub mod fixtures;
pub mod identity;
pub mod ledger;
pub mod transcoder;

pub use builders::{ChannelBuilder, TopologyBuilder};
pub use fixtures::{
    partner_network, single_channel_network, two_channel_network, write_channel_definition,
    NetworkFixture,
};
pub use identity::StaticIdentityProvider;
pub use ledger::{
    ConfigUpdateCall, InstallCall, JoinCall, MockLedger, ProposalCall, SubmissionCall,
};
pub use transcoder::MockTranscoder;

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber once per process
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
