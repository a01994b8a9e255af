//! Ready-made networks
//!
//! Each fixture owns a temporary directory holding the channel creation
//! transactions its topology references; keep the fixture alive for as long
//! as the topology is in use.

use crate::builders::TopologyBuilder;
use crate::identity::StaticIdentityProvider;
use ledgerform_core::Topology;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Topology plus the files and identities it needs
#[derive(Debug)]
pub struct NetworkFixture {
    /// Declared network
    pub topology: Topology,
    /// Identities for every declared admin
    pub identities: StaticIdentityProvider,
    dir: TempDir,
}

impl NetworkFixture {
    /// Wrap a topology whose files live in `dir`
    pub fn new(topology: Topology, dir: TempDir) -> Self {
        let identities = StaticIdentityProvider::for_topology(&topology);
        Self {
            topology,
            identities,
            dir,
        }
    }

    /// Directory holding fixture files
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Write a channel creation transaction for `channel` into `dir`
pub fn write_channel_definition(dir: &Path, channel: &str) -> PathBuf {
    let path = dir.join(format!("{channel}.tx"));
    std::fs::write(&path, format!("channel-create:{channel}")).expect("write channel definition");
    path
}

/// One channel `trade`, one orderer, two owned peers, chaincode `mapcc` at version 1
pub fn single_channel_network() -> NetworkFixture {
    let dir = tempfile::tempdir().expect("create fixture dir");
    let definition = write_channel_definition(dir.path(), "trade");
    let topology = TopologyBuilder::new()
        .admin("org1", "Org1MSP")
        .orderer("orderer0")
        .peer("peer0")
        .peer("peer1")
        .event_source("peer0-events")
        .chaincode("mapcc", "1")
        .channel("trade", |c| {
            c.admin("org1")
                .orderer("orderer0")
                .peer("peer0")
                .peer("peer1")
                .event_source("peer0-events")
                .definition(definition)
                .chaincode("mapcc")
        })
        .build();
    NetworkFixture::new(topology, dir)
}

/// Channels `alpha` and `beta` sharing one orderer and two owned peers
pub fn two_channel_network() -> NetworkFixture {
    let dir = tempfile::tempdir().expect("create fixture dir");
    let alpha = write_channel_definition(dir.path(), "alpha");
    let beta = write_channel_definition(dir.path(), "beta");
    let topology = TopologyBuilder::new()
        .admin("org1", "Org1MSP")
        .orderer("orderer0")
        .peer("peer0")
        .peer("peer1")
        .chaincode("mapcc", "1")
        .chaincode("assets", "2")
        .channel("alpha", |c| {
            c.admin("org1")
                .orderer("orderer0")
                .peer("peer0")
                .peer("peer1")
                .definition(alpha)
                .chaincode("mapcc")
        })
        .channel("beta", |c| {
            c.admin("org1")
                .orderer("orderer0")
                .peer("peer0")
                .peer("peer1")
                .definition(beta)
                .chaincode("assets")
        })
        .build();
    NetworkFixture::new(topology, dir)
}

/// Channel `shared` with one owned peer and one external partner peer
pub fn partner_network() -> NetworkFixture {
    let dir = tempfile::tempdir().expect("create fixture dir");
    let definition = write_channel_definition(dir.path(), "shared");
    let topology = TopologyBuilder::new()
        .admin("org1", "Org1MSP")
        .orderer("orderer0")
        .peer("peer0")
        .external_peer("partner0")
        .chaincode("mapcc", "1")
        .channel("shared", |c| {
            c.admin("org1")
                .orderer("orderer0")
                .peer("peer0")
                .peer("partner0")
                .definition(definition)
                .chaincode("mapcc")
        })
        .build();
    NetworkFixture::new(topology, dir)
}
