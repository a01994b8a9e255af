//! Topology builders
//!
//! Terse construction of `Topology` values for tests. Node URLs are derived
//! from the key; admin material paths are placeholders since the identity
//! stubs never read them.

use ledgerform_core::{
    AdminSpec, ChaincodeSpec, ChannelChaincode, ChannelSpec, CollectionPolicy, NodeSpec,
    PeerRoles, Topology,
};
use std::path::PathBuf;

/// Builder for a complete `Topology`
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    topology: Topology,
}

impl TopologyBuilder {
    /// Empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an admin
    pub fn admin(mut self, key: &str, msp_id: &str) -> Self {
        self.topology.admins.insert(
            key.to_string(),
            AdminSpec {
                name: format!("{key}-admin"),
                msp_id: msp_id.to_string(),
                certificate: PathBuf::from(format!("{key}/signcerts/cert.pem")),
                private_key: PathBuf::from(format!("{key}/keystore/key.pem")),
            },
        );
        self
    }

    /// Declare an orderer at `grpc://{key}:7050`
    pub fn orderer(mut self, key: &str) -> Self {
        self.topology
            .orderers
            .insert(key.to_string(), NodeSpec::new(format!("grpc://{key}:7050")));
        self
    }

    /// Declare an owned peer at `grpc://{key}:7051`
    pub fn peer(mut self, key: &str) -> Self {
        self.topology
            .peers
            .insert(key.to_string(), NodeSpec::new(format!("grpc://{key}:7051")));
        self
    }

    /// Declare a peer operated by another organization
    pub fn external_peer(mut self, key: &str) -> Self {
        let mut spec = NodeSpec::new(format!("grpc://{key}:7051"));
        spec.external = true;
        self.topology.peers.insert(key.to_string(), spec);
        self
    }

    /// Declare an event source at `grpc://{key}:7053`
    pub fn event_source(mut self, key: &str) -> Self {
        self.topology
            .event_sources
            .insert(key.to_string(), NodeSpec::new(format!("grpc://{key}:7053")));
        self
    }

    /// Declare a Go chaincode `key` at `version`
    pub fn chaincode(self, key: &str, version: &str) -> Self {
        let mut spec = ChaincodeSpec::new(key, format!("github.com/example/{key}"));
        spec.version = version.to_string();
        spec.init_arguments = vec!["init".to_string()];
        self.chaincode_spec(key, spec)
    }

    /// Declare a fully specified chaincode
    pub fn chaincode_spec(mut self, key: &str, spec: ChaincodeSpec) -> Self {
        self.topology.chaincodes.insert(key.to_string(), spec);
        self
    }

    /// Declare a channel
    pub fn channel(mut self, name: &str, build: impl FnOnce(ChannelBuilder) -> ChannelBuilder) -> Self {
        let spec = build(ChannelBuilder::default()).spec;
        self.topology.channels.insert(name.to_string(), spec);
        self
    }

    /// Finish
    pub fn build(self) -> Topology {
        self.topology
    }
}

/// Builder for one `ChannelSpec`
#[derive(Debug, Clone, Default)]
pub struct ChannelBuilder {
    spec: ChannelSpec,
}

impl ChannelBuilder {
    /// Admin key
    pub fn admin(mut self, key: &str) -> Self {
        self.spec.admin = key.to_string();
        self
    }

    /// Append an orderer key
    pub fn orderer(mut self, key: &str) -> Self {
        self.spec.orderers.push(key.to_string());
        self
    }

    /// Append a peer key with every role
    pub fn peer(self, key: &str) -> Self {
        self.peer_with_roles(key, PeerRoles::default())
    }

    /// Append a peer key with explicit roles
    pub fn peer_with_roles(mut self, key: &str, roles: PeerRoles) -> Self {
        self.spec.peers.insert(key.to_string(), roles);
        self
    }

    /// Append an event source key
    pub fn event_source(mut self, key: &str) -> Self {
        self.spec.event_sources.push(key.to_string());
        self
    }

    /// Channel creation transaction file
    pub fn definition(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.definition = Some(path.into());
        self
    }

    /// Append a chaincode reference
    pub fn chaincode(mut self, name: &str) -> Self {
        self.spec.chaincodes.push(ChannelChaincode::named(name));
        self
    }

    /// Append a chaincode reference with a channel specific collection policy
    pub fn chaincode_with_collections(mut self, name: &str, policy: CollectionPolicy) -> Self {
        self.spec.chaincodes.push(ChannelChaincode {
            name: name.to_string(),
            collection_policy: Some(policy),
        });
        self
    }
}
