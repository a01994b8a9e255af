//! Declared network topology
//!
//! The topology is the immutable input of one engine run. Every collection is
//! an insertion-ordered map so that channels are reconciled, and orderers are
//! tried, in the order the operator declared them. The loader in
//! `ledgerform-topology` is responsible for normalizing the on-disk shape;
//! nothing here knows whether an entry was declared as a list or a map.

use crate::errors::TopologyLookupError;
use crate::identifiers::{ChaincodeId, DEFAULT_CHAINCODE_VERSION};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Complete declared network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    /// Channel name -> channel declaration
    pub channels: IndexMap<String, ChannelSpec>,
    /// Peer key -> node declaration
    pub peers: IndexMap<String, NodeSpec>,
    /// Orderer key -> node declaration
    pub orderers: IndexMap<String, NodeSpec>,
    /// Event source key -> node declaration
    pub event_sources: IndexMap<String, NodeSpec>,
    /// Chaincode key -> chaincode declaration
    pub chaincodes: IndexMap<String, ChaincodeSpec>,
    /// Admin key -> admin declaration
    pub admins: IndexMap<String, AdminSpec>,
}

impl Topology {
    /// Channel declaration by name
    pub fn channel(&self, name: &str) -> Result<&ChannelSpec, TopologyLookupError> {
        self.channels
            .get(name)
            .ok_or_else(|| TopologyLookupError::new("channel", name))
    }

    /// Peer declaration by key
    pub fn peer(&self, key: &str) -> Result<&NodeSpec, TopologyLookupError> {
        self.peers
            .get(key)
            .ok_or_else(|| TopologyLookupError::new("peer", key))
    }

    /// Orderer declaration by key
    pub fn orderer(&self, key: &str) -> Result<&NodeSpec, TopologyLookupError> {
        self.orderers
            .get(key)
            .ok_or_else(|| TopologyLookupError::new("orderer", key))
    }

    /// Event source declaration by key
    pub fn event_source(&self, key: &str) -> Result<&NodeSpec, TopologyLookupError> {
        self.event_sources
            .get(key)
            .ok_or_else(|| TopologyLookupError::new("event source", key))
    }

    /// Chaincode declaration by key
    pub fn chaincode(&self, key: &str) -> Result<&ChaincodeSpec, TopologyLookupError> {
        self.chaincodes
            .get(key)
            .ok_or_else(|| TopologyLookupError::new("chaincode", key))
    }

    /// Admin declaration by key
    pub fn admin(&self, key: &str) -> Result<&AdminSpec, TopologyLookupError> {
        self.admins
            .get(key)
            .ok_or_else(|| TopologyLookupError::new("admin", key))
    }

    /// Declared chaincode ids of one channel, in declaration order
    pub fn channel_chaincode_ids(&self, channel: &str) -> Result<Vec<ChaincodeId>, TopologyLookupError> {
        let spec = self.channel(channel)?;
        spec.chaincodes
            .iter()
            .map(|entry| self.chaincode(&entry.name).map(ChaincodeSpec::chaincode_id))
            .collect()
    }
}

/// One channel declaration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSpec {
    /// Admin key whose identity performs every channel operation
    pub admin: String,
    /// Orderer keys; the first one is used to create the channel
    pub orderers: Vec<String>,
    /// Peer key -> roles the peer plays on this channel
    pub peers: IndexMap<String, PeerRoles>,
    /// Event source keys
    pub event_sources: Vec<String>,
    /// Channel creation transaction, required to create a missing channel
    pub definition: Option<PathBuf>,
    /// Chaincodes to be instantiated on this channel
    pub chaincodes: Vec<ChannelChaincode>,
}

/// Roles a peer plays on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRoles {
    /// Receives proposals for endorsement
    pub endorsing: bool,
    /// Answers chaincode queries
    pub chaincode_query: bool,
    /// Answers ledger queries
    pub ledger_query: bool,
    /// Delivers block events
    pub event_source: bool,
}

impl Default for PeerRoles {
    fn default() -> Self {
        Self {
            endorsing: true,
            chaincode_query: true,
            ledger_query: true,
            event_source: true,
        }
    }
}

/// Chaincode reference inside a channel declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelChaincode {
    /// Chaincode key in `Topology::chaincodes`
    pub name: String,
    /// Channel specific private data collections, overriding the chaincode's own
    pub collection_policy: Option<CollectionPolicy>,
}

impl ChannelChaincode {
    /// Reference without a channel specific collection policy
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_policy: None,
        }
    }
}

/// Peer, orderer or event source declaration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSpec {
    /// Endpoint, e.g. `grpcs://peer0.org1.example.com:7051`
    pub url: String,
    /// Display name; the declaration key is used when absent
    pub name: Option<String>,
    /// TLS certificate of the node
    pub tls_certificate: Option<PathBuf>,
    /// Free-form connection properties handed to the client
    pub properties: IndexMap<String, String>,
    /// Operated by another organization; never joined or installed to
    pub external: bool,
}

impl NodeSpec {
    /// Declaration for `url` with no extras
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Name to present for this node, falling back to its key
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(key)
    }
}

/// Source language of a chaincode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChaincodeLanguage {
    /// Go chaincode
    #[default]
    #[serde(alias = "go", alias = "GO_LANG", alias = "GOLANG")]
    Golang,
    /// Java chaincode
    #[serde(alias = "JAVA")]
    Java,
    /// Node.js chaincode
    #[serde(alias = "NODE", alias = "javascript")]
    Node,
}

impl fmt::Display for ChaincodeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChaincodeLanguage::Golang => "golang",
            ChaincodeLanguage::Java => "java",
            ChaincodeLanguage::Node => "node",
        };
        f.write_str(label)
    }
}

/// Private data collection configuration
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionPolicy {
    /// Collection configuration stored in a file
    File(PathBuf),
    /// Collection configuration declared inline
    Inline(serde_json::Value),
}

/// Deployable chaincode declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ChaincodeSpec {
    /// Name registered on the network
    pub id: String,
    /// Source path handed to the install proposal
    pub source_location: String,
    /// Directory the source location is relative to
    pub source_prefix: Option<PathBuf>,
    /// Version, `"0"` when not declared
    pub version: String,
    /// Source language
    pub language: ChaincodeLanguage,
    /// Arguments of the `init` call made on instantiate and upgrade
    pub init_arguments: Vec<String>,
    /// Endorsement policy file
    pub endorsement_policy: Option<PathBuf>,
    /// Default private data collections
    pub collection_policy: Option<CollectionPolicy>,
}

impl ChaincodeSpec {
    /// Chaincode with default version and language
    pub fn new(id: impl Into<String>, source_location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_location: source_location.into(),
            source_prefix: None,
            version: DEFAULT_CHAINCODE_VERSION.to_string(),
            language: ChaincodeLanguage::default(),
            init_arguments: Vec::new(),
            endorsement_policy: None,
            collection_policy: None,
        }
    }

    /// Identifier used for every membership comparison
    pub fn chaincode_id(&self) -> ChaincodeId {
        ChaincodeId::new(self.id.clone(), self.version.clone())
    }
}

/// Administrator whose identity signs channel operations
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSpec {
    /// Enrollment name
    pub name: String,
    /// Membership service provider id
    pub msp_id: String,
    /// Signing certificate PEM file
    pub certificate: PathBuf,
    /// Private key PEM file
    pub private_key: PathBuf,
}
