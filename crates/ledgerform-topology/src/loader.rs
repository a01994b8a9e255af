//! Topology loader
//!
//! Reads a declared topology from TOML, JSON or YAML, normalizes it into the
//! core `Topology` model and validates its cross references. The format is
//! chosen from the file extension.

use crate::errors::TopologyError;
use crate::raw::{
    RawAdmin, RawChaincode, RawChannel, RawChannelChaincode, RawChannelPeers,
    RawCollectionPolicy, RawNode, RawTopology,
};
use crate::resolve::FileResolver;
use crate::validate::validate_topology;
use indexmap::IndexMap;
use ledgerform_core::identifiers::DEFAULT_CHAINCODE_VERSION;
use ledgerform_core::{
    AdminSpec, ChaincodeSpec, ChannelChaincode, ChannelSpec, CollectionPolicy, NodeSpec,
    PeerRoles, Topology,
};
use std::path::Path;
use tracing::{debug, info, warn};

/// Serialization format of a topology file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyFormat {
    /// TOML
    Toml,
    /// JSON
    Json,
    /// YAML
    Yaml,
}

impl TopologyFormat {
    /// Format implied by the extension of `path`
    pub fn from_path(path: &Path) -> Result<Self, TopologyError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Ok(TopologyFormat::Toml),
            Some("json") => Ok(TopologyFormat::Json),
            Some("yaml" | "yml") => Ok(TopologyFormat::Yaml),
            _ => Err(TopologyError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    fn label(self) -> &'static str {
        match self {
            TopologyFormat::Toml => "TOML",
            TopologyFormat::Json => "JSON",
            TopologyFormat::Yaml => "YAML",
        }
    }
}

/// Load and validate the topology declared in `path`
///
/// Relative file references inside the topology are resolved against the
/// directory containing `path`.
pub fn load_topology(path: impl AsRef<Path>) -> Result<Topology, TopologyError> {
    let path = path.as_ref();
    let format = TopologyFormat::from_path(path)?;
    let contents = std::fs::read_to_string(path).map_err(|source| TopologyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let topology = parse_topology(&contents, format, base_dir)?;
    info!(
        path = %path.display(),
        channels = topology.channels.len(),
        peers = topology.peers.len(),
        chaincodes = topology.chaincodes.len(),
        "topology loaded"
    );
    Ok(topology)
}

/// Parse, normalize and validate topology `contents`
pub fn parse_topology(
    contents: &str,
    format: TopologyFormat,
    base_dir: &Path,
) -> Result<Topology, TopologyError> {
    let parse_error = |message: String| TopologyError::Parse {
        format: format.label(),
        message,
    };
    let raw: RawTopology = match format {
        TopologyFormat::Toml => toml::from_str(contents).map_err(|e| parse_error(e.to_string()))?,
        TopologyFormat::Json => {
            serde_json::from_str(contents).map_err(|e| parse_error(e.to_string()))?
        }
        TopologyFormat::Yaml => {
            serde_yaml::from_str(contents).map_err(|e| parse_error(e.to_string()))?
        }
    };

    let topology = normalize(raw, &FileResolver::new(base_dir))?;
    validate_topology(&topology)?;
    Ok(topology)
}

// =============================================================================
// Normalization
// =============================================================================

fn normalize(raw: RawTopology, resolver: &FileResolver) -> Result<Topology, TopologyError> {
    let mut topology = Topology::default();

    for (key, admin) in raw.admins.0 {
        let spec = normalize_admin(&key, admin, resolver)?;
        topology.admins.insert(key, spec);
    }
    for (key, node) in raw.peers.0 {
        topology.peers.insert(key, normalize_node(node, resolver)?);
    }
    for (key, node) in raw.orderers.0 {
        if node.external {
            debug!(orderer = %key, "external flag has no meaning for orderers");
        }
        topology.orderers.insert(key, normalize_node(node, resolver)?);
    }
    for (key, node) in raw.event_sources.0 {
        topology.event_sources.insert(key, normalize_node(node, resolver)?);
    }
    for (key, chaincode) in raw.chaincodes.0 {
        let spec = normalize_chaincode(&key, chaincode, resolver)?;
        topology.chaincodes.insert(key, spec);
    }
    for (name, channel) in raw.channels.0 {
        let spec = normalize_channel(&name, channel, resolver)?;
        topology.channels.insert(name, spec);
    }

    Ok(topology)
}

fn normalize_admin(
    key: &str,
    raw: RawAdmin,
    resolver: &FileResolver,
) -> Result<AdminSpec, TopologyError> {
    Ok(AdminSpec {
        name: raw.name.unwrap_or_else(|| key.to_string()),
        msp_id: raw.msp_id,
        certificate: resolver.resolve(&raw.cert)?,
        private_key: resolver.resolve(&raw.private_key)?,
    })
}

fn normalize_node(raw: RawNode, resolver: &FileResolver) -> Result<NodeSpec, TopologyError> {
    let properties = raw
        .properties
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(value)))
        .collect();
    Ok(NodeSpec {
        url: raw.url,
        name: raw.name,
        tls_certificate: resolver.resolve_opt(raw.pem_file.as_deref())?,
        properties,
        external: raw.external,
    })
}

fn normalize_collection_policy(
    raw: Option<RawCollectionPolicy>,
    resolver: &FileResolver,
) -> Result<Option<CollectionPolicy>, TopologyError> {
    Ok(match raw {
        None => None,
        Some(RawCollectionPolicy::File(path)) => Some(CollectionPolicy::File(resolver.resolve(&path)?)),
        Some(RawCollectionPolicy::Inline(value)) => Some(CollectionPolicy::Inline(value)),
    })
}

fn normalize_chaincode(
    key: &str,
    raw: RawChaincode,
    resolver: &FileResolver,
) -> Result<ChaincodeSpec, TopologyError> {
    Ok(ChaincodeSpec {
        id: raw.id.unwrap_or_else(|| key.to_string()),
        source_location: raw.source_location,
        source_prefix: resolver.resolve_opt(raw.source_location_prefix.as_deref())?,
        version: raw
            .version
            .map(scalar_to_string)
            .unwrap_or_else(|| DEFAULT_CHAINCODE_VERSION.to_string()),
        language: raw.language.unwrap_or_default(),
        init_arguments: raw.init_arguments.into_iter().map(scalar_to_string).collect(),
        endorsement_policy: resolver.resolve_opt(raw.endorsement_policy.as_deref())?,
        collection_policy: normalize_collection_policy(raw.collection_policy, resolver)?,
    })
}

fn normalize_channel(
    name: &str,
    raw: RawChannel,
    resolver: &FileResolver,
) -> Result<ChannelSpec, TopologyError> {
    let mut orderers: Vec<String> = Vec::with_capacity(raw.orderers.len());
    for orderer in raw.orderers {
        if orderers.contains(&orderer) {
            warn!(channel = %name, orderer = %orderer, "duplicate orderer reference ignored");
            continue;
        }
        orderers.push(orderer);
    }

    let peers: IndexMap<String, PeerRoles> = match raw.peers {
        RawChannelPeers::Keys(keys) => keys
            .into_iter()
            .map(|key| (key, PeerRoles::default()))
            .collect(),
        RawChannelPeers::Roles(entries) => entries
            .into_iter()
            .map(|(key, roles)| {
                let roles = roles.unwrap_or_default();
                (
                    key,
                    PeerRoles {
                        endorsing: roles.endorsing_peer,
                        chaincode_query: roles.chaincode_query,
                        ledger_query: roles.ledger_query,
                        event_source: roles.event_source,
                    },
                )
            })
            .collect(),
    };

    let mut chaincodes = Vec::with_capacity(raw.chaincodes.len());
    for entry in raw.chaincodes {
        chaincodes.push(match entry {
            RawChannelChaincode::Name(name) => ChannelChaincode::named(name),
            RawChannelChaincode::Entry {
                name,
                collection_policy,
            } => ChannelChaincode {
                name,
                collection_policy: normalize_collection_policy(collection_policy, resolver)?,
            },
        });
    }

    Ok(ChannelSpec {
        admin: raw.admin,
        orderers,
        peers,
        event_sources: raw.event_sources,
        definition: resolver.resolve_opt(raw.definition.as_deref())?,
        chaincodes,
    })
}

fn scalar_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            TopologyFormat::from_path(Path::new("net.YML")).unwrap(),
            TopologyFormat::Yaml
        );
        assert_eq!(
            TopologyFormat::from_path(Path::new("net.toml")).unwrap(),
            TopologyFormat::Toml
        );
        assert_matches!(
            TopologyFormat::from_path(Path::new("net.ini")),
            Err(TopologyError::UnsupportedFormat { .. })
        );
    }

    #[test]
    fn test_scalar_versions_become_strings() {
        let yaml = r#"
admins:
  org1: { cert: cert.pem, privateKey: key.pem, mspID: Org1MSP }
chaincodes:
  mapcc: { sourceLocation: github.com/mapcc, version: 1.5, initArguments: [a, 7] }
"#;
        let topology = parse_topology(yaml, TopologyFormat::Yaml, Path::new("/cfg")).unwrap();
        let chaincode = &topology.chaincodes["mapcc"];
        assert_eq!(chaincode.version, "1.5");
        assert_eq!(chaincode.id, "mapcc");
        assert_eq!(chaincode.init_arguments, vec!["a".to_string(), "7".to_string()]);
        assert_eq!(topology.admins["org1"].certificate, Path::new("/cfg/cert.pem"));
    }

    #[test]
    fn test_duplicate_orderers_collapse() {
        let json = r#"{
            "admins": {"org1": {"cert": "c", "privateKey": "k", "mspID": "Org1MSP"}},
            "orderers": {"o0": {"url": "grpc://o0:7050"}},
            "peers": {"p0": {"url": "grpc://p0:7051"}},
            "channels": {"trade": {"admin": "org1", "orderers": ["o0", "o0"], "peers": ["p0"]}}
        }"#;
        let topology = parse_topology(json, TopologyFormat::Json, Path::new("/cfg")).unwrap();
        assert_eq!(topology.channels["trade"].orderers, vec!["o0".to_string()]);
    }
}
