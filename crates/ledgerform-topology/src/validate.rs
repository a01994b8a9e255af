//! Cross-reference validation
//!
//! Every key a channel mentions must be declared, every channel needs at least
//! one orderer and one peer. All problems are collected before failing so an
//! operator can fix a topology in one pass.

use crate::errors::TopologyError;
use ledgerform_core::Topology;

/// Check that `topology` is internally consistent
pub fn validate_topology(topology: &Topology) -> Result<(), TopologyError> {
    let mut issues = Vec::new();

    for (key, admin) in &topology.admins {
        if admin.msp_id.trim().is_empty() {
            issues.push(format!("admin '{key}' has an empty MSP id"));
        }
    }
    for (kind, nodes) in [
        ("peer", &topology.peers),
        ("orderer", &topology.orderers),
        ("event source", &topology.event_sources),
    ] {
        for (key, node) in nodes {
            if node.url.trim().is_empty() {
                issues.push(format!("{kind} '{key}' has an empty url"));
            }
        }
    }
    for (key, chaincode) in &topology.chaincodes {
        if chaincode.source_location.trim().is_empty() {
            issues.push(format!("chaincode '{key}' has an empty source location"));
        }
    }

    for (name, channel) in &topology.channels {
        if !topology.admins.contains_key(&channel.admin) {
            issues.push(format!(
                "channel '{name}' references undeclared admin '{}'",
                channel.admin
            ));
        }
        if channel.orderers.is_empty() {
            issues.push(format!("channel '{name}' declares no orderers"));
        }
        for key in &channel.orderers {
            if !topology.orderers.contains_key(key) {
                issues.push(format!("channel '{name}' references undeclared orderer '{key}'"));
            }
        }
        if channel.peers.is_empty() {
            issues.push(format!("channel '{name}' declares no peers"));
        }
        for key in channel.peers.keys() {
            if !topology.peers.contains_key(key) {
                issues.push(format!("channel '{name}' references undeclared peer '{key}'"));
            }
        }
        for key in &channel.event_sources {
            if !topology.event_sources.contains_key(key) {
                issues.push(format!(
                    "channel '{name}' references undeclared event source '{key}'"
                ));
            }
        }
        for entry in &channel.chaincodes {
            if !topology.chaincodes.contains_key(&entry.name) {
                issues.push(format!(
                    "channel '{name}' references undeclared chaincode '{}'",
                    entry.name
                ));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(TopologyError::Invalid { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerform_core::{ChannelChaincode, ChannelSpec, NodeSpec, PeerRoles};

    #[test]
    fn test_collects_every_issue() {
        let mut topology = Topology::default();
        topology
            .orderers
            .insert("o0".into(), NodeSpec::new("grpc://o0:7050"));
        let mut channel = ChannelSpec {
            admin: "nobody".into(),
            orderers: vec!["o0".into(), "o9".into()],
            ..ChannelSpec::default()
        };
        channel.peers.insert("p9".into(), PeerRoles::default());
        channel.chaincodes.push(ChannelChaincode::named("ghost"));
        topology.channels.insert("trade".into(), channel);

        let Err(TopologyError::Invalid { issues }) = validate_topology(&topology) else {
            panic!("expected validation failure");
        };
        assert_eq!(issues.len(), 4);
        assert!(issues.iter().any(|i| i.contains("admin 'nobody'")));
        assert!(issues.iter().any(|i| i.contains("orderer 'o9'")));
        assert!(issues.iter().any(|i| i.contains("peer 'p9'")));
        assert!(issues.iter().any(|i| i.contains("chaincode 'ghost'")));
    }

    #[test]
    fn test_empty_channel_membership() {
        let mut topology = Topology::default();
        topology.channels.insert(
            "empty".into(),
            ChannelSpec {
                admin: "org1".into(),
                ..ChannelSpec::default()
            },
        );
        let err = validate_topology(&topology).unwrap_err().to_string();
        assert!(err.contains("declares no orderers"));
        assert!(err.contains("declares no peers"));
    }
}
