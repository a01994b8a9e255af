//! Run reports
//!
//! What a run changed, per channel and per chaincode. Reports serialize to
//! JSON for operators and CI logs.

use crate::channel::LiveChannelView;
use ledgerform_core::ChaincodeId;
use serde::Serialize;

/// An owned peer that did not accept a chaincode install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallFailure {
    /// Peer name
    pub peer: String,
    /// Reason reported by the peer or the transport
    pub reason: String,
}

/// Per-peer install results for one chaincode
///
/// Install failures are not fatal; the run carries on with the peers that
/// have the chaincode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialOutcome {
    /// Peers the chaincode was installed on during this run
    pub installed: Vec<String>,
    /// Peers that already had the chaincode
    pub already_present: Vec<String>,
    /// Peers that refused or failed the install
    pub failed: Vec<InstallFailure>,
}

impl PartialOutcome {
    /// Whether any install was attempted and failed
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// What happened to a chaincode on its channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChaincodeAction {
    /// Already instantiated at the declared version
    Skipped,
    /// Instantiated by this run
    Instantiated {
        /// Committed transaction
        tx_id: String,
    },
    /// Upgraded by this run
    Upgraded {
        /// Committed transaction
        tx_id: String,
    },
}

impl ChaincodeAction {
    /// Whether an instantiate or upgrade transaction was committed
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ChaincodeAction::Skipped)
    }
}

/// Outcome for one chaincode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChaincodeReport {
    /// Declared chaincode
    pub chaincode: ChaincodeId,
    /// Install results
    pub install: PartialOutcome,
    /// Channel-level action
    #[serde(flatten)]
    pub action: ChaincodeAction,
}

/// Outcome for one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    /// Channel name
    pub channel: String,
    /// Whether this run created the channel
    pub created: bool,
    /// Peers joined by this run
    pub joined: Vec<String>,
    /// Peers treated as members without joining
    pub attached: Vec<String>,
    /// Per-chaincode outcomes, in declaration order
    pub chaincodes: Vec<ChaincodeReport>,
}

impl ChannelReport {
    /// Channel-level facts from a reconciled view, with no chaincode outcomes yet
    pub fn from_view(view: &LiveChannelView) -> Self {
        Self {
            channel: view.name().to_string(),
            created: view.created,
            joined: view.joined.clone(),
            attached: view.attached_peer_names(),
            chaincodes: Vec::new(),
        }
    }

    /// Whether this run changed nothing on the channel
    pub fn is_noop(&self) -> bool {
        !self.created
            && self.joined.is_empty()
            && self.chaincodes.iter().all(|report| {
                report.install.installed.is_empty() && !report.action.is_mutation()
            })
    }
}

/// Outcome of a whole-network run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkReport {
    /// Per-channel outcomes, in declaration order
    pub channels: Vec<ChannelReport>,
}

impl NetworkReport {
    /// Whether the run changed nothing anywhere
    pub fn is_noop(&self) -> bool {
        self.channels.iter().all(ChannelReport::is_noop)
    }

    /// Report for `channel`
    pub fn channel(&self, channel: &str) -> Option<&ChannelReport> {
        self.channels.iter().find(|report| report.channel == channel)
    }

    /// Every chaincode with at least one failed install, as `(channel, chaincode)`
    pub fn install_failures(&self) -> Vec<(&str, &ChaincodeReport)> {
        self.channels
            .iter()
            .flat_map(|channel| {
                channel
                    .chaincodes
                    .iter()
                    .filter(|report| report.install.has_failures())
                    .map(move |report| (channel.channel.as_str(), report))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chaincode(action: ChaincodeAction) -> ChaincodeReport {
        ChaincodeReport {
            chaincode: ChaincodeId::new("mapcc", "1"),
            install: PartialOutcome::default(),
            action,
        }
    }

    #[test]
    fn test_noop_detection() {
        let mut report = ChannelReport {
            channel: "trade".into(),
            created: false,
            joined: Vec::new(),
            attached: vec!["peer0".into()],
            chaincodes: vec![chaincode(ChaincodeAction::Skipped)],
        };
        assert!(report.is_noop());

        report.chaincodes.push(chaincode(ChaincodeAction::Upgraded {
            tx_id: "tx1".into(),
        }));
        assert!(!report.is_noop());
    }

    #[test]
    fn test_action_serializes_flat() {
        let report = chaincode(ChaincodeAction::Instantiated {
            tx_id: "tx1".into(),
        });
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["action"], "instantiated");
        assert_eq!(json["tx_id"], "tx1");
        assert_eq!(json["chaincode"]["name"], "mapcc");
    }
}
