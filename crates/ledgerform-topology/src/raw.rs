//! On-disk topology shape
//!
//! Operators may declare every section either as a map keyed by entry name or
//! as a list of single-entry maps. Both shapes land in an `IndexMap` here, so
//! nothing downstream branches on the shape that was used.

use indexmap::IndexMap;
use ledgerform_core::ChaincodeLanguage;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use tracing::warn;

/// Section declared as a map or as a list of single-entry maps
#[derive(Debug)]
pub(crate) struct NamedEntries<T>(pub(crate) IndexMap<String, T>);

impl<T> Default for NamedEntries<T> {
    fn default() -> Self {
        Self(IndexMap::new())
    }
}

impl<'de, T> Deserialize<'de> for NamedEntries<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape<T> {
            Map(IndexMap<String, T>),
            List(Vec<IndexMap<String, T>>),
        }

        match Option::<Shape<T>>::deserialize(deserializer)? {
            None => Ok(Self::default()),
            Some(Shape::Map(entries)) => Ok(Self(entries)),
            Some(Shape::List(items)) => {
                let mut entries = IndexMap::new();
                for (key, value) in items.into_iter().flatten() {
                    if entries.contains_key(&key) {
                        warn!(key = %key, "duplicate topology entry ignored");
                        continue;
                    }
                    entries.insert(key, value);
                }
                Ok(Self(entries))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawTopology {
    pub(crate) admins: NamedEntries<RawAdmin>,
    pub(crate) peers: NamedEntries<RawNode>,
    pub(crate) orderers: NamedEntries<RawNode>,
    #[serde(alias = "eventhubs", alias = "eventHubs", alias = "event_sources")]
    pub(crate) event_sources: NamedEntries<RawNode>,
    pub(crate) chaincodes: NamedEntries<RawChaincode>,
    pub(crate) channels: NamedEntries<RawChannel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawAdmin {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(alias = "certificate")]
    pub(crate) cert: PathBuf,
    #[serde(alias = "private_key")]
    pub(crate) private_key: PathBuf,
    #[serde(rename = "mspID", alias = "mspId", alias = "msp_id")]
    pub(crate) msp_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawNode {
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default, alias = "tlsCertificate", alias = "pem_file")]
    pub(crate) pem_file: Option<PathBuf>,
    #[serde(default)]
    pub(crate) properties: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub(crate) external: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCollectionPolicy {
    File(PathBuf),
    Inline(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChaincode {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(alias = "source_location")]
    pub(crate) source_location: String,
    #[serde(default, alias = "source_location_prefix")]
    pub(crate) source_location_prefix: Option<PathBuf>,
    #[serde(default)]
    pub(crate) version: Option<serde_json::Value>,
    #[serde(default, rename = "type", alias = "language")]
    pub(crate) language: Option<ChaincodeLanguage>,
    #[serde(default, alias = "init_arguments")]
    pub(crate) init_arguments: Vec<serde_json::Value>,
    #[serde(default, alias = "endorsement_policy")]
    pub(crate) endorsement_policy: Option<PathBuf>,
    #[serde(default, alias = "collection_policy")]
    pub(crate) collection_policy: Option<RawCollectionPolicy>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawRoles {
    #[serde(alias = "endorsing")]
    pub(crate) endorsing_peer: bool,
    pub(crate) chaincode_query: bool,
    pub(crate) ledger_query: bool,
    pub(crate) event_source: bool,
}

impl Default for RawRoles {
    fn default() -> Self {
        Self {
            endorsing_peer: true,
            chaincode_query: true,
            ledger_query: true,
            event_source: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawChannelPeers {
    Keys(Vec<String>),
    Roles(IndexMap<String, Option<RawRoles>>),
}

impl Default for RawChannelPeers {
    fn default() -> Self {
        RawChannelPeers::Keys(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawChannelChaincode {
    Name(String),
    #[serde(rename_all = "camelCase")]
    Entry {
        name: String,
        #[serde(default, alias = "collection_policy")]
        collection_policy: Option<RawCollectionPolicy>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChannel {
    pub(crate) admin: String,
    #[serde(default)]
    pub(crate) orderers: Vec<String>,
    #[serde(default)]
    pub(crate) peers: RawChannelPeers,
    #[serde(default, alias = "eventhubs", alias = "eventHubs", alias = "event_sources")]
    pub(crate) event_sources: Vec<String>,
    #[serde(default, alias = "txFile", alias = "tx_file")]
    pub(crate) definition: Option<PathBuf>,
    #[serde(default)]
    pub(crate) chaincodes: Vec<RawChannelChaincode>,
}
