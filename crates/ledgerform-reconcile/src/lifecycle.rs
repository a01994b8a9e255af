//! Chaincode lifecycle reconciliation
//!
//! For a ready channel: observe what is instantiated once, install each
//! declared chaincode where it is missing, then instantiate or upgrade it
//! unless the exact `(name, version)` is already live.

use crate::channel::LiveChannelView;
use crate::errors::ReconcileError;
use crate::pipeline::TransactionPipeline;
use crate::probe::TopologyProbe;
use crate::report::{ChaincodeAction, ChaincodeReport, InstallFailure, PartialOutcome};
use ledgerform_core::{
    ChaincodeId, ChaincodeSpec, ChannelChaincode, CollectionPolicy, EngineConfig, InstallRequest,
    LedgerClient, ProposalKind, ProposalRequest, Topology,
};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Init function called by instantiate and upgrade proposals
const INIT_FUNCTION: &str = "init";

/// Transaction used to bring a chaincode live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// First deployment on the channel
    Instantiate,
    /// Replace the running version
    Upgrade,
}

impl LifecycleAction {
    /// Upgrade when another version of `id` is live on the channel, else instantiate
    pub fn for_observed(instantiated: &BTreeSet<ChaincodeId>, id: &ChaincodeId) -> Self {
        if instantiated.iter().any(|live| live.same_name(id) && live != id) {
            LifecycleAction::Upgrade
        } else {
            LifecycleAction::Instantiate
        }
    }

    fn proposal_kind(self) -> ProposalKind {
        match self {
            LifecycleAction::Instantiate => ProposalKind::Instantiate,
            LifecycleAction::Upgrade => ProposalKind::Upgrade,
        }
    }

    fn committed(self, tx_id: String) -> ChaincodeAction {
        match self {
            LifecycleAction::Instantiate => ChaincodeAction::Instantiated { tx_id },
            LifecycleAction::Upgrade => ChaincodeAction::Upgraded { tx_id },
        }
    }
}

/// Installs and activates declared chaincodes on a ready channel
#[derive(Clone, Copy)]
pub struct ChaincodeLifecycleReconciler<'a> {
    client: &'a dyn LedgerClient,
    config: &'a EngineConfig,
}

impl<'a> ChaincodeLifecycleReconciler<'a> {
    /// Reconciler using the given client and settings
    pub fn new(client: &'a dyn LedgerClient, config: &'a EngineConfig) -> Self {
        Self { client, config }
    }

    /// Probe every assumed member once and record the aggregate instantiated set
    ///
    /// A peer whose membership was taken on trust and cannot answer violates
    /// that trust; an owned peer that cannot answer is an infrastructure fault.
    pub async fn observe_instantiated(
        &self,
        view: &mut LiveChannelView,
    ) -> Result<(), ReconcileError> {
        let probe = TopologyProbe::new(self.client);
        let mut instantiated = BTreeSet::new();

        for peer in view.member_peers() {
            match probe
                .instantiated_chaincodes(&view.context, &view.handle, &peer.handle)
                .await
            {
                Ok(ids) => instantiated.extend(ids),
                Err(source) if view.is_trusted_member(peer) => {
                    return Err(ReconcileError::AssumptionViolated {
                        peer: peer.handle.name().to_string(),
                        source,
                    });
                }
                Err(source) => {
                    return Err(ReconcileError::InfrastructureFault {
                        peer: peer.handle.name().to_string(),
                        source,
                    });
                }
            }
        }

        debug!(channel = %view.name(), instantiated = instantiated.len(), "observed instantiated chaincodes");
        view.instantiated = instantiated;
        Ok(())
    }

    /// Install `entry` where missing and bring it live with `action`
    ///
    /// Failures are wrapped with the chaincode key.
    #[instrument(skip_all, fields(channel = %view.name(), chaincode = %entry.name))]
    pub async fn reconcile_chaincode(
        &self,
        topology: &Topology,
        view: &mut LiveChannelView,
        entry: &ChannelChaincode,
        action: LifecycleAction,
    ) -> Result<ChaincodeReport, ReconcileError> {
        self.reconcile_chaincode_inner(topology, view, entry, action)
            .await
            .map_err(|err| ReconcileError::in_chaincode(&entry.name, err))
    }

    async fn reconcile_chaincode_inner(
        &self,
        topology: &Topology,
        view: &mut LiveChannelView,
        entry: &ChannelChaincode,
        action: LifecycleAction,
    ) -> Result<ChaincodeReport, ReconcileError> {
        let spec = topology.chaincode(&entry.name)?;
        let id = spec.chaincode_id();
        let install = self.install_missing(view, spec).await?;

        if view.instantiated.contains(&id) {
            debug!(chaincode = %id, "already instantiated");
            return Ok(ChaincodeReport {
                chaincode: id,
                install,
                action: ChaincodeAction::Skipped,
            });
        }

        let request = self.lifecycle_request(spec, entry, action)?;
        let peers = view.endorsing_peers();
        let pipeline = TransactionPipeline::new(self.client);
        let commit = pipeline
            .submit(&view.context, &view.handle, &request, &peers)
            .await?;

        info!(chaincode = %id, action = ?action, tx_id = %commit.tx_id, "chaincode activated");
        view.instantiated.insert(id.clone());
        Ok(ChaincodeReport {
            chaincode: id,
            install,
            action: action.committed(commit.tx_id),
        })
    }

    async fn install_missing(
        &self,
        view: &LiveChannelView,
        spec: &ChaincodeSpec,
    ) -> Result<PartialOutcome, ReconcileError> {
        let probe = TopologyProbe::new(self.client);
        let id = spec.chaincode_id();
        let request = InstallRequest {
            chaincode: id.clone(),
            source_location: spec.source_location.clone(),
            source_prefix: spec.source_prefix.clone(),
            language: spec.language,
        };
        let mut outcome = PartialOutcome::default();

        for peer in view.owned_peers() {
            let name = peer.handle.name().to_string();
            let installed = probe
                .installed_chaincodes(&view.context, &peer.handle)
                .await
                .map_err(|source| ReconcileError::InfrastructureFault {
                    peer: name.clone(),
                    source,
                })?;
            if installed.contains(&id) {
                outcome.already_present.push(name);
                continue;
            }

            let reason = match self
                .client
                .propose_install(&view.context, &request, &peer.handle)
                .await
            {
                Ok(response) if response.is_success() => {
                    info!(peer = %name, chaincode = %id, "chaincode installed");
                    outcome.installed.push(name);
                    continue;
                }
                Ok(response) => response.failure_reason().unwrap_or_default().to_string(),
                Err(err) => err.to_string(),
            };
            warn!(peer = %name, chaincode = %id, reason = %reason, "install failed");
            outcome.failed.push(InstallFailure { peer: name, reason });
        }
        Ok(outcome)
    }

    fn lifecycle_request(
        &self,
        spec: &ChaincodeSpec,
        entry: &ChannelChaincode,
        action: LifecycleAction,
    ) -> Result<ProposalRequest, ReconcileError> {
        let mut request =
            ProposalRequest::new(action.proposal_kind(), spec.chaincode_id(), INIT_FUNCTION)
                .with_args(spec.init_arguments.iter().cloned())
                .with_language(spec.language)
                .with_wait_time(self.config.proposal_wait_time);

        if let Some(path) = &spec.endorsement_policy {
            let policy = std::fs::read(path).map_err(|source| ReconcileError::PolicyFile {
                what: "endorsement policy",
                path: path.clone(),
                source,
            })?;
            request = request.with_endorsement_policy(policy);
        }

        let collections = entry
            .collection_policy
            .as_ref()
            .or(spec.collection_policy.as_ref());
        if let Some(policy) = collections {
            request = request.with_collection_config(collection_config(policy)?);
        }
        Ok(request)
    }
}

fn collection_config(policy: &CollectionPolicy) -> Result<serde_json::Value, ReconcileError> {
    match policy {
        CollectionPolicy::Inline(value) => Ok(value.clone()),
        CollectionPolicy::File(path) => read_collection_file(path),
    }
}

fn read_collection_file(path: &Path) -> Result<serde_json::Value, ReconcileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ReconcileError::PolicyFile {
        what: "collection policy",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|err| ReconcileError::CollectionPolicy {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_action_follows_live_version() {
        let v1 = ChaincodeId::new("mapcc", "1");
        let v2 = ChaincodeId::new("mapcc", "2");
        let live: BTreeSet<_> = [v1.clone(), ChaincodeId::new("assets", "1")].into();

        assert_eq!(LifecycleAction::for_observed(&live, &v2), LifecycleAction::Upgrade);
        assert_eq!(LifecycleAction::for_observed(&live, &v1), LifecycleAction::Instantiate);
        assert_eq!(
            LifecycleAction::for_observed(&BTreeSet::new(), &v2),
            LifecycleAction::Instantiate
        );
    }

    #[test]
    fn test_inline_collections_pass_through() {
        let policy = CollectionPolicy::Inline(json!([{ "name": "private" }]));
        assert_eq!(collection_config(&policy).unwrap()[0]["name"], "private");
    }

    #[test]
    fn test_collection_file_must_be_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collections.json");
        std::fs::write(&path, "name: private").unwrap();

        let err = collection_config(&CollectionPolicy::File(path)).unwrap_err();
        assert_matches!(err, ReconcileError::CollectionPolicy { .. });

        let missing = collection_config(&CollectionPolicy::File(dir.path().join("none.json")));
        assert_matches!(missing, Err(ReconcileError::PolicyFile { .. }));
    }

    #[test]
    fn test_channel_collections_override_chaincode_default() {
        let config = EngineConfig::default();
        let ledger = ledgerform_testkit::MockLedger::new();
        let reconciler = ChaincodeLifecycleReconciler::new(&ledger, &config);

        let mut spec = ChaincodeSpec::new("mapcc", "github.com/example/mapcc");
        spec.collection_policy = Some(CollectionPolicy::Inline(json!({ "from": "chaincode" })));
        spec.init_arguments = vec!["a".into(), "1".into()];
        let entry = ChannelChaincode {
            name: "mapcc".into(),
            collection_policy: Some(CollectionPolicy::Inline(json!({ "from": "channel" }))),
        };

        let request = reconciler
            .lifecycle_request(&spec, &entry, LifecycleAction::Upgrade)
            .unwrap();
        assert_eq!(request.kind, ProposalKind::Upgrade);
        assert_eq!(request.function, INIT_FUNCTION);
        assert_eq!(request.args, vec!["a".to_string(), "1".to_string()]);
        assert_eq!(request.collection_config, Some(json!({ "from": "channel" })));
        assert_eq!(request.wait_time, config.proposal_wait_time);
    }
}
