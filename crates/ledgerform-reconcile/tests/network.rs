//! Whole-network reconciliation tests
//!
//! Drives `NetworkManager::reconcile_network` against the in-memory ledger and
//! asserts on the exact joins, installs and orderer submissions each run
//! performs.

use assert_matches::assert_matches;
use ledgerform_core::{ChaincodeId, EngineConfig, ProposalKind, RetryPolicy};
use ledgerform_reconcile::{
    ChaincodeAction, ChaincodeFilter, NetworkManager, PipelineError, ProbeError, ReconcileError,
};
use ledgerform_testkit::{
    init_test_tracing, partner_network, single_channel_network, two_channel_network,
    write_channel_definition, MockLedger, NetworkFixture, StaticIdentityProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn fast_config() -> EngineConfig {
    EngineConfig::default().with_join_retry(RetryPolicy::fixed(3, Duration::from_secs(1)))
}

fn manager(ledger: &Arc<MockLedger>, fixture: &NetworkFixture, config: EngineConfig) -> NetworkManager {
    NetworkManager::with_config(ledger.clone(), Arc::new(fixture.identities.clone()), config)
}

fn mapcc_v1() -> ChaincodeId {
    ChaincodeId::new("mapcc", "1")
}

/// Live state of `single_channel_network` after a complete run
fn seed_converged_trade(ledger: &MockLedger) {
    for peer in ["peer0", "peer1"] {
        ledger.seed_joined(peer, "trade");
        ledger.seed_installed(peer, mapcc_v1());
    }
    ledger.seed_instantiated("trade", mapcc_v1());
}

// ============================================================================
// Bootstrap and idempotence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_network_scenario() {
    init_test_tracing();
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    let manager = manager(&ledger, &fixture, fast_config());

    let report = manager.reconcile_network(&fixture.topology).await.unwrap();

    assert_eq!(ledger.creations(), vec!["trade".to_string()]);
    assert_eq!(ledger.joins().len(), 2);
    assert_eq!(ledger.installs().len(), 2);
    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].kind, ProposalKind::Instantiate);
    assert!(ledger.is_instantiated("trade", &mapcc_v1()));

    let trade = report.channel("trade").unwrap();
    assert!(trade.created);
    assert_eq!(trade.joined, vec!["peer0".to_string(), "peer1".to_string()]);
    assert_eq!(trade.chaincodes[0].install.installed.len(), 2);
    assert_matches!(trade.chaincodes[0].action, ChaincodeAction::Instantiated { .. });

    // Second run observes everything in place
    ledger.reset_calls();
    let again = manager.reconcile_network(&fixture.topology).await.unwrap();
    assert_eq!(ledger.mutation_count(), 0);
    assert!(again.is_noop());
    assert_eq!(
        again.channels[0].chaincodes[0].install.already_present,
        vec!["peer0".to_string(), "peer1".to_string()]
    );

    let started = Instant::now();
    let convergence = manager
        .wait_for_convergence(&fixture.topology, &ChaincodeFilter::all(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(convergence.converged);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_converged_network_is_untouched() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    seed_converged_trade(&ledger);

    let report = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap();

    assert_eq!(ledger.mutation_count(), 0);
    assert!(ledger.proposals().is_empty());
    assert_eq!(report.channels[0].attached, vec!["peer0".to_string(), "peer1".to_string()]);
    assert_eq!(report.channels[0].chaincodes[0].action, ChaincodeAction::Skipped);
}

#[tokio::test]
async fn test_empty_topology_is_rejected() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    let mut topology = fixture.topology.clone();
    topology.channels.clear();

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&topology)
        .await
        .unwrap_err();
    assert_matches!(err, ReconcileError::NoChannels);
}

// ============================================================================
// Channel creation and joining
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_creation_failure_attaches_existing_channel() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.seed_channel("trade");

    let report = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap();

    assert!(ledger.creations().is_empty());
    // The creation attempt consumed the first handle; a fresh one replaced it
    assert_eq!(
        ledger.orderer_connections(),
        vec!["orderer0".to_string(), "orderer0".to_string()]
    );
    assert!(!report.channels[0].created);
    assert_eq!(ledger.joins().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_join_retries_until_peer_is_ready() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_joins("peer0", 2);

    let started = Instant::now();
    manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap();

    let attempts: Vec<_> = ledger
        .join_attempts()
        .into_iter()
        .filter(|call| call.peer == "peer0")
        .collect();
    assert_eq!(attempts.len(), 3);
    assert!(ledger.is_joined("peer0", "trade"));
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_join_exhaustion_keeps_every_cause() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_joins("peer1", 10);

    let started = Instant::now();
    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_eq!(err.channel(), Some("trade"));
    assert_matches!(err.root(), ReconcileError::Join { peer, source } => {
        assert_eq!(peer, "peer1");
        assert_eq!(source.attempts(), 4);
        assert_eq!(source.causes().len(), 4);
    });
    // Four failed attempts, each followed by the fixed delay
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert!(ledger.installs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_creation_of_missing_channel_surfaces_join_causes() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_channel_creation("orderer0 is not accepting channel creation");

    let started = Instant::now();
    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    // The rejection falls back to attaching, which then cannot find the channel
    assert!(ledger.creations().is_empty());
    assert_eq!(
        ledger.orderer_connections(),
        vec!["orderer0".to_string(), "orderer0".to_string()]
    );
    assert_matches!(err.root(), ReconcileError::Join { peer, source } => {
        assert_eq!(peer, "peer0");
        assert!(!source.is_aborted());
        assert_eq!(source.attempts(), 4);
        assert!(source.to_string().contains("unknown to the ordering service"));
    });
    assert_eq!(started.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_definition_signing_failure_is_fatal() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_definition_signing("admin certificate does not match the key");

    let started = Instant::now();
    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_eq!(err.channel(), Some("trade"));
    assert_matches!(err.root(), ReconcileError::DefinitionSigning { .. });
    assert!(err
        .to_string()
        .contains("admin certificate does not match the key"));
    // No creation, no recovery, no joins
    assert!(ledger.creations().is_empty());
    assert_eq!(ledger.orderer_connections(), vec!["orderer0".to_string()]);
    assert!(ledger.join_attempts().is_empty());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_refused_join_is_not_retried() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.deny_joins("peer1");

    let started = Instant::now();
    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_matches!(err.root(), ReconcileError::Join { peer, source } => {
        assert_eq!(peer, "peer1");
        assert!(source.is_aborted());
        assert_eq!(source.attempts(), 1);
        assert!(source.last_cause().is_some_and(|cause| cause.is_access_denied()));
    });
    let attempts: Vec<_> = ledger
        .join_attempts()
        .into_iter()
        .filter(|call| call.peer == "peer1")
        .collect();
    assert_eq!(attempts.len(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(ledger.installs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_initialize_failure_stops_the_run() {
    let fixture = two_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_initialization("event source handshake failed");

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_eq!(err.channel(), Some("alpha"));
    assert_matches!(err.root(), ReconcileError::Initialize { .. });
    assert!(err.to_string().contains("event source handshake failed"));
    assert!(ledger.initializations().is_empty());
    assert!(ledger.installs().is_empty());
    // beta was never touched
    assert_eq!(ledger.creations(), vec!["alpha".to_string()]);
    assert!(ledger.join_attempts().iter().all(|call| call.channel == "alpha"));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_failing_channel_stops_the_run() {
    let fixture = two_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_endorsements("peer0", "chaincode container failed to start");
    ledger.fail_endorsements("peer1", "chaincode container failed to start");

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_eq!(err.channel(), Some("alpha"));
    assert_matches!(
        err.root(),
        ReconcileError::Pipeline(PipelineError::NoSuccessfulEndorsement { failures, .. })
            if failures.len() == 2
    );
    assert!(err.to_string().starts_with("channel alpha: chaincode mapcc:"));
    // beta was never touched
    assert_eq!(ledger.creations(), vec!["alpha".to_string()]);
    assert!(ledger.joins().iter().all(|call| call.channel == "alpha"));
}

#[tokio::test(start_paused = true)]
async fn test_divergent_endorsements_are_never_ordered() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.diverge_endorsement("peer1", b"tampered");

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_matches!(
        err.root(),
        ReconcileError::Pipeline(PipelineError::EndorsementDivergence { groups, .. }) => {
            assert_eq!(groups.len(), 2);
            assert_eq!(groups[1].peers, vec!["peer1".to_string()]);
        }
    );
    assert!(ledger.submissions().is_empty());
    assert!(!ledger.is_instantiated("trade", &mapcc_v1()));
}

#[tokio::test(start_paused = true)]
async fn test_install_failures_are_partial() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_installs("peer1", "disk full");

    let report = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap();

    let chaincode = &report.channels[0].chaincodes[0];
    assert_eq!(chaincode.install.installed, vec!["peer0".to_string()]);
    assert_eq!(chaincode.install.failed.len(), 1);
    assert_eq!(chaincode.install.failed[0].peer, "peer1");
    assert_eq!(chaincode.install.failed[0].reason, "disk full");
    assert_matches!(chaincode.action, ChaincodeAction::Instantiated { .. });
    assert_eq!(report.install_failures().len(), 1);
}

#[tokio::test]
async fn test_unreachable_owned_peer_is_infrastructure_fault() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    seed_converged_trade(&ledger);
    ledger.set_unreachable("peer1");

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_matches!(
        err.root(),
        ReconcileError::InfrastructureFault { peer, source: ProbeError::Unavailable { .. } }
            if peer == "peer1"
    );
}

// ============================================================================
// Trust boundary
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_external_peers_are_never_joined_or_installed() {
    let fixture = partner_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.seed_joined("partner0", "shared");
    ledger.seed_installed("partner0", mapcc_v1());

    let report = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap();

    assert!(ledger.join_attempts().iter().all(|call| call.peer == "peer0"));
    assert!(ledger.installs().iter().all(|call| call.peer == "peer0"));
    assert_eq!(ledger.installs().len(), 1);
    assert_eq!(report.channels[0].attached, vec!["partner0".to_string()]);

    // The partner endorses alongside the owned peer
    let endorsers: Vec<_> = ledger
        .proposals()
        .into_iter()
        .filter(|call| call.kind == ProposalKind::Instantiate)
        .map(|call| call.peer)
        .collect();
    assert_eq!(endorsers, vec!["peer0".to_string(), "partner0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_partner_violates_assumption() {
    let fixture = partner_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.seed_joined("peer0", "shared");
    ledger.set_unreachable("partner0");

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_matches!(err.root(), ReconcileError::AssumptionViolated { peer, .. } if peer == "partner0");
    assert!(ledger.installs().is_empty());
    assert!(ledger.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_partner_is_checked_on_channel_without_chaincodes() {
    let fixture = partner_network();
    let mut topology = fixture.topology.clone();
    topology.channels["shared"].chaincodes.clear();
    let ledger = Arc::new(MockLedger::new());
    ledger.seed_joined("peer0", "shared");
    ledger.set_unreachable("partner0");

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&topology)
        .await
        .unwrap_err();

    assert_matches!(err.root(), ReconcileError::AssumptionViolated { peer, .. } if peer == "partner0");
}

#[tokio::test]
async fn test_denied_probe_is_fatal_by_default() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    seed_converged_trade(&ledger);
    ledger.deny_queries("peer1");

    let err = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap_err();

    assert_matches!(
        err.root(),
        ReconcileError::InfrastructureFault { source, .. } if source.is_denied()
    );
}

#[tokio::test]
async fn test_denied_probe_can_be_tolerated() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    seed_converged_trade(&ledger);
    ledger.deny_queries("peer1");

    let config = fast_config().with_skip_unauthorized_probes(true);
    let report = manager(&ledger, &fixture, config)
        .reconcile_network(&fixture.topology)
        .await
        .unwrap();

    assert_eq!(ledger.mutation_count(), 0);
    let chaincode = &report.channels[0].chaincodes[0];
    // peer1 is left out of the install pass
    assert_eq!(chaincode.install.already_present, vec!["peer0".to_string()]);
    assert_eq!(chaincode.action, ChaincodeAction::Skipped);
}

// ============================================================================
// Upgrades
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_version_bump_upgrades() {
    let mut fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    seed_converged_trade(&ledger);
    fixture.topology.chaincodes["mapcc"].version = "2".to_string();

    let report = manager(&ledger, &fixture, fast_config())
        .reconcile_network(&fixture.topology)
        .await
        .unwrap();

    let v2 = ChaincodeId::new("mapcc", "2");
    assert_eq!(ledger.installs().len(), 2);
    assert!(ledger.installs().iter().all(|call| call.chaincode == v2));
    assert_eq!(ledger.submissions()[0].kind, ProposalKind::Upgrade);
    assert!(ledger.is_instantiated("trade", &v2));
    assert_matches!(report.channels[0].chaincodes[0].action, ChaincodeAction::Upgraded { .. });
}

#[tokio::test(start_paused = true)]
async fn test_upgrade_respects_channel_and_filter() {
    let mut fixture = two_channel_network();
    let ledger = Arc::new(MockLedger::new());
    let manager = manager(&ledger, &fixture, fast_config());
    manager.reconcile_network(&fixture.topology).await.unwrap();

    fixture.topology.chaincodes["assets"].version = "3".to_string();
    ledger.reset_calls();
    let reports = manager
        .install_and_upgrade(&fixture.topology, None, &ChaincodeFilter::only(["assets"]))
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports[0].chaincodes.is_empty());
    assert_matches!(reports[1].chaincodes[0].action, ChaincodeAction::Upgraded { .. });
    assert!(ledger.joins().is_empty());
    assert!(ledger.creations().is_empty());
    assert!(ledger.is_instantiated("beta", &ChaincodeId::new("assets", "3")));
}

#[tokio::test]
async fn test_lifecycle_on_undeclared_channel() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());

    let err = manager(&ledger, &fixture, fast_config())
        .install_and_activate(&fixture.topology, Some("audit"), &ChaincodeFilter::all())
        .await
        .unwrap_err();
    assert_matches!(err, ReconcileError::Lookup(_));
}

#[tokio::test(start_paused = true)]
async fn test_activate_on_existing_channel() {
    let fixture = single_channel_network();
    let ledger = Arc::new(MockLedger::new());
    ledger.seed_joined("peer0", "trade");
    ledger.seed_joined("peer1", "trade");

    let reports = manager(&ledger, &fixture, fast_config())
        .install_and_activate(&fixture.topology, Some("trade"), &ChaincodeFilter::all())
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_matches!(reports[0].chaincodes[0].action, ChaincodeAction::Instantiated { .. });
    assert!(ledger.join_attempts().is_empty());
    assert!(ledger.is_instantiated("trade", &mapcc_v1()));
}

// ============================================================================
// Declared topology from disk
// ============================================================================

const YAML_TOPOLOGY: &str = r#"
admins:
  org1: { cert: msp/cert.pem, privateKey: msp/key.pem, mspID: Org1MSP }
orderers:
  - orderer0: { url: "grpc://orderer0:7050" }
peers:
  - peer0: { url: "grpc://peer0:7051" }
  - peer1: { url: "grpc://peer1:7051" }
chaincodes:
  mapcc: { sourceLocation: github.com/example/mapcc, version: 1, initArguments: [init] }
channels:
  trade:
    admin: org1
    orderers: [orderer0]
    peers:
      peer0: {}
      peer1: { endorsingPeer: false }
    txFile: trade.tx
    chaincodes: [mapcc]
"#;

#[tokio::test(start_paused = true)]
async fn test_loaded_topology_reconciles() {
    let dir = tempfile::tempdir().unwrap();
    write_channel_definition(dir.path(), "trade");
    let path = dir.path().join("network.yaml");
    std::fs::write(&path, YAML_TOPOLOGY).unwrap();

    let topology = ledgerform_topology::load_topology(&path).unwrap();
    let ledger = Arc::new(MockLedger::new());
    let manager = NetworkManager::with_config(
        ledger.clone(),
        Arc::new(StaticIdentityProvider::for_topology(&topology)),
        fast_config(),
    );

    manager.reconcile_network(&topology).await.unwrap();

    assert_eq!(ledger.creations(), vec!["trade".to_string()]);
    assert_eq!(ledger.installs().len(), 2);
    // Only peer0 endorses
    let endorsers: Vec<_> = ledger
        .proposals()
        .into_iter()
        .filter(|call| call.kind == ProposalKind::Instantiate)
        .map(|call| call.peer)
        .collect();
    assert_eq!(endorsers, vec!["peer0".to_string()]);
    assert!(ledger.is_instantiated("trade", &mapcc_v1()));
}
