//! Transaction submission pipeline
//!
//! Shared by ordinary transactions and chaincode instantiate/upgrade:
//!
//! 1. the proposal is sent to every endorsing peer concurrently; transport
//!    failures become failed responses
//! 2. failed responses are logged; the pass fails only if none succeeded
//! 3. successful responses are grouped by payload; anything other than
//!    exactly one group is a divergence and nothing is ordered
//! 4. the endorsed transaction is ordered and the pass resolves once its
//!    commit is observed valid
//!
//! There is no majority vote: peers disagreeing on a simulation result means
//! the network is not in the state we think it is.

use crate::errors::{EndorsementFailure, PipelineError};
use futures::future::join_all;
use indexmap::IndexMap;
use ledgerform_core::{
    ChannelHandle, ClientContext, CommitEvent, EndorsedTransaction, EndorsementOutcome,
    EndorsementResponse, LedgerClient, PeerHandle, ProposalRequest,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

/// Peers that returned byte-identical endorsement payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyGroup {
    /// Hex BLAKE3 digest of the shared payload
    pub digest: String,
    /// Peers in the group, in response order
    pub peers: Vec<String>,
}

impl fmt::Display for ConsistencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{short}=[{}]", self.peers.join(" "))
    }
}

/// Group successful responses by payload, in order of first appearance
///
/// Failed responses are ignored.
pub fn consistency_groups(responses: &[EndorsementResponse]) -> Vec<ConsistencyGroup> {
    let mut groups: IndexMap<&[u8], Vec<String>> = IndexMap::new();
    for response in responses {
        if let Some(payload) = response.payload() {
            groups.entry(payload).or_default().push(response.peer.clone());
        }
    }
    groups
        .into_iter()
        .map(|(payload, peers)| ConsistencyGroup {
            digest: hex::encode(blake3::hash(payload).as_bytes()),
            peers,
        })
        .collect()
}

/// Endorse, check and order proposals
#[derive(Clone, Copy)]
pub struct TransactionPipeline<'a> {
    client: &'a dyn LedgerClient,
}

impl<'a> TransactionPipeline<'a> {
    /// Pipeline talking to the network through `client`
    pub fn new(client: &'a dyn LedgerClient) -> Self {
        Self { client }
    }

    async fn collect_responses(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        request: &ProposalRequest,
        peers: &[PeerHandle],
    ) -> Vec<EndorsementResponse> {
        join_all(peers.iter().map(|peer| async move {
            match self.client.send_proposal(ctx, channel, request, peer).await {
                Ok(response) => response,
                Err(err) => {
                    EndorsementResponse::failure(peer.name(), request.tx_id(), err.to_string())
                }
            }
        }))
        .await
    }

    /// Collect endorsements and check they form a single consistency group
    pub async fn endorse(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        request: &ProposalRequest,
        peers: &[PeerHandle],
    ) -> Result<Vec<EndorsementResponse>, PipelineError> {
        if peers.is_empty() {
            return Err(PipelineError::NoEndorsers);
        }

        let responses = self.collect_responses(ctx, channel, request, peers).await;
        let (successful, unsuccessful): (Vec<_>, Vec<_>) =
            responses.into_iter().partition(EndorsementResponse::is_success);

        let failures: Vec<EndorsementFailure> = unsuccessful
            .into_iter()
            .map(|response| {
                let reason = match response.outcome {
                    EndorsementOutcome::Failure { reason } => reason,
                    EndorsementOutcome::Success { .. } => String::new(),
                };
                warn!(peer = %response.peer, tx_id = %request.tx_id(), reason = %reason, "endorsement unsuccessful");
                EndorsementFailure {
                    peer: response.peer,
                    reason,
                }
            })
            .collect();

        if successful.is_empty() {
            return Err(PipelineError::NoSuccessfulEndorsement {
                tx_id: request.tx_id().to_string(),
                failures,
            });
        }

        let groups = consistency_groups(&successful);
        if groups.len() != 1 {
            error!(
                tx_id = %request.tx_id(),
                groups = groups.len(),
                "endorsement payloads diverge"
            );
            return Err(PipelineError::EndorsementDivergence {
                tx_id: request.tx_id().to_string(),
                groups,
            });
        }

        debug!(
            tx_id = %request.tx_id(),
            endorsed = successful.len(),
            failed = failures.len(),
            "endorsements consistent"
        );
        Ok(successful)
    }

    /// Endorse `request` on `peers`, order it and wait for a valid commit
    #[instrument(
        skip_all,
        fields(channel = %channel.name(), kind = %request.kind, chaincode = %request.chaincode)
    )]
    pub async fn submit(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        request: &ProposalRequest,
        peers: &[PeerHandle],
    ) -> Result<CommitEvent, PipelineError> {
        let endorsements = self.endorse(ctx, channel, request, peers).await?;
        let transaction = EndorsedTransaction {
            proposal: request.clone(),
            endorsements,
        };

        let commit = self
            .client
            .submit_to_orderer(ctx, channel, transaction)
            .await
            .map_err(|source| PipelineError::OrdererRejected {
                tx_id: request.tx_id().to_string(),
                source,
            })?;

        if !commit.validation.is_valid() {
            warn!(tx_id = %commit.tx_id, code = %commit.validation, "transaction committed invalid");
            return Err(PipelineError::CommitInvalid {
                tx_id: commit.tx_id,
                code: commit.validation,
            });
        }

        info!(tx_id = %commit.tx_id, block = commit.block_number, "transaction committed");
        Ok(commit)
    }

    /// Submit a transaction, recreating it when it loses a read conflict
    ///
    /// Up to `max_retries` recreations follow an `MVCC_READ_CONFLICT` or
    /// `PHANTOM_READ_CONFLICT` commit; every other failure returns at once.
    pub async fn invoke(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        mut request: ProposalRequest,
        peers: &[PeerHandle],
        max_retries: u32,
    ) -> Result<CommitEvent, PipelineError> {
        let mut retries = 0;
        loop {
            match self.submit(ctx, channel, &request, peers).await {
                Err(PipelineError::CommitInvalid { tx_id, code })
                    if code.is_read_conflict() && retries < max_retries =>
                {
                    retries += 1;
                    warn!(tx_id = %tx_id, code = %code, retry = retries, "recreating transaction");
                    request.renew_tx_id();
                }
                outcome => return outcome,
            }
        }
    }

    /// Evaluate `request` without ordering it
    ///
    /// Returns the payload of the first successful response in peer order.
    pub async fn query(
        &self,
        ctx: &ClientContext,
        channel: &ChannelHandle,
        request: &ProposalRequest,
        peers: &[PeerHandle],
    ) -> Result<Vec<u8>, PipelineError> {
        let responses = self.collect_responses(ctx, channel, request, peers).await;
        let mut last_failure = None;
        for response in responses {
            match response.outcome {
                EndorsementOutcome::Success { payload } => return Ok(payload),
                EndorsementOutcome::Failure { reason } => {
                    warn!(peer = %response.peer, reason = %reason, "query unsuccessful");
                    last_failure = Some(format!("{}: {reason}", response.peer));
                }
            }
        }
        Err(PipelineError::QueryFailed {
            reason: last_failure.unwrap_or_else(|| "no responses".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn response(peer: &str, payload: &[u8]) -> EndorsementResponse {
        EndorsementResponse::success(peer, "tx", payload.to_vec())
    }

    #[test]
    fn test_groups_ignore_failures_and_keep_order() {
        let responses = vec![
            response("peer0", b"a"),
            EndorsementResponse::failure("peer1", "tx", "timeout"),
            response("peer2", b"b"),
            response("peer3", b"a"),
        ];
        let groups = consistency_groups(&responses);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].peers, vec!["peer0".to_string(), "peer3".to_string()]);
        assert_eq!(groups[1].peers, vec!["peer2".to_string()]);
        assert_eq!(groups[0].digest, hex::encode(blake3::hash(b"a").as_bytes()));
    }

    proptest! {
        #[test]
        fn prop_one_group_per_distinct_payload(
            payloads in proptest::collection::vec(proptest::collection::vec(0u8..4, 0..3), 1..12)
        ) {
            let responses: Vec<_> = payloads
                .iter()
                .enumerate()
                .map(|(i, p)| response(&format!("peer{i}"), p))
                .collect();
            let groups = consistency_groups(&responses);

            let distinct: BTreeSet<&Vec<u8>> = payloads.iter().collect();
            prop_assert_eq!(groups.len(), distinct.len());
            prop_assert_eq!(groups.iter().map(|g| g.peers.len()).sum::<usize>(), payloads.len());
        }
    }
}
