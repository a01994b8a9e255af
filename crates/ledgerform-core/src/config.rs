//! Engine configuration
//!
//! Tuning knobs for one engine instance. The defaults reproduce the timing a
//! freshly created channel needs before its peers accept joins; tests shorten
//! them through the `with_*` builders.

use crate::effects::reliability::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Convergence engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry applied to joining a peer to a channel
    pub join_retry: RetryPolicy,
    /// Interval between convergence polls
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// How long endorsers may take to answer lifecycle proposals
    #[serde(with = "duration_ms")]
    pub proposal_wait_time: Duration,
    /// How often a transaction invalidated by a read conflict is recreated
    pub transaction_retries: u32,
    /// Treat peers that deny the membership probe as assumed members
    pub skip_unauthorized_probes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            join_retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(1),
            proposal_wait_time: Duration::from_secs(120),
            transaction_retries: 3,
            skip_unauthorized_probes: false,
        }
    }
}

impl EngineConfig {
    /// Set the join retry policy
    pub fn with_join_retry(mut self, policy: RetryPolicy) -> Self {
        self.join_retry = policy;
        self
    }

    /// Set the convergence poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the lifecycle proposal wait time
    pub fn with_proposal_wait_time(mut self, wait_time: Duration) -> Self {
        self.proposal_wait_time = wait_time;
        self
    }

    /// Set the read-conflict retry budget
    pub fn with_transaction_retries(mut self, retries: u32) -> Self {
        self.transaction_retries = retries;
        self
    }

    /// Enable or disable access-denied tolerant membership probing
    pub fn with_skip_unauthorized_probes(mut self, enable: bool) -> Self {
        self.skip_unauthorized_probes = enable;
        self
    }
}

/// Serde helpers storing a `Duration` as whole milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    /// Deserialize from milliseconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
