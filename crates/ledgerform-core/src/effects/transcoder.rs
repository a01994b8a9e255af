//! Channel configuration transcoding
//!
//! Only the channel configuration update path depends on this trait.

use crate::errors::LedgerError;
use async_trait::async_trait;

/// Protobuf message type of a full channel configuration
pub const CONFIG_MESSAGE_TYPE: &str = "common.Config";

/// Converts channel configuration between its wire and JSON forms
#[async_trait]
pub trait ConfigTranscoder: Send + Sync {
    /// Decode `bytes` of protobuf `message_type` into JSON
    async fn proto_to_json(&self, message_type: &str, bytes: &[u8]) -> Result<String, LedgerError>;

    /// Encode JSON into protobuf `message_type`
    async fn json_to_proto(&self, message_type: &str, json: &str) -> Result<Vec<u8>, LedgerError>;

    /// Compute the configuration update turning `current` into `target` on `channel`
    async fn compute_update(
        &self,
        channel: &str,
        current: &[u8],
        target: &[u8],
    ) -> Result<Vec<u8>, LedgerError>;
}
