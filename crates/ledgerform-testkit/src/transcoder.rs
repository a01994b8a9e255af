//! Transparent configuration transcoder
//!
//! Treats "protobuf" bytes as UTF-8 text wrapped in a one-field JSON object,
//! which is enough to drive the channel configuration update path end to end.

use async_trait::async_trait;
use ledgerform_core::{ConfigTranscoder, LedgerError};
use serde_json::json;

/// `ConfigTranscoder` over UTF-8 payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTranscoder;

#[async_trait]
impl ConfigTranscoder for MockTranscoder {
    async fn proto_to_json(&self, message_type: &str, bytes: &[u8]) -> Result<String, LedgerError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| LedgerError::invalid_argument(format!("{message_type}: {e}")))?;
        Ok(json!({ "type": message_type, "config": text }).to_string())
    }

    async fn json_to_proto(&self, message_type: &str, json: &str) -> Result<Vec<u8>, LedgerError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| LedgerError::invalid_argument(format!("{message_type}: {e}")))?;
        value
            .get("config")
            .and_then(serde_json::Value::as_str)
            .map(|text| text.as_bytes().to_vec())
            .ok_or_else(|| LedgerError::invalid_argument(format!("{message_type}: missing config field")))
    }

    async fn compute_update(
        &self,
        channel: &str,
        current: &[u8],
        target: &[u8],
    ) -> Result<Vec<u8>, LedgerError> {
        if current == target {
            return Err(LedgerError::invalid_argument(format!(
                "no differences detected between original and updated config of {channel}"
            )));
        }
        let mut update = format!("update:{channel}:").into_bytes();
        update.extend_from_slice(target);
        Ok(update)
    }
}
