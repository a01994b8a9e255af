//! Channel configuration updates
//!
//! Read a channel's configuration, compute the update that turns it into a
//! target configuration, collect admin signatures and apply the update. Every
//! step goes through an attached channel; nothing is joined or created.

use crate::channel::{ChannelReconciler, LiveChannelView};
use crate::errors::ReconcileError;
use ledgerform_core::effects::transcoder::CONFIG_MESSAGE_TYPE;
use ledgerform_core::{
    ConfigSignature, ConfigTranscoder, EngineConfig, IdentityProvider, LedgerClient, LedgerError,
    Topology,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Reads and updates channel configuration
#[derive(Clone)]
pub struct ChannelConfigurator {
    client: Arc<dyn LedgerClient>,
    identities: Arc<dyn IdentityProvider>,
    transcoder: Arc<dyn ConfigTranscoder>,
    config: EngineConfig,
}

fn config_error(operation: &'static str) -> impl FnOnce(LedgerError) -> ReconcileError {
    move |source| ReconcileError::ChannelConfig { operation, source }
}

impl ChannelConfigurator {
    /// Configurator over the given collaborators
    pub fn new(
        client: Arc<dyn LedgerClient>,
        identities: Arc<dyn IdentityProvider>,
        transcoder: Arc<dyn ConfigTranscoder>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            identities,
            transcoder,
            config,
        }
    }

    async fn attach(&self, topology: &Topology, channel: &str) -> Result<LiveChannelView, ReconcileError> {
        ChannelReconciler::new(self.client.as_ref(), self.identities.as_ref(), &self.config)
            .attach(topology, channel)
            .await
    }

    /// Current configuration of `channel` in wire form
    pub async fn channel_config(
        &self,
        topology: &Topology,
        channel: &str,
    ) -> Result<Vec<u8>, ReconcileError> {
        let view = self.attach(topology, channel).await?;
        self.client
            .fetch_channel_config(&view.context, &view.handle)
            .await
            .map_err(config_error("fetch"))
    }

    /// Current configuration of `channel` as JSON
    pub async fn channel_config_json(
        &self,
        topology: &Topology,
        channel: &str,
    ) -> Result<String, ReconcileError> {
        let bytes = self.channel_config(topology, channel).await?;
        self.transcoder
            .proto_to_json(CONFIG_MESSAGE_TYPE, &bytes)
            .await
            .map_err(config_error("decode"))
    }

    /// Update turning the current configuration of `channel` into `target_json`
    #[instrument(skip_all, fields(channel = %channel))]
    pub async fn compute_update(
        &self,
        topology: &Topology,
        channel: &str,
        target_json: &str,
    ) -> Result<Vec<u8>, ReconcileError> {
        let current = self.channel_config(topology, channel).await?;
        let target = self
            .transcoder
            .json_to_proto(CONFIG_MESSAGE_TYPE, target_json)
            .await
            .map_err(config_error("encode"))?;
        self.transcoder
            .compute_update(channel, &current, &target)
            .await
            .map_err(config_error("compute update"))
    }

    /// Sign `update` with the identity of `admin`
    pub async fn sign_update(
        &self,
        topology: &Topology,
        update: &[u8],
        admin: &str,
    ) -> Result<ConfigSignature, ReconcileError> {
        topology.admin(admin)?;
        let context = self
            .identities
            .client_context(admin)
            .await
            .map_err(|source| ReconcileError::Identity {
                admin: admin.to_string(),
                source,
            })?;
        self.client
            .sign_channel_update(&context, update)
            .await
            .map_err(config_error("sign"))
    }

    /// Submit `update` with the collected `signatures`
    #[instrument(skip_all, fields(channel = %channel, signatures = signatures.len()))]
    pub async fn apply_update(
        &self,
        topology: &Topology,
        channel: &str,
        update: &[u8],
        signatures: &[ConfigSignature],
    ) -> Result<(), ReconcileError> {
        let view = self.attach(topology, channel).await?;
        self.client
            .update_channel_config(&view.context, &view.handle, update, signatures)
            .await
            .map_err(config_error("apply"))?;
        info!(channel = %channel, "channel configuration updated");
        Ok(())
    }
}
