//! Channel reconciliation
//!
//! Brings one declared channel to a usable state:
//!
//! ```text
//! Probing -> Creating | Attaching -> Joining -> Initializing -> Ready
//! ```
//!
//! External peers are operated by other organizations. They cannot be probed
//! with our identity in general, so they are taken to be members of every
//! channel they are declared on, and are never joined. That trust is checked
//! later, when their instantiated chaincodes are probed.

use crate::errors::{ProbeError, ReconcileError};
use crate::probe::TopologyProbe;
use ledgerform_core::{
    ChaincodeId, ChannelDefinition, ChannelHandle, ChannelSpec, ClientContext, EngineConfig,
    IdentityProvider, LedgerClient, LedgerError, OrdererHandle, PeerHandle, PeerRoles, Topology,
};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Progress of a channel through reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Querying owned peers for membership
    Probing,
    /// Creating the channel through the first orderer
    Creating,
    /// Channel exists; assembling the handle
    Attaching,
    /// Joining peers that are not members yet
    Joining,
    /// Attaching event sources and initializing the handle
    Initializing,
    /// Handle is usable
    Ready,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChannelState::Probing => "probing",
            ChannelState::Creating => "creating",
            ChannelState::Attaching => "attaching",
            ChannelState::Joining => "joining",
            ChannelState::Initializing => "initializing",
            ChannelState::Ready => "ready",
        };
        f.write_str(label)
    }
}

/// A declared peer as connected for one channel
#[derive(Debug, Clone)]
pub struct ChannelPeer {
    /// Connection handle
    pub handle: PeerHandle,
    /// Roles on this channel
    pub roles: PeerRoles,
    /// Operated by another organization
    pub external: bool,
}

/// What one run knows about a live channel
#[derive(Debug)]
pub struct LiveChannelView {
    /// Identity every call on this channel is made with
    pub context: ClientContext,
    /// Assembled and initialized channel handle
    pub handle: ChannelHandle,
    /// Declared peers, in declaration order
    pub peers: Vec<ChannelPeer>,
    /// Keys of peers treated as members without joining
    pub assumed_members: BTreeSet<String>,
    /// Keys of owned peers that refused the membership probe
    pub unauthorized: BTreeSet<String>,
    /// Names of peers joined during this run
    pub joined: Vec<String>,
    /// Whether this run created the channel
    pub created: bool,
    /// Reconciliation progress
    pub state: ChannelState,
    /// Chaincodes instantiated across the assumed members
    pub instantiated: BTreeSet<ChaincodeId>,
}

impl LiveChannelView {
    /// Channel name
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Peers this organization operates and may install to
    pub fn owned_peers(&self) -> impl Iterator<Item = &ChannelPeer> + '_ {
        self.peers
            .iter()
            .filter(|peer| !peer.external && !self.unauthorized.contains(peer.handle.key()))
    }

    /// Peers treated as members without being joined in this run
    pub fn member_peers(&self) -> impl Iterator<Item = &ChannelPeer> + '_ {
        self.peers
            .iter()
            .filter(|peer| self.assumed_members.contains(peer.handle.key()))
    }

    /// Whether membership of `peer` is taken on trust rather than observed
    pub fn is_trusted_member(&self, peer: &ChannelPeer) -> bool {
        peer.external || self.unauthorized.contains(peer.handle.key())
    }

    /// Peers that receive proposals for endorsement
    pub fn endorsing_peers(&self) -> Vec<PeerHandle> {
        self.peers
            .iter()
            .filter(|peer| peer.roles.endorsing)
            .map(|peer| peer.handle.clone())
            .collect()
    }

    /// Names of assumed members, in declaration order
    pub fn attached_peer_names(&self) -> Vec<String> {
        self.member_peers()
            .map(|peer| peer.handle.name().to_string())
            .collect()
    }

    fn advance(&mut self, next: ChannelState) {
        debug!(channel = %self.handle.name(), from = %self.state, to = %next, "channel state");
        self.state = next;
    }
}

/// Creates, joins and initializes declared channels
#[derive(Clone, Copy)]
pub struct ChannelReconciler<'a> {
    client: &'a dyn LedgerClient,
    identities: &'a dyn IdentityProvider,
    config: &'a EngineConfig,
}

impl<'a> ChannelReconciler<'a> {
    /// Reconciler using the given collaborators
    pub fn new(
        client: &'a dyn LedgerClient,
        identities: &'a dyn IdentityProvider,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            client,
            identities,
            config,
        }
    }

    /// Bring channel `name` to the ready state, creating and joining as needed
    #[instrument(skip_all, fields(channel = %name))]
    pub async fn reconcile(
        &self,
        topology: &Topology,
        name: &str,
    ) -> Result<LiveChannelView, ReconcileError> {
        let spec = topology.channel(name)?;
        let context = self.client_context(spec).await?;
        let peers = self.connect_peers(&context, topology, spec).await?;
        let mut orderers = self.connect_orderers(&context, topology, spec).await?;

        let mut view = LiveChannelView {
            context,
            handle: ChannelHandle::new(name),
            peers,
            assumed_members: BTreeSet::new(),
            unauthorized: BTreeSet::new(),
            joined: Vec::new(),
            created: false,
            state: ChannelState::Probing,
            instantiated: BTreeSet::new(),
        };

        let confirmed = self.probe_membership(&mut view, name).await?;

        match spec.definition.as_deref() {
            Some(path) if !confirmed => {
                view.advance(ChannelState::Creating);
                let (handle, created) = self
                    .create_or_recover(&view.context, topology, spec, name, path, &mut orderers)
                    .await?;
                view.handle = handle;
                view.created = created;
            }
            _ => view.advance(ChannelState::Attaching),
        }
        for orderer in orderers {
            view.handle.add_orderer(orderer);
        }

        view.advance(ChannelState::Joining);
        self.join_peers(&mut view).await?;

        view.advance(ChannelState::Initializing);
        self.initialize(&mut view, topology, spec).await?;

        view.advance(ChannelState::Ready);
        info!(
            channel = %name,
            created = view.created,
            joined = view.joined.len(),
            attached = view.assumed_members.len(),
            "channel ready"
        );
        Ok(view)
    }

    /// Assemble a handle for an existing channel without probing or joining
    ///
    /// Every declared peer is attached and treated as a member.
    #[instrument(skip_all, fields(channel = %name))]
    pub async fn attach(
        &self,
        topology: &Topology,
        name: &str,
    ) -> Result<LiveChannelView, ReconcileError> {
        let spec = topology.channel(name)?;
        let context = self.client_context(spec).await?;
        let peers = self.connect_peers(&context, topology, spec).await?;
        let orderers = self.connect_orderers(&context, topology, spec).await?;

        let mut handle = ChannelHandle::new(name);
        for orderer in orderers {
            handle.add_orderer(orderer);
        }
        for peer in &peers {
            handle.add_peer(peer.handle.clone());
        }

        let mut view = LiveChannelView {
            context,
            handle,
            assumed_members: peers
                .iter()
                .map(|peer| peer.handle.key().to_string())
                .collect(),
            peers,
            unauthorized: BTreeSet::new(),
            joined: Vec::new(),
            created: false,
            state: ChannelState::Attaching,
            instantiated: BTreeSet::new(),
        };

        view.advance(ChannelState::Initializing);
        self.initialize(&mut view, topology, spec).await?;
        view.advance(ChannelState::Ready);
        Ok(view)
    }

    async fn client_context(&self, spec: &ChannelSpec) -> Result<ClientContext, ReconcileError> {
        self.identities
            .client_context(&spec.admin)
            .await
            .map_err(|source| ReconcileError::Identity {
                admin: spec.admin.clone(),
                source,
            })
    }

    async fn connect_peers(
        &self,
        ctx: &ClientContext,
        topology: &Topology,
        spec: &ChannelSpec,
    ) -> Result<Vec<ChannelPeer>, ReconcileError> {
        let mut peers = Vec::with_capacity(spec.peers.len());
        for (key, roles) in &spec.peers {
            let node = topology.peer(key)?;
            let handle = self
                .client
                .connect_peer(ctx, key, node)
                .await
                .map_err(|source| ReconcileError::Connect {
                    node: key.clone(),
                    source,
                })?;
            peers.push(ChannelPeer {
                handle,
                roles: *roles,
                external: node.external,
            });
        }
        Ok(peers)
    }

    async fn connect_orderer(
        &self,
        ctx: &ClientContext,
        topology: &Topology,
        key: &str,
    ) -> Result<OrdererHandle, ReconcileError> {
        let node = topology.orderer(key)?;
        self.client
            .connect_orderer(ctx, key, node)
            .await
            .map_err(|source| ReconcileError::Connect {
                node: key.to_string(),
                source,
            })
    }

    async fn connect_orderers(
        &self,
        ctx: &ClientContext,
        topology: &Topology,
        spec: &ChannelSpec,
    ) -> Result<Vec<OrdererHandle>, ReconcileError> {
        if spec.orderers.is_empty() {
            return Err(ReconcileError::NoOrderers);
        }
        let mut orderers = Vec::with_capacity(spec.orderers.len());
        for key in &spec.orderers {
            orderers.push(self.connect_orderer(ctx, topology, key).await?);
        }
        Ok(orderers)
    }

    /// Probe owned peers; returns whether any of them is a confirmed member
    async fn probe_membership(
        &self,
        view: &mut LiveChannelView,
        name: &str,
    ) -> Result<bool, ReconcileError> {
        let probe = TopologyProbe::new(self.client);
        let mut confirmed = false;

        for peer in &view.peers {
            let key = peer.handle.key().to_string();
            if peer.external {
                debug!(peer = %peer.handle, "external peer assumed to be a member");
                view.assumed_members.insert(key);
                continue;
            }
            match probe.is_member(&view.context, &peer.handle, name).await {
                Ok(true) => {
                    confirmed = true;
                    view.assumed_members.insert(key);
                }
                Ok(false) => debug!(peer = %peer.handle, "peer needs to join"),
                Err(err @ ProbeError::Denied { .. }) if self.config.skip_unauthorized_probes => {
                    warn!(peer = %peer.handle, error = %err, "membership probe denied, assuming member");
                    view.assumed_members.insert(key.clone());
                    view.unauthorized.insert(key);
                }
                Err(source) => {
                    return Err(ReconcileError::InfrastructureFault {
                        peer: peer.handle.name().to_string(),
                        source,
                    });
                }
            }
        }
        Ok(confirmed)
    }

    /// Create the channel through orderer[0]; on failure attach the existing one
    ///
    /// Only a rejected creation is recovered from. Reading or signing the
    /// definition fails the channel. The creation orderer is consumed either
    /// way; after a rejected creation a fresh handle to the same orderer
    /// replaces it at the front of `orderers`.
    async fn create_or_recover(
        &self,
        ctx: &ClientContext,
        topology: &Topology,
        spec: &ChannelSpec,
        name: &str,
        definition_path: &Path,
        orderers: &mut Vec<OrdererHandle>,
    ) -> Result<(ChannelHandle, bool), ReconcileError> {
        let definition = ChannelDefinition::load(definition_path).map_err(|source| {
            ReconcileError::ChannelDefinition {
                path: definition_path.to_path_buf(),
                source,
            }
        })?;
        let signature = self
            .client
            .sign_channel_definition(ctx, &definition)
            .await
            .map_err(|source| ReconcileError::DefinitionSigning { source })?;
        if orderers.is_empty() {
            return Err(ReconcileError::NoOrderers);
        }
        let creation_orderer = orderers.remove(0);

        match self
            .client
            .create_channel(ctx, name, creation_orderer, &definition, &signature)
            .await
        {
            Ok(handle) => {
                info!(channel = %name, "channel created");
                Ok((handle, true))
            }
            Err(err) => {
                warn!(channel = %name, error = %err, "channel creation failed, attaching existing channel");
                let key = spec.orderers.first().ok_or(ReconcileError::NoOrderers)?;
                let fresh = self.connect_orderer(ctx, topology, key).await?;
                orderers.insert(0, fresh);
                Ok((ChannelHandle::new(name), false))
            }
        }
    }

    /// Join every peer that is not a member yet
    ///
    /// Failures are retried within the join budget, except a permission
    /// rejection, which fails the join on the attempt that saw it.
    async fn join_peers(&self, view: &mut LiveChannelView) -> Result<(), ReconcileError> {
        let client = self.client;
        for peer in &view.peers {
            if view.assumed_members.contains(peer.handle.key()) {
                view.handle.add_peer(peer.handle.clone());
                continue;
            }

            info!(channel = %view.handle.name(), peer = %peer.handle, "joining peer");
            let (ctx, handle) = (&view.context, &view.handle);
            self.config
                .join_retry
                .execute_if(
                    || client.join_channel(ctx, handle, &peer.handle),
                    |err: &LedgerError| !err.is_access_denied(),
                )
                .await
                .map_err(|source| ReconcileError::Join {
                    peer: peer.handle.name().to_string(),
                    source,
                })?;

            view.handle.add_peer(peer.handle.clone());
            view.joined.push(peer.handle.name().to_string());
        }
        Ok(())
    }

    async fn initialize(
        &self,
        view: &mut LiveChannelView,
        topology: &Topology,
        spec: &ChannelSpec,
    ) -> Result<(), ReconcileError> {
        for key in &spec.event_sources {
            let node = topology.event_source(key)?;
            let source = self
                .client
                .connect_event_source(&view.context, key, node)
                .await
                .map_err(|source| ReconcileError::Connect {
                    node: key.clone(),
                    source,
                })?;
            view.handle.add_event_source(source);
        }

        self.client
            .initialize_channel(&view.context, &view.handle)
            .await
            .map_err(|source| ReconcileError::Initialize { source })?;
        view.handle.mark_initialized();
        Ok(())
    }
}
