//! Registry and connection manager for counterparty gateways.
//!
//! The orchestrator owns two registries (gateway identities and connected
//! channels), created at gateway bootstrap and passed by handle into the
//! crash manager; it is never a process-wide singleton. A channel exposes
//! one RPC client per registered protocol handler name (currently "crash").

use dashmap::DashMap;
use libp2p::{Multiaddr, PeerId};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::{mpsc, oneshot};

use satp_core::types::GatewayIdentity;

use crate::error::NetworkError;
use crate::node::NetworkCommand;
use crate::protocol::{CrashRequest, CrashResponse, PROTOCOL_HANDLER_CRASH};

/// Derive the libp2p PeerId of a gateway from its hex-encoded Ed25519
/// public key. The signing identity doubles as the transport identity.
pub fn peer_id_from_pubkey_hex(pubkey_hex: &str) -> Result<PeerId, NetworkError> {
    let bytes = hex::decode(pubkey_hex)
        .map_err(|e| NetworkError::Other(format!("invalid pubkey hex: {}", e)))?;
    let ed25519 = libp2p::identity::ed25519::PublicKey::try_from_bytes(&bytes)
        .map_err(|e| NetworkError::Other(format!("invalid ed25519 pubkey: {}", e)))?;
    Ok(libp2p::identity::PublicKey::from(ed25519).to_peer_id())
}

/// A connected RPC client for one counterparty and one protocol handler.
#[derive(Clone)]
pub struct CrashServiceClient {
    peer_id: PeerId,
    command_tx: mpsc::Sender<NetworkCommand>,
}

impl CrashServiceClient {
    pub fn new(peer_id: PeerId, command_tx: mpsc::Sender<NetworkCommand>) -> Self {
        Self { peer_id, command_tx }
    }

    /// Issue a crash-recovery request and await the counterparty's response.
    pub async fn request(&self, request: CrashRequest) -> Result<CrashResponse, NetworkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::SendCrashRequest {
                peer_id: self.peer_id,
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| NetworkError::Channel("network loop gone".into()))?;
        reply_rx
            .await
            .map_err(|_| NetworkError::Channel("reply dropped".into()))?
    }
}

/// An established channel to one counterparty gateway.
#[derive(Clone)]
pub struct GatewayChannel {
    /// Id of the gateway this channel leads to.
    pub to_gateway_id: String,
    /// The counterparty's transport identity.
    pub peer_id: PeerId,
    /// One RPC client per registered protocol handler name.
    clients: HashMap<String, CrashServiceClient>,
}

impl GatewayChannel {
    /// Look up the client registered under a protocol handler name.
    pub fn client(&self, protocol: &str) -> Result<&CrashServiceClient, NetworkError> {
        self.clients
            .get(protocol)
            .ok_or_else(|| NetworkError::ClientNotFound(protocol.to_string()))
    }

    /// The crash-recovery RPC client.
    pub fn crash_client(&self) -> Result<&CrashServiceClient, NetworkError> {
        self.client(PROTOCOL_HANDLER_CRASH)
    }
}

/// Registry of counterparty gateway identities and RPC channels.
pub struct GatewayOrchestrator {
    local_gateway: GatewayIdentity,
    identities: DashMap<String, GatewayIdentity>,
    channels: DashMap<String, GatewayChannel>,
    command_tx: mpsc::Sender<NetworkCommand>,
}

impl GatewayOrchestrator {
    /// Create the orchestrator for this gateway's identity.
    pub fn new(local_gateway: GatewayIdentity, command_tx: mpsc::Sender<NetworkCommand>) -> Self {
        tracing::info!(gateway_id = %local_gateway.id, "creating gateway orchestrator");
        Self {
            local_gateway,
            identities: DashMap::new(),
            channels: DashMap::new(),
            command_tx,
        }
    }

    /// This gateway's id.
    pub fn self_id(&self) -> &str {
        &self.local_gateway.id
    }

    /// This gateway's identity.
    pub fn our_gateway(&self) -> &GatewayIdentity {
        &self.local_gateway
    }

    /// All known counterparty identities.
    pub fn counterparty_gateways(&self) -> Vec<GatewayIdentity> {
        self.identities.iter().map(|e| e.value().clone()).collect()
    }

    /// Look up a gateway identity by id.
    pub fn get_gateway_identity(&self, id: &str) -> Option<GatewayIdentity> {
        self.identities.get(id).map(|e| e.value().clone())
    }

    /// Resolve the channel to the gateway fronting the given network.
    pub fn get_channel(&self, network_id: &str) -> Result<GatewayChannel, NetworkError> {
        let gateway_id = self
            .identities
            .iter()
            .find(|e| e.value().supports(network_id))
            .map(|e| e.key().clone())
            .ok_or_else(|| NetworkError::ChannelNotFound(network_id.to_string()))?;
        self.channels
            .get(&gateway_id)
            .map(|e| e.value().clone())
            .ok_or(NetworkError::ChannelNotFound(gateway_id))
    }

    /// Number of connected channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Merge new counterparty identities, skipping ids already known, then
    /// (re-)run connection. Returns the ids that were actually added.
    pub async fn add_gateways(&self, gateways: Vec<GatewayIdentity>) -> Vec<String> {
        let mut added = Vec::new();
        for gateway in gateways {
            if gateway.id == self.local_gateway.id {
                continue;
            }
            if self.identities.contains_key(&gateway.id) {
                tracing::debug!(gateway_id = %gateway.id, "gateway already known, skipping");
                continue;
            }
            added.push(gateway.id.clone());
            self.identities.insert(gateway.id.clone(), gateway);
        }
        self.connect_to_counterparty_gateways().await;
        added
    }

    /// Create one channel per known identity that is not yet connected.
    ///
    /// Individual connection failures are logged and skipped; partial
    /// connectivity is tolerated, not fatal. Returns the number of channels
    /// connected by this pass.
    pub async fn connect_to_counterparty_gateways(&self) -> usize {
        let mut connected = 0;
        let pending: Vec<GatewayIdentity> = self
            .identities
            .iter()
            .filter(|e| !self.channels.contains_key(e.key()))
            .map(|e| e.value().clone())
            .collect();

        for gateway in pending {
            match self.create_channel(&gateway).await {
                Ok(channel) => {
                    tracing::info!(
                        gateway_id = %gateway.id,
                        peer_id = %channel.peer_id,
                        "channel connected"
                    );
                    self.channels.insert(gateway.id.clone(), channel);
                    connected += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        gateway_id = %gateway.id,
                        error = %e,
                        "failed to connect gateway channel, continuing"
                    );
                }
            }
        }
        connected
    }

    /// Dial a counterparty and assemble its per-protocol clients.
    async fn create_channel(
        &self,
        identity: &GatewayIdentity,
    ) -> Result<GatewayChannel, NetworkError> {
        let peer_id = peer_id_from_pubkey_hex(&identity.pub_key)?;
        let addr = multiaddr_for(identity)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::Dial {
                peer_id,
                addr,
                reply: reply_tx,
            })
            .await
            .map_err(|_| NetworkError::Channel("network loop gone".into()))?;
        reply_rx
            .await
            .map_err(|_| NetworkError::Channel("reply dropped".into()))??;

        let mut clients = HashMap::new();
        clients.insert(
            PROTOCOL_HANDLER_CRASH.to_string(),
            CrashServiceClient::new(peer_id, self.command_tx.clone()),
        );

        Ok(GatewayChannel {
            to_gateway_id: identity.id.clone(),
            peer_id,
            clients,
        })
    }
}

/// Build the dialable multiaddr for a gateway identity.
fn multiaddr_for(identity: &GatewayIdentity) -> Result<Multiaddr, NetworkError> {
    let addr_str = match identity.address.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => format!("/ip4/{}/tcp/{}", ip, identity.port),
        Ok(IpAddr::V6(ip)) => format!("/ip6/{}/tcp/{}", ip, identity.port),
        Err(_) => format!("/dns4/{}/tcp/{}", identity.address, identity.port),
    };
    Ok(addr_str.parse()?)
}
