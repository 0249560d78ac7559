//! The gateway network node.
//!
//! `GatewayNetwork` owns the libp2p `Swarm`, runs the event loop, and
//! exposes a command channel other tasks use to dial counterparties and
//! issue crash-recovery requests. Outbound requests are correlated to their
//! oneshot reply slots by request id; inbound requests are dispatched to the
//! registered [`CrashMessageHandler`] on a spawned task, with the response
//! flowing back into the swarm loop as a command.

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::identity::Keypair;
use libp2p::request_response::{self, OutboundRequestId, ResponseChannel};
use libp2p::swarm::SwarmEvent;
use libp2p::{identify, Multiaddr, PeerId, Swarm};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::behaviour::{GatewayBehaviour, GatewayBehaviourEvent};
use crate::error::NetworkError;
use crate::events::{NetworkEvent, PeerConnected, PeerDisconnected};
use crate::protocol::{CrashRequest, CrashResponse};
use crate::transport;

/// Handles inbound crash-recovery requests from counterparty gateways.
///
/// Implemented by the crash-recovery server service; registered on the
/// network before the event loop starts.
#[async_trait]
pub trait CrashMessageHandler: Send + Sync {
    async fn handle(&self, peer: PeerId, request: CrashRequest) -> CrashResponse;
}

/// Configuration for the GatewayNetwork.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// The listen address, e.g. "/ip4/0.0.0.0/tcp/3010".
    pub listen_addr: String,
    /// Broadcast channel capacity for network events.
    pub event_channel_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/0".into(),
            event_channel_capacity: 256,
        }
    }
}

/// Commands that can be sent to the network event loop from external tasks.
pub enum NetworkCommand {
    /// Register an address for a counterparty and dial it.
    Dial {
        peer_id: PeerId,
        addr: Multiaddr,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    /// Send a crash-recovery request and route the response to `reply`.
    SendCrashRequest {
        peer_id: PeerId,
        request: CrashRequest,
        reply: oneshot::Sender<Result<CrashResponse, NetworkError>>,
    },
    /// Deliver a handler-produced response for an inbound request.
    Respond {
        channel: ResponseChannel<CrashResponse>,
        response: CrashResponse,
    },
}

/// The gateway P2P network node.
pub struct GatewayNetwork {
    /// The libp2p keypair for this gateway.
    keypair: Keypair,
    /// Our local PeerId.
    local_peer_id: PeerId,
    /// Node configuration.
    config: NetworkConfig,
    /// The libp2p swarm (set after start).
    swarm: Option<Swarm<GatewayBehaviour>>,
    /// Broadcast sender for network events.
    event_tx: broadcast::Sender<NetworkEvent>,
    /// Outbound requests awaiting a response, keyed by request id.
    pending_requests: HashMap<OutboundRequestId, oneshot::Sender<Result<CrashResponse, NetworkError>>>,
    /// Handler for inbound crash-recovery requests.
    handler: Option<Arc<dyn CrashMessageHandler>>,
    /// Connected peers tracking.
    connected_peers: HashSet<PeerId>,
    /// Command sender (cloneable, handed out via `command_sender()`).
    command_tx: mpsc::Sender<NetworkCommand>,
    /// Command receiver consumed by the event loop.
    command_rx: Option<mpsc::Receiver<NetworkCommand>>,
}

impl GatewayNetwork {
    /// Create a new GatewayNetwork with the given keypair and config.
    pub fn new(keypair: Keypair, config: NetworkConfig) -> Result<Self, NetworkError> {
        let local_peer_id = PeerId::from(keypair.public());
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(256);

        tracing::info!(%local_peer_id, "creating gateway network node");

        Ok(Self {
            keypair,
            local_peer_id,
            config,
            swarm: None,
            event_tx,
            pending_requests: HashMap::new(),
            handler: None,
            connected_peers: HashSet::new(),
            command_tx,
            command_rx: Some(command_rx),
        })
    }

    /// Get the local PeerId.
    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Get a receiver for network events.
    pub fn event_receiver(&self) -> broadcast::Receiver<NetworkEvent> {
        self.event_tx.subscribe()
    }

    /// Get a command sender usable from other tasks.
    pub fn command_sender(&self) -> mpsc::Sender<NetworkCommand> {
        self.command_tx.clone()
    }

    /// Register the handler for inbound crash-recovery requests.
    /// Must be called before `run()`.
    pub fn set_crash_handler(&mut self, handler: Arc<dyn CrashMessageHandler>) {
        self.handler = Some(handler);
    }

    /// Check if the node's swarm has been started.
    pub fn is_running(&self) -> bool {
        self.swarm.is_some()
    }

    /// Get the number of currently connected peers.
    pub fn connected_peer_count(&self) -> usize {
        self.connected_peers.len()
    }

    /// Start the node: build the swarm and listen on the configured address.
    pub async fn start(&mut self) -> Result<(), NetworkError> {
        if self.swarm.is_some() {
            return Err(NetworkError::AlreadyRunning);
        }

        tracing::info!(
            listen_addr = %self.config.listen_addr,
            peer_id = %self.local_peer_id,
            "starting gateway network"
        );

        let mut swarm = transport::build_swarm(self.keypair.clone(), GatewayBehaviour::new)?;

        let listen_addr = Multiaddr::from_str(&self.config.listen_addr)
            .map_err(|e| NetworkError::Listen(format!("invalid listen address: {}", e)))?;

        swarm
            .listen_on(listen_addr)
            .map_err(|e| NetworkError::Listen(e.to_string()))?;

        self.swarm = Some(swarm);
        Ok(())
    }

    /// Run the event loop. Call in a tokio::spawn after start().
    ///
    /// Processes swarm events and external commands until the command
    /// channel closes.
    pub async fn run(&mut self) -> Result<(), NetworkError> {
        if self.swarm.is_none() {
            return Err(NetworkError::NotStarted);
        }

        let mut command_rx = self.command_rx.take().ok_or(NetworkError::NotStarted)?;

        tracing::info!(peer_id = %self.local_peer_id, "gateway network event loop started");

        enum Action {
            SwarmEvent(SwarmEvent<GatewayBehaviourEvent>),
            Command(NetworkCommand),
            CommandChannelClosed,
        }

        loop {
            let action = {
                let swarm = match self.swarm.as_mut() {
                    Some(s) => s,
                    None => break,
                };
                tokio::select! {
                    event = swarm.select_next_some() => Action::SwarmEvent(event),
                    cmd = command_rx.recv() => match cmd {
                        Some(c) => Action::Command(c),
                        None => Action::CommandChannelClosed,
                    },
                }
            };

            match action {
                Action::SwarmEvent(event) => self.handle_swarm_event(event),
                Action::Command(cmd) => self.handle_command(cmd),
                Action::CommandChannelClosed => {
                    tracing::info!("gateway network shutting down (command channel closed)");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Stop the node. In-flight requests fail with a channel error.
    pub fn stop(&mut self) {
        self.swarm = None;
        self.connected_peers.clear();
        for (_, reply) in self.pending_requests.drain() {
            let _ = reply.send(Err(NetworkError::Channel("network stopped".into())));
        }
        tracing::info!(peer_id = %self.local_peer_id, "gateway network stopped");
    }

    fn handle_command(&mut self, cmd: NetworkCommand) {
        let Some(swarm) = self.swarm.as_mut() else {
            return;
        };
        match cmd {
            NetworkCommand::Dial {
                peer_id,
                addr,
                reply,
            } => {
                swarm.add_peer_address(peer_id, addr.clone());
                let result = swarm
                    .dial(addr)
                    .map_err(|e| NetworkError::Dial(e.to_string()));
                let _ = reply.send(result);
            }
            NetworkCommand::SendCrashRequest {
                peer_id,
                request,
                reply,
            } => {
                let request_id = swarm
                    .behaviour_mut()
                    .request_response
                    .send_request(&peer_id, request);
                self.pending_requests.insert(request_id, reply);
            }
            NetworkCommand::Respond { channel, response } => {
                if swarm
                    .behaviour_mut()
                    .request_response
                    .send_response(channel, response)
                    .is_err()
                {
                    tracing::warn!("failed to send response: channel closed");
                }
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<GatewayBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(behaviour_event) => {
                self.handle_behaviour_event(behaviour_event);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                self.connected_peers.insert(peer_id);
                tracing::info!(
                    %peer_id,
                    num_established,
                    total_connected = self.connected_peers.len(),
                    "connection established"
                );
                let _ = self.event_tx.send(NetworkEvent::PeerConnected(PeerConnected {
                    peer_id,
                    num_connected: self.connected_peers.len(),
                }));
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    self.connected_peers.remove(&peer_id);
                }
                tracing::info!(
                    %peer_id,
                    num_established,
                    total_connected = self.connected_peers.len(),
                    "connection closed"
                );
                let _ = self
                    .event_tx
                    .send(NetworkEvent::PeerDisconnected(PeerDisconnected {
                        peer_id,
                        num_connected: self.connected_peers.len(),
                    }));
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(%address, "listening on address");
                let _ = self.event_tx.send(NetworkEvent::Listening { address });
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::warn!(?peer_id, error = %error, "outgoing connection error");
            }
            SwarmEvent::IncomingConnectionError { error, .. } => {
                tracing::warn!(error = %error, "incoming connection error");
            }
            _ => {}
        }
    }

    fn handle_behaviour_event(&mut self, event: GatewayBehaviourEvent) {
        match event {
            GatewayBehaviourEvent::RequestResponse(request_response::Event::Message {
                peer,
                message,
            }) => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    self.handle_incoming_request(peer, request, channel);
                }
                request_response::Message::Response {
                    request_id,
                    response,
                } => {
                    if let Some(reply) = self.pending_requests.remove(&request_id) {
                        let _ = reply.send(Ok(response));
                    } else {
                        tracing::warn!(%peer, ?request_id, "response for unknown request");
                    }
                }
            },
            GatewayBehaviourEvent::RequestResponse(request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
            }) => {
                tracing::warn!(%peer, error = %error, "outbound request failed");
                if let Some(reply) = self.pending_requests.remove(&request_id) {
                    let _ = reply.send(Err(NetworkError::RequestFailed(error.to_string())));
                }
            }
            GatewayBehaviourEvent::RequestResponse(request_response::Event::InboundFailure {
                peer,
                error,
                ..
            }) => {
                tracing::warn!(%peer, error = %error, "inbound request failed");
            }
            GatewayBehaviourEvent::RequestResponse(request_response::Event::ResponseSent {
                ..
            }) => {}

            GatewayBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                tracing::debug!(
                    %peer_id,
                    protocol_version = %info.protocol_version,
                    "identify: received peer info"
                );
            }
            GatewayBehaviourEvent::Identify(_) => {}
        }
    }

    /// Dispatch an inbound crash-recovery request to the registered handler
    /// on its own task; the response re-enters the loop as a Respond command.
    fn handle_incoming_request(
        &mut self,
        peer: PeerId,
        request: CrashRequest,
        channel: ResponseChannel<CrashResponse>,
    ) {
        tracing::debug!(%peer, "incoming crash-recovery request");
        let _ = self
            .event_tx
            .send(NetworkEvent::InboundCrashRequest { peer_id: peer });

        match &self.handler {
            Some(handler) => {
                let handler = handler.clone();
                let command_tx = self.command_tx.clone();
                tokio::spawn(async move {
                    let response = handler.handle(peer, request).await;
                    if command_tx
                        .send(NetworkCommand::Respond { channel, response })
                        .await
                        .is_err()
                    {
                        tracing::warn!("network loop gone, dropping response");
                    }
                });
            }
            None => {
                let Some(swarm) = self.swarm.as_mut() else {
                    return;
                };
                let response = CrashResponse::Error {
                    message: "no crash-recovery handler registered".into(),
                };
                let _ = swarm
                    .behaviour_mut()
                    .request_response
                    .send_response(channel, response);
            }
        }
    }
}
