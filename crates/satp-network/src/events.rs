//! High-level network events emitted to the application layer.

use libp2p::{Multiaddr, PeerId};

/// A counterparty gateway connected.
#[derive(Debug, Clone)]
pub struct PeerConnected {
    pub peer_id: PeerId,
    pub num_connected: usize,
}

/// A counterparty gateway disconnected.
#[derive(Debug, Clone)]
pub struct PeerDisconnected {
    pub peer_id: PeerId,
    pub num_connected: usize,
}

/// Events surfaced from the network event loop.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    PeerConnected(PeerConnected),
    PeerDisconnected(PeerDisconnected),
    /// The gateway is listening on an address.
    Listening { address: Multiaddr },
    /// An inbound crash-recovery request was dispatched to the handler.
    InboundCrashRequest { peer_id: PeerId },
}
