//! SATP gateway-to-gateway networking.
//!
//! Provides the channel layer two gateways use to exchange crash-recovery
//! messages. Built on libp2p:
//!
//! - **Request-Response** (CBOR-framed) carrying the crash-recovery RPC
//! - **Identify** for exchanging peer identity information
//! - TCP + Noise + Yamux secure transport
//!
//! The [`GatewayOrchestrator`] keeps the registries of counterparty gateway
//! identities and connected channels; the crash manager resolves an RPC
//! client for a counterparty and protocol handler name through it.

pub mod behaviour;
pub mod error;
pub mod events;
pub mod node;
pub mod orchestrator;
pub mod protocol;
pub mod transport;

pub use behaviour::{GatewayBehaviour, GatewayBehaviourEvent};
pub use error::NetworkError;
pub use events::{NetworkEvent, PeerConnected, PeerDisconnected};
pub use node::{CrashMessageHandler, GatewayNetwork, NetworkCommand, NetworkConfig};
pub use orchestrator::{
    peer_id_from_pubkey_hex, CrashServiceClient, GatewayChannel, GatewayOrchestrator,
};
pub use protocol::{CrashRequest, CrashResponse, CRASH_PROTOCOL, PROTOCOL_HANDLER_CRASH};

// Re-export commonly used libp2p types for downstream convenience.
pub use libp2p::multiaddr::Protocol;
pub use libp2p::{identity::Keypair, Multiaddr, PeerId};
