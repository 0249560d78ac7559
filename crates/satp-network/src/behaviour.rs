//! Composed libp2p network behaviour for a SATP gateway.

use libp2p::identity::Keypair;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{identify, request_response};

use crate::error::NetworkError;
use crate::protocol::{CrashRequest, CrashResponse, CRASH_PROTOCOL};

/// Identify protocol version string exchanged between gateways.
const IDENTIFY_PROTOCOL_VERSION: &str = "/satp/1.0.0";

/// The combined behaviour: crash-recovery request-response plus identify.
#[derive(NetworkBehaviour)]
pub struct GatewayBehaviour {
    pub request_response: request_response::cbor::Behaviour<CrashRequest, CrashResponse>,
    pub identify: identify::Behaviour,
}

impl GatewayBehaviour {
    pub fn new(keypair: &Keypair) -> Result<Self, NetworkError> {
        let request_response = request_response::cbor::Behaviour::new(
            [(CRASH_PROTOCOL, request_response::ProtocolSupport::Full)],
            request_response::Config::default(),
        );

        let identify = identify::Behaviour::new(identify::Config::new(
            IDENTIFY_PROTOCOL_VERSION.to_string(),
            keypair.public(),
        ));

        Ok(Self {
            request_response,
            identify,
        })
    }
}
