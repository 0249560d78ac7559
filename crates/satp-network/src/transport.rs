//! libp2p transport stack construction for the gateway network.
//!
//! Builds a transport layer using TCP + Noise (encryption) + Yamux
//! (multiplexing), the standard secure transport for libp2p nodes. Channel
//! security between gateways comes from the Noise handshake here.

use libp2p::identity::Keypair;

use crate::behaviour::GatewayBehaviour;
use crate::error::NetworkError;

/// Build a libp2p Swarm with the gateway behaviour using TCP + Noise + Yamux.
pub fn build_swarm(
    keypair: Keypair,
    behaviour_fn: impl FnOnce(&Keypair) -> Result<GatewayBehaviour, NetworkError>,
) -> Result<libp2p::Swarm<GatewayBehaviour>, NetworkError> {
    // Pre-build the behaviour so errors surface before the builder chain.
    let behaviour = behaviour_fn(&keypair)?;
    let mut behaviour_slot = Some(behaviour);

    let swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            libp2p::tcp::Config::default(),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_behaviour(|_key| {
            // Called exactly once by the SwarmBuilder; the slot is Some.
            behaviour_slot
                .take()
                .expect("behaviour_slot is always Some at this point")
        })
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_swarm_config(|cfg: libp2p::swarm::Config| {
            cfg.with_idle_connection_timeout(std::time::Duration::from_secs(60))
        })
        .build();

    Ok(swarm)
}
