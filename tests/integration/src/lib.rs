//! Shared two-gateway test harness.
//!
//! Spins up real in-process gateway networks on loopback, wires
//! orchestrators, crash managers and in-memory repositories, and connects
//! the pair so recovery and rollback exchanges run over the actual channel
//! layer.

use std::sync::Arc;
use std::time::Duration;

use satp_core::config::CoreConfig;
use satp_core::types::{GatewayIdentity, LedgerType, NetworkId};
use satp_crypto::KeyPair;
use satp_network::{
    GatewayNetwork, GatewayOrchestrator, Keypair, NetworkConfig, NetworkEvent,
};
use satp_recovery::{
    CrashManager, CrashManagerOptions, InMemoryBridgeManager, InMemoryLogRepository,
};

/// One fully wired in-process gateway.
pub struct TestGateway {
    pub signer: Arc<KeyPair>,
    pub identity: GatewayIdentity,
    pub orchestrator: Arc<GatewayOrchestrator>,
    pub manager: Arc<CrashManager>,
    pub repository: Arc<InMemoryLogRepository>,
    pub bridge: Arc<InMemoryBridgeManager>,
}

impl TestGateway {
    pub fn pubkey_hex(&self) -> String {
        self.signer.public_key_hex()
    }
}

/// Start a gateway listening on an ephemeral loopback port.
///
/// The returned identity carries the actual listen port, so a counterparty
/// can dial it directly.
pub async fn spawn_gateway(id: &str, network: NetworkId) -> TestGateway {
    let signer = Arc::new(KeyPair::generate());
    let seed = signer.secret_bytes();
    let p2p_keypair = Keypair::ed25519_from_bytes(seed).expect("transport keypair");

    let mut net = GatewayNetwork::new(
        p2p_keypair,
        NetworkConfig {
            listen_addr: "/ip4/127.0.0.1/tcp/0".into(),
            event_channel_capacity: 64,
        },
    )
    .expect("network creation");

    let command_tx = net.command_sender();
    let orchestrator = Arc::new(GatewayOrchestrator::new(
        GatewayIdentity {
            id: id.to_string(),
            pub_key: signer.public_key_hex(),
            supported_ledgers: vec![network.clone()],
            address: "127.0.0.1".into(),
            port: 0,
        },
        command_tx,
    ));

    let repository = Arc::new(InMemoryLogRepository::new());
    let bridge = Arc::new(InMemoryBridgeManager::new());

    let manager = CrashManager::new(CrashManagerOptions {
        repository: repository.clone(),
        orchestrator: orchestrator.clone(),
        bridge: bridge.clone(),
        signer: signer.clone(),
        config: CoreConfig {
            // Keep the background timers dormant; tests drive cycles directly.
            crash_check_interval_ms: 3_600_000,
            ..CoreConfig::default()
        },
    });

    net.set_crash_handler(manager.handler());
    net.start().await.expect("network start");
    let mut events = net.event_receiver();

    tokio::spawn(async move {
        let _ = net.run().await;
    });

    // Learn the actual listen port.
    let port = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(NetworkEvent::Listening { address }) => {
                    if let Some(port) = tcp_port_of(&address) {
                        break port;
                    }
                }
                Ok(_) => {}
                Err(e) => panic!("event channel closed before listening: {}", e),
            }
        }
    })
    .await
    .expect("gateway did not start listening");

    let identity = GatewayIdentity {
        id: id.to_string(),
        pub_key: signer.public_key_hex(),
        supported_ledgers: vec![network],
        address: "127.0.0.1".into(),
        port,
    };

    TestGateway {
        signer,
        identity,
        orchestrator,
        manager,
        repository,
        bridge,
    }
}

fn tcp_port_of(address: &satp_network::Multiaddr) -> Option<u16> {
    address.iter().find_map(|protocol| match protocol {
        satp_network::Protocol::Tcp(port) => Some(port),
        _ => None,
    })
}

/// Connect both gateways to each other and wait until the channels exist.
pub async fn connect_pair(a: &TestGateway, b: &TestGateway) {
    a.orchestrator.add_gateways(vec![b.identity.clone()]).await;
    b.orchestrator.add_gateways(vec![a.identity.clone()]).await;
    assert_eq!(a.orchestrator.channel_count(), 1, "a has no channel to b");
    assert_eq!(b.orchestrator.channel_count(), 1, "b has no channel to a");
    // Give the swarms a moment to finish dialing.
    tokio::time::sleep(Duration::from_millis(200)).await;
}

/// The network id pair used across the scenarios.
pub fn fabric_net() -> NetworkId {
    NetworkId::new("fabric-net", LedgerType::Fabric)
}

pub fn besu_net() -> NetworkId {
    NetworkId::new("besu-net", LedgerType::Besu)
}
