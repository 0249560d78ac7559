//! The full SATP gateway: wires keys, network, orchestrator, storage and
//! the crash manager together.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use satp_core::session::SatpSession;
use satp_core::types::LedgerType;
use satp_crypto::KeyPair;
use satp_network::{GatewayNetwork, GatewayOrchestrator, NetworkConfig};
use satp_recovery::{BridgeManager, CrashManager, CrashManagerOptions, LocalLogRepository};

use crate::config::GatewayConfig;
use crate::storage::RocksDbLogRepository;

/// A running gateway's health report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub gateway_id: String,
    pub connected_channels: usize,
    pub tracked_sessions: usize,
}

/// The SATP gateway node.
pub struct SatpGateway {
    config: GatewayConfig,
    signer: Arc<KeyPair>,
    /// The network layer (None after start moves it into a background task).
    network: Option<GatewayNetwork>,
    orchestrator: Arc<GatewayOrchestrator>,
    crash_manager: Arc<CrashManager>,
}

impl SatpGateway {
    /// Assemble a gateway from its configuration and a bridge to the
    /// ledger connectors.
    pub fn new(config: GatewayConfig, bridge: Arc<dyn BridgeManager>) -> Result<Self> {
        let seed = match &config.gateway.keypair_path {
            Some(path) => Self::load_or_generate_seed(path)?,
            None => {
                tracing::info!("generating ephemeral gateway keypair");
                KeyPair::generate().secret_bytes()
            }
        };
        let signer = Arc::new(KeyPair::from_seed(&seed));

        // The signing key doubles as the transport identity, so the peer id
        // counterparties derive from our announced pubkey matches the one
        // the Noise handshake authenticates.
        let p2p_keypair = libp2p::identity::Keypair::ed25519_from_bytes(seed)
            .map_err(|e| anyhow::anyhow!("failed to build transport keypair: {}", e))?;

        let network = GatewayNetwork::new(
            p2p_keypair,
            NetworkConfig {
                listen_addr: config.p2p_multiaddr(),
                event_channel_capacity: 256,
            },
        )?;

        let identity = config.local_identity(signer.public_key_hex());
        let orchestrator = Arc::new(GatewayOrchestrator::new(
            identity,
            network.command_sender(),
        ));

        let repository: Arc<dyn LocalLogRepository> =
            Arc::new(RocksDbLogRepository::open(&config.storage.data_dir)?);

        let crash_manager = CrashManager::new(CrashManagerOptions {
            repository,
            orchestrator: orchestrator.clone(),
            bridge,
            signer: signer.clone(),
            config: config.core_config(),
        });

        tracing::info!(gateway_id = %config.gateway.id, "SATP gateway created");

        Ok(Self {
            config,
            signer,
            network: Some(network),
            orchestrator,
            crash_manager,
        })
    }

    /// Start the gateway: network, counterparty channels, startup recovery.
    pub async fn start(&mut self) -> Result<()> {
        let mut network = self
            .network
            .take()
            .ok_or_else(|| anyhow::anyhow!("gateway already started"))?;

        network.set_crash_handler(self.crash_manager.handler());
        network.start().await?;

        tokio::spawn(async move {
            if let Err(e) = network.run().await {
                tracing::error!(error = %e, "network event loop error");
            }
            tracing::info!("network event loop exited");
        });

        let connected = self
            .orchestrator
            .add_gateways(self.config.counterparties.clone())
            .await;
        tracing::info!(
            added = connected.len(),
            channels = self.orchestrator.channel_count(),
            "counterparty gateways registered"
        );

        self.crash_manager.recover_sessions().await;

        tracing::info!(gateway_id = %self.config.gateway.id, "SATP gateway started");
        Ok(())
    }

    /// Gracefully shut down: cancel every crash-detection timer.
    pub async fn shutdown(&mut self) {
        tracing::info!(gateway_id = %self.config.gateway.id, "shutting down SATP gateway");
        self.crash_manager.shutdown();
    }

    /// This gateway's hex-encoded signing pubkey.
    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }

    /// Track a session and start crash detection for it.
    pub fn track_session(&self, session: SatpSession) {
        self.crash_manager.track_session(session);
    }

    /// A tracked session by id.
    pub fn get_session(&self, session_id: &str) -> Option<SatpSession> {
        self.crash_manager.get_session(session_id)
    }

    /// Ids of all tracked sessions.
    pub fn get_sessions(&self) -> Vec<String> {
        self.crash_manager.session_ids()
    }

    /// Health summary for admin surfaces.
    pub fn health_check(&self) -> HealthStatus {
        HealthStatus {
            gateway_id: self.config.gateway.id.clone(),
            connected_channels: self.orchestrator.channel_count(),
            tracked_sessions: self.crash_manager.session_ids().len(),
        }
    }

    /// Ledger technologies this gateway fronts.
    pub fn supported_dlts(&self) -> Vec<LedgerType> {
        let mut dlts: Vec<LedgerType> = self
            .config
            .gateway
            .supported_ledgers
            .iter()
            .map(|n| n.ledger_type)
            .collect();
        dlts.dedup();
        dlts
    }

    /// Load a 32-byte seed from disk, or generate and save a new one.
    fn load_or_generate_seed(path: &Path) -> Result<[u8; 32]> {
        if path.exists() {
            let bytes = std::fs::read(path)?;
            let seed: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("keypair file must hold exactly 32 bytes"))?;
            tracing::info!(path = %path.display(), "loaded gateway keypair");
            Ok(seed)
        } else {
            let seed = KeyPair::generate().secret_bytes();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, seed)?;
            tracing::info!(path = %path.display(), "generated and saved gateway keypair");
            Ok(seed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satp_recovery::InMemoryBridgeManager;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("satp-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(dir: &Path) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.gateway.listen_address = "127.0.0.1".into();
        config.gateway.port = 0;
        config.storage.data_dir = dir.join("data");
        config
    }

    #[tokio::test]
    async fn test_gateway_creation() {
        let dir = temp_dir();
        let gateway = SatpGateway::new(
            test_config(&dir),
            Arc::new(InMemoryBridgeManager::new()),
        );
        assert!(gateway.is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_gateway_surface_before_start() {
        let dir = temp_dir();
        let gateway = SatpGateway::new(
            test_config(&dir),
            Arc::new(InMemoryBridgeManager::new()),
        )
        .unwrap();

        assert!(gateway.get_sessions().is_empty());
        assert!(gateway.get_session("nope").is_none());
        assert_eq!(gateway.supported_dlts(), vec![LedgerType::Fabric]);
        assert_eq!(gateway.public_key_hex().len(), 64);

        let health = gateway.health_check();
        assert_eq!(health.gateway_id, "satp-gateway");
        assert_eq!(health.tracked_sessions, 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_gateway_start_and_shutdown() {
        let dir = temp_dir();
        let mut gateway = SatpGateway::new(
            test_config(&dir),
            Arc::new(InMemoryBridgeManager::new()),
        )
        .unwrap();

        gateway.start().await.expect("start failed");
        gateway.shutdown().await;

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_seed_persistence() {
        let dir = temp_dir();
        let mut config = test_config(&dir);
        config.gateway.keypair_path = Some(dir.join("gateway.key"));

        let gateway1 = SatpGateway::new(
            config.clone(),
            Arc::new(InMemoryBridgeManager::new()),
        )
        .unwrap();
        let pubkey1 = gateway1.public_key_hex();
        drop(gateway1);

        // Re-opening rocksdb requires the first gateway to be dropped.
        let mut config2 = config;
        config2.storage.data_dir = dir.join("data2");
        let gateway2 = SatpGateway::new(
            config2,
            Arc::new(InMemoryBridgeManager::new()),
        )
        .unwrap();
        assert_eq!(gateway2.public_key_hex(), pubkey1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
