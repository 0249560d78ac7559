//! Gateway configuration: identity, counterparties, storage, crash timing.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use satp_core::config::CoreConfig;
use satp_core::types::{GatewayIdentity, LedgerType, NetworkId};

/// This gateway's own identity and listen configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Unique gateway id announced to counterparties.
    pub id: String,
    /// Listen address for gateway-to-gateway networking.
    pub listen_address: String,
    /// Port for gateway-to-gateway networking.
    pub port: u16,
    /// Path to the 32-byte Ed25519 seed; generated if missing.
    pub keypair_path: Option<PathBuf>,
    /// Networks this gateway fronts.
    pub supported_ledgers: Vec<NetworkId>,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Path to the data directory.
    pub data_dir: PathBuf,
}

/// Crash detection timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashSection {
    pub check_interval_ms: u64,
    pub max_retries: u32,
    pub max_timeout_ms: u64,
}

/// Full configuration for a SATP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub gateway: GatewaySection,
    /// Counterparty gateways to connect to at startup.
    pub counterparties: Vec<GatewayIdentity>,
    pub storage: StorageSection,
    pub crash: CrashSection,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let core = CoreConfig::default();
        Self {
            gateway: GatewaySection {
                id: "satp-gateway".into(),
                listen_address: "0.0.0.0".into(),
                port: 3010,
                keypair_path: None,
                supported_ledgers: vec![NetworkId::new("fabric-net", LedgerType::Fabric)],
            },
            counterparties: Vec::new(),
            storage: StorageSection {
                data_dir: "./data".into(),
            },
            crash: CrashSection {
                check_interval_ms: core.crash_check_interval_ms,
                max_retries: core.default_max_retries,
                max_timeout_ms: core.default_max_timeout_ms,
            },
            log_level: "info".into(),
        }
    }
}

impl GatewayConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Write to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The libp2p listen multiaddr.
    pub fn p2p_multiaddr(&self) -> String {
        format!(
            "/ip4/{}/tcp/{}",
            self.gateway.listen_address, self.gateway.port
        )
    }

    /// Build this gateway's identity from the given signing pubkey.
    pub fn local_identity(&self, pub_key_hex: String) -> GatewayIdentity {
        GatewayIdentity {
            id: self.gateway.id.clone(),
            pub_key: pub_key_hex,
            supported_ledgers: self.gateway.supported_ledgers.clone(),
            address: self.gateway.listen_address.clone(),
            port: self.gateway.port,
        }
    }

    /// The core timing configuration.
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            crash_check_interval_ms: self.crash.check_interval_ms,
            default_max_retries: self.crash.max_retries,
            default_max_timeout_ms: self.crash.max_timeout_ms,
        }
    }
}
