//! The cross-chain bridge collaborator: resolves chain-specific
//! lock/unlock/mint/burn operations invoked by rollback strategies.

use async_trait::async_trait;
use dashmap::DashMap;

use satp_core::types::Asset;

use crate::error::RecoveryError;

/// Ledger operations a rollback strategy can delegate.
///
/// Each operation returns an opaque proof string from the ledger. The
/// `is_*` queries let strategies stay idempotent: compensation is skipped
/// when the asset is no longer in the state being compensated.
#[async_trait]
pub trait BridgeManager: Send + Sync {
    async fn lock_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError>;
    async fn unlock_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError>;
    async fn mint_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError>;
    async fn burn_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError>;

    async fn is_asset_locked(&self, network_id: &str, asset: &Asset)
        -> Result<bool, RecoveryError>;
    async fn is_asset_minted(&self, network_id: &str, asset: &Asset)
        -> Result<bool, RecoveryError>;
}

fn asset_key(network_id: &str, asset: &Asset) -> String {
    format!("{}/{}", network_id, asset.token_id)
}

/// In-process bridge tracking lock/mint state in concurrent maps.
///
/// Used by tests and single-process setups; production gateways plug in a
/// connector-backed implementation.
#[derive(Default)]
pub struct InMemoryBridgeManager {
    locked: DashMap<String, bool>,
    minted: DashMap<String, bool>,
}

impl InMemoryBridgeManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BridgeManager for InMemoryBridgeManager {
    async fn lock_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError> {
        let key = asset_key(network_id, asset);
        self.locked.insert(key.clone(), true);
        tracing::info!(%key, "asset locked");
        Ok(format!("lock:{}", key))
    }

    async fn unlock_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError> {
        let key = asset_key(network_id, asset);
        self.locked.insert(key.clone(), false);
        tracing::info!(%key, "asset unlocked");
        Ok(format!("unlock:{}", key))
    }

    async fn mint_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError> {
        let key = asset_key(network_id, asset);
        self.minted.insert(key.clone(), true);
        tracing::info!(%key, "asset minted");
        Ok(format!("mint:{}", key))
    }

    async fn burn_asset(&self, network_id: &str, asset: &Asset) -> Result<String, RecoveryError> {
        let key = asset_key(network_id, asset);
        self.minted.insert(key.clone(), false);
        tracing::info!(%key, "asset burned");
        Ok(format!("burn:{}", key))
    }

    async fn is_asset_locked(
        &self,
        network_id: &str,
        asset: &Asset,
    ) -> Result<bool, RecoveryError> {
        let key = asset_key(network_id, asset);
        Ok(self.locked.get(&key).map(|e| *e.value()).unwrap_or(false))
    }

    async fn is_asset_minted(
        &self,
        network_id: &str,
        asset: &Asset,
    ) -> Result<bool, RecoveryError> {
        let key = asset_key(network_id, asset);
        Ok(self.minted.get(&key).map(|e| *e.value()).unwrap_or(false))
    }
}
