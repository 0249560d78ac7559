//! Compensation for fungible asset transfers: unlock what was locked on the
//! source ledger, burn what was minted on the destination.

use async_trait::async_trait;
use std::sync::Arc;

use satp_core::message::MessageType;
use satp_core::session::SessionData;
use satp_core::types::{NetworkId, Role};

use crate::error::RecoveryError;
use crate::rollback::{
    BridgeManager, RollbackLogEntry, RollbackState, RollbackStatus, RollbackStrategy,
};

pub const ACTION_UNLOCK_ASSET: &str = "unlock-asset";
pub const ACTION_BURN_ASSET: &str = "burn-asset";

/// Rollback for fungible transfers between a source and destination ledger.
///
/// Which compensations run is derived from the session's recorded stage
/// artifacts: a lock assertion hash means the source asset was locked, a
/// commit-final hash means the destination asset was minted. The bridge's
/// state queries make re-invocation a no-op once compensation happened.
pub struct FungibleRollbackStrategy {
    bridge: Arc<dyn BridgeManager>,
    source: NetworkId,
    destination: NetworkId,
}

impl FungibleRollbackStrategy {
    pub fn new(bridge: Arc<dyn BridgeManager>, source: NetworkId, destination: NetworkId) -> Self {
        Self {
            bridge,
            source,
            destination,
        }
    }

    fn now_ms() -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }
}

#[async_trait]
impl RollbackStrategy for FungibleRollbackStrategy {
    async fn execute(
        &self,
        session_data: &SessionData,
        role: Role,
    ) -> Result<RollbackState, RecoveryError> {
        let session_id = session_data.id.clone();
        tracing::info!(
            %session_id,
            %role,
            source = %self.source,
            destination = %self.destination,
            "executing fungible rollback"
        );

        let mut entries = Vec::new();

        // A recorded lock assertion means the sender asset was locked on
        // the source ledger.
        if session_data.hashes.is_set(MessageType::LockAssert) {
            if let Some(asset) = &session_data.sender_asset {
                if self.bridge.is_asset_locked(&self.source.id, asset).await? {
                    let proof = self.bridge.unlock_asset(&self.source.id, asset).await?;
                    entries.push(RollbackLogEntry {
                        action: ACTION_UNLOCK_ASSET.into(),
                        proof: Some(proof),
                        timestamp: Self::now_ms(),
                    });
                } else {
                    tracing::debug!(%session_id, "source asset not locked, skipping unlock");
                }
            }
        }

        // A recorded commit-final assertion means the receiver asset was
        // minted on the destination ledger.
        if session_data.hashes.is_set(MessageType::CommitFinal) {
            if let Some(asset) = &session_data.receiver_asset {
                if self
                    .bridge
                    .is_asset_minted(&self.destination.id, asset)
                    .await?
                {
                    let proof = self.bridge.burn_asset(&self.destination.id, asset).await?;
                    entries.push(RollbackLogEntry {
                        action: ACTION_BURN_ASSET.into(),
                        proof: Some(proof),
                        timestamp: Self::now_ms(),
                    });
                } else {
                    tracing::debug!(%session_id, "destination asset not minted, skipping burn");
                }
            }
        }

        Ok(RollbackState {
            session_id,
            status: RollbackStatus::Completed,
            rollback_log_entries: entries,
        })
    }

    async fn cleanup(
        &self,
        session_data: &SessionData,
        state: RollbackState,
    ) -> Result<RollbackState, RecoveryError> {
        // Confirm nothing is left in a compensatable state.
        if let Some(asset) = &session_data.sender_asset {
            if self.bridge.is_asset_locked(&self.source.id, asset).await? {
                return Err(RecoveryError::Bridge(format!(
                    "source asset {} still locked after rollback",
                    asset.token_id
                )));
            }
        }
        if let Some(asset) = &session_data.receiver_asset {
            if self
                .bridge
                .is_asset_minted(&self.destination.id, asset)
                .await?
            {
                return Err(RecoveryError::Bridge(format!(
                    "destination asset {} still minted after rollback",
                    asset.token_id
                )));
            }
        }
        tracing::info!(session_id = %state.session_id, "rollback cleanup complete");
        Ok(state)
    }
}
