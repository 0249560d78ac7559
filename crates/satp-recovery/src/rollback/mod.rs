//! Pluggable rollback strategies: chain-pair-specific compensation for
//! transfers that cannot be recovered.

mod bridge;
mod factory;
mod fungible;

pub use bridge::{BridgeManager, InMemoryBridgeManager};
pub use factory::RollbackStrategyFactory;
pub use fungible::FungibleRollbackStrategy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use satp_core::session::SessionData;
use satp_core::types::Role;

use crate::error::RecoveryError;

/// Outcome of a rollback strategy execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackStatus {
    /// Every required compensating action was performed, or had already
    /// been performed; re-invocation never double-compensates.
    Completed,
    /// At least one compensating action failed.
    Failed,
}

/// One compensating action taken during rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackLogEntry {
    /// Action tag, e.g. "unlock-asset".
    pub action: String,
    /// Ledger proof of the compensation, when the bridge returns one.
    pub proof: Option<String>,
    /// Milliseconds since UNIX epoch.
    pub timestamp: u64,
}

/// The result of executing a rollback strategy: a status plus the ordered
/// log of actions taken. Consumed to build the signed RollbackMessage, then
/// discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackState {
    pub session_id: String,
    pub status: RollbackStatus,
    pub rollback_log_entries: Vec<RollbackLogEntry>,
}

impl RollbackState {
    /// The `action` tags in execution order.
    pub fn actions_performed(&self) -> Vec<String> {
        self.rollback_log_entries
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    /// The ledger proofs collected during execution.
    pub fn proofs(&self) -> Vec<String> {
        self.rollback_log_entries
            .iter()
            .filter_map(|e| e.proof.clone())
            .collect()
    }
}

/// A chain-pair-specific compensation strategy.
///
/// Implementations must be idempotent: re-invocation on an already
/// rolled-back session must not double-compensate.
#[async_trait]
pub trait RollbackStrategy: Send + Sync {
    /// Perform the ledger-specific compensating actions for one session
    /// side and return the ordered log of actions taken.
    async fn execute(
        &self,
        session_data: &SessionData,
        role: Role,
    ) -> Result<RollbackState, RecoveryError>;

    /// Post-compensation bookkeeping.
    async fn cleanup(
        &self,
        session_data: &SessionData,
        state: RollbackState,
    ) -> Result<RollbackState, RecoveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_and_proofs_projection() {
        let state = RollbackState {
            session_id: "s1".into(),
            status: RollbackStatus::Completed,
            rollback_log_entries: vec![
                RollbackLogEntry {
                    action: "unlock-asset".into(),
                    proof: Some("p1".into()),
                    timestamp: 1,
                },
                RollbackLogEntry {
                    action: "burn-asset".into(),
                    proof: None,
                    timestamp: 2,
                },
            ],
        };
        assert_eq!(
            state.actions_performed(),
            vec!["unlock-asset".to_string(), "burn-asset".to_string()]
        );
        assert_eq!(state.proofs(), vec!["p1".to_string()]);
    }
}
