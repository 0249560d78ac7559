//! Strategy selection: a pure function of the session's chain identifiers.

use std::sync::Arc;

use satp_core::session::SessionData;
use satp_core::types::LedgerType;
use satp_core::SatpError;

use crate::rollback::{BridgeManager, FungibleRollbackStrategy, RollbackStrategy};

/// Selects the compensation strategy for a session's chain pairing.
pub struct RollbackStrategyFactory {
    bridge: Arc<dyn BridgeManager>,
}

impl RollbackStrategyFactory {
    pub fn new(bridge: Arc<dyn BridgeManager>) -> Self {
        Self { bridge }
    }

    /// Resolve the strategy for the session's source/destination ledgers.
    ///
    /// Fails with an unsupported-network error when the session has no
    /// chain identifiers yet (nothing ledger-side can have happened either).
    pub fn create_strategy(
        &self,
        session_data: &SessionData,
    ) -> Result<Arc<dyn RollbackStrategy>, SatpError> {
        let source = session_data.sender_gateway_network_id.clone().ok_or_else(|| {
            SatpError::UnsupportedNetwork {
                origin: "unset".into(),
                destination: "unset".into(),
            }
        })?;
        let destination = session_data
            .recipient_gateway_network_id
            .clone()
            .ok_or_else(|| SatpError::UnsupportedNetwork {
                origin: source.to_string(),
                destination: "unset".into(),
            })?;

        tracing::debug!(
            session_id = %session_data.id,
            %source,
            %destination,
            "selecting rollback strategy"
        );

        // Every supported pairing compensates fungible transfers the same
        // way today; the match is the extension point for pair-specific
        // strategies.
        let strategy: Arc<dyn RollbackStrategy> =
            match (source.ledger_type, destination.ledger_type) {
                (LedgerType::Fabric, _)
                | (LedgerType::Besu, _)
                | (LedgerType::Ethereum, _) => Arc::new(FungibleRollbackStrategy::new(
                    self.bridge.clone(),
                    source,
                    destination,
                )),
            };
        Ok(strategy)
    }
}
