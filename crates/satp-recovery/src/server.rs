//! Server-side crash-recovery request handlers.
//!
//! Each handler verifies the request signature against the session's stored
//! counterpart pubkey before touching the repository or any ledger, then
//! returns a server-signed response.

use dashmap::DashMap;
use std::sync::Arc;

use satp_core::session::{SatpSession, SessionData};
use satp_core::SatpError;
use satp_crypto::{message_hash, sign_message, signature_verifier, KeyPair};

use crate::error::RecoveryError;
use crate::messages::{
    RecoverMessage, RecoverResponse, RecoverSuccessMessage, RecoverSuccessResponse,
    RollbackMessage, RollbackResponse, RECOVER_SUCCESS_ACK_MSG_URN, RECOVER_UPDATE_MSG_URN,
    ROLLBACK_ACK_MSG_URN,
};
use crate::repository::LocalLogRepository;
use crate::rollback::{RollbackStatus, RollbackStrategyFactory};

pub struct CrashRecoveryServerService {
    sessions: Arc<DashMap<String, SatpSession>>,
    repository: Arc<dyn LocalLogRepository>,
    factory: Arc<RollbackStrategyFactory>,
    signer: Arc<KeyPair>,
}

impl CrashRecoveryServerService {
    pub fn new(
        sessions: Arc<DashMap<String, SatpSession>>,
        repository: Arc<dyn LocalLogRepository>,
        factory: Arc<RollbackStrategyFactory>,
        signer: Arc<KeyPair>,
    ) -> Self {
        Self {
            sessions,
            repository,
            factory,
            signer,
        }
    }

    /// The tracked session data for a session id, whichever side is loaded
    /// (a responding gateway normally holds the server side).
    fn session_data_for(&self, session_id: &str) -> Result<SessionData, SatpError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SatpError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        if session.has_server_session_data() {
            Ok(session.get_server_session_data()?.clone())
        } else {
            Ok(session.get_client_session_data()?.clone())
        }
    }

    /// Answer a RecoverMessage with our log entries from the requested
    /// sequence number on.
    pub async fn handle_recover(
        &self,
        request: RecoverMessage,
    ) -> Result<RecoverResponse, RecoveryError> {
        let session_data = self.session_data_for(&request.session_id)?;

        // Reject forged requests before any repository read.
        signature_verifier(&request, &session_data)?;

        let logs = self
            .repository
            .fetch_logs_from_sequence(&request.session_id, request.sequence_number)
            .await?;
        if logs.is_empty() {
            return Err(SatpError::NoLogsFound {
                session_id: request.session_id.clone(),
            }
            .into());
        }

        tracing::info!(
            session_id = %request.session_id,
            entries = logs.len(),
            from_sequence = request.sequence_number,
            "answering recover request"
        );

        let mut response = RecoverResponse {
            message_type: RECOVER_UPDATE_MSG_URN.to_string(),
            session_id: request.session_id.clone(),
            hash_recover_message: message_hash(&request)?,
            recovered_logs: logs,
            server_signature: String::new(),
        };
        response.server_signature = sign_message(&response, &self.signer)?;
        Ok(response)
    }

    /// Acknowledge a RecoverSuccessMessage.
    pub async fn handle_recover_success(
        &self,
        request: RecoverSuccessMessage,
    ) -> Result<RecoverSuccessResponse, RecoveryError> {
        let session_data = self.session_data_for(&request.session_id)?;
        signature_verifier(&request, &session_data)?;

        tracing::info!(
            session_id = %request.session_id,
            entries_changed = request.entries_changed.len(),
            success = request.success,
            "counterparty confirmed recovery"
        );

        let mut response = RecoverSuccessResponse {
            message_type: RECOVER_SUCCESS_ACK_MSG_URN.to_string(),
            session_id: request.session_id.clone(),
            received: true,
            server_signature: String::new(),
        };
        response.server_signature = sign_message(&response, &self.signer)?;
        Ok(response)
    }

    /// Execute our own side of a rollback and report the actions taken.
    pub async fn handle_rollback(
        &self,
        request: RollbackMessage,
    ) -> Result<RollbackResponse, RecoveryError> {
        let session_data = self.session_data_for(&request.session_id)?;
        signature_verifier(&request, &session_data)?;

        let strategy = self.factory.create_strategy(&session_data)?;
        let state = strategy.execute(&session_data, session_data.role).await?;

        tracing::info!(
            session_id = %request.session_id,
            status = ?state.status,
            actions = state.rollback_log_entries.len(),
            "executed server-side rollback"
        );

        let mut response = RollbackResponse {
            message_type: ROLLBACK_ACK_MSG_URN.to_string(),
            session_id: request.session_id.clone(),
            success: state.status == RollbackStatus::Completed,
            actions_performed: state.actions_performed(),
            proofs: state.proofs(),
            server_signature: String::new(),
        };
        response.server_signature = sign_message(&response, &self.signer)?;
        Ok(response)
    }
}
