//! Client-side crash-recovery message builders.
//!
//! Every builder populates the message, canonicalizes it with the signature
//! field blanked, and signs before returning.

use std::sync::Arc;

use satp_core::session::SessionData;
use satp_crypto::{message_hash, sign_message, KeyPair};

use crate::error::RecoveryError;
use crate::messages::{
    RecoverMessage, RecoverResponse, RecoverSuccessMessage, RollbackMessage, RECOVER_MSG_URN,
    RECOVER_SUCCESS_MSG_URN, ROLLBACK_MSG_URN,
};
use crate::rollback::{RollbackState, RollbackStatus};

pub struct CrashRecoveryClientService {
    signer: Arc<KeyPair>,
}

impl CrashRecoveryClientService {
    pub fn new(signer: Arc<KeyPair>) -> Self {
        Self { signer }
    }

    /// Build the signed RecoverMessage asking the counterparty for every
    /// log entry from our last accepted sequence number on.
    pub fn create_recover_message(
        &self,
        session_data: &SessionData,
        last_entry_timestamp: u64,
    ) -> Result<RecoverMessage, RecoveryError> {
        let satp_phase = session_data
            .current_stage()
            .map(|(stage, _)| stage.as_u32())
            .unwrap_or(0);

        let mut message = RecoverMessage {
            message_type: RECOVER_MSG_URN.to_string(),
            session_id: session_data.id.clone(),
            satp_phase,
            sequence_number: session_data.last_sequence_number,
            is_backup: false,
            last_entry_timestamp,
            client_signature: String::new(),
        };
        message.client_signature = sign_message(&message, &self.signer)?;

        tracing::debug!(
            session_id = %message.session_id,
            satp_phase,
            sequence_number = message.sequence_number,
            "built recover message"
        );
        Ok(message)
    }

    /// Build the signed RecoverSuccessMessage confirming the entries of a
    /// RecoverResponse were applied.
    pub fn create_recover_success_message(
        &self,
        session_data: &SessionData,
        response: &RecoverResponse,
    ) -> Result<RecoverSuccessMessage, RecoveryError> {
        let mut message = RecoverSuccessMessage {
            message_type: RECOVER_SUCCESS_MSG_URN.to_string(),
            session_id: session_data.id.clone(),
            hash_recover_update_message: message_hash(response)?,
            success: true,
            entries_changed: response
                .recovered_logs
                .iter()
                .map(|l| l.sequence_number)
                .collect(),
            client_signature: String::new(),
        };
        message.client_signature = sign_message(&message, &self.signer)?;
        Ok(message)
    }

    /// Build the signed RollbackMessage reporting the compensating actions
    /// a rollback strategy performed.
    pub fn create_rollback_message(
        &self,
        session_data: &SessionData,
        rollback_state: &RollbackState,
    ) -> Result<RollbackMessage, RecoveryError> {
        let mut message = RollbackMessage {
            message_type: ROLLBACK_MSG_URN.to_string(),
            session_id: session_data.id.clone(),
            success: rollback_state.status == RollbackStatus::Completed,
            actions_performed: rollback_state.actions_performed(),
            proofs: rollback_state.proofs(),
            client_signature: String::new(),
        };
        message.client_signature = sign_message(&message, &self.signer)?;
        Ok(message)
    }
}
