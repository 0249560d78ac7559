//! Crash-recovery wire messages.
//!
//! Domain structs with serde (for canonical signing payloads) and protobuf
//! conversions (for the wire). Every message carries its URN message type
//! and exactly one populated signature field per direction: requests are
//! client-signed, responses server-signed.

use prost::Message as _;
use serde::{Deserialize, Serialize};

use satp_core::proto::satp::v1 as pb;
use satp_core::verifier::SignedMessage;

use crate::error::RecoveryError;
use crate::repository::LocalLogEntry;

pub const RECOVER_MSG_URN: &str = "urn:ietf:SATP-2pc:msgtype:recover-msg";
pub const RECOVER_UPDATE_MSG_URN: &str = "urn:ietf:SATP-2pc:msgtype:recover-update-msg";
pub const RECOVER_SUCCESS_MSG_URN: &str = "urn:ietf:SATP-2pc:msgtype:recover-success-msg";
pub const RECOVER_SUCCESS_ACK_MSG_URN: &str = "urn:ietf:SATP-2pc:msgtype:recover-success-ack-msg";
pub const ROLLBACK_MSG_URN: &str = "urn:ietf:SATP-2pc:msgtype:rollback-msg";
pub const ROLLBACK_ACK_MSG_URN: &str = "urn:ietf:SATP-2pc:msgtype:rollback-ack-msg";

/// Ask the counterparty for every log entry from `sequence_number` on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverMessage {
    pub message_type: String,
    pub session_id: String,
    /// The SATP stage (0-3) the requester last touched.
    pub satp_phase: u32,
    pub sequence_number: u64,
    pub is_backup: bool,
    pub last_entry_timestamp: u64,
    pub client_signature: String,
}

impl RecoverMessage {
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecoveryError> {
        Ok(Self::from_proto(&pb::RecoverRequest::decode(bytes)?))
    }

    pub fn to_proto(&self) -> pb::RecoverRequest {
        pb::RecoverRequest {
            message_type: self.message_type.clone(),
            session_id: self.session_id.clone(),
            satp_phase: self.satp_phase,
            sequence_number: self.sequence_number,
            is_backup: self.is_backup,
            last_entry_timestamp: self.last_entry_timestamp,
            client_signature: self.client_signature.clone(),
        }
    }

    pub fn from_proto(proto: &pb::RecoverRequest) -> Self {
        Self {
            message_type: proto.message_type.clone(),
            session_id: proto.session_id.clone(),
            satp_phase: proto.satp_phase,
            sequence_number: proto.sequence_number,
            is_backup: proto.is_backup,
            last_entry_timestamp: proto.last_entry_timestamp,
            client_signature: proto.client_signature.clone(),
        }
    }
}

impl SignedMessage for RecoverMessage {
    fn client_signature(&self) -> &str {
        &self.client_signature
    }
    fn server_signature(&self) -> &str {
        ""
    }
    fn clear_signatures(&mut self) {
        self.client_signature.clear();
    }
}

/// The counterparty's recovered log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverResponse {
    pub message_type: String,
    pub session_id: String,
    /// Hash of the RecoverMessage this answers.
    pub hash_recover_message: String,
    pub recovered_logs: Vec<LocalLogEntry>,
    pub server_signature: String,
}

impl RecoverResponse {
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecoveryError> {
        Ok(Self::from_proto(&pb::RecoverResponse::decode(bytes)?))
    }

    pub fn to_proto(&self) -> pb::RecoverResponse {
        pb::RecoverResponse {
            message_type: self.message_type.clone(),
            session_id: self.session_id.clone(),
            hash_recover_message: self.hash_recover_message.clone(),
            recovered_logs: self.recovered_logs.iter().map(|l| l.to_proto()).collect(),
            server_signature: self.server_signature.clone(),
        }
    }

    pub fn from_proto(proto: &pb::RecoverResponse) -> Self {
        Self {
            message_type: proto.message_type.clone(),
            session_id: proto.session_id.clone(),
            hash_recover_message: proto.hash_recover_message.clone(),
            recovered_logs: proto
                .recovered_logs
                .iter()
                .map(LocalLogEntry::from_proto)
                .collect(),
            server_signature: proto.server_signature.clone(),
        }
    }
}

impl SignedMessage for RecoverResponse {
    fn client_signature(&self) -> &str {
        ""
    }
    fn server_signature(&self) -> &str {
        &self.server_signature
    }
    fn clear_signatures(&mut self) {
        self.server_signature.clear();
    }
}

/// Confirm that recovered entries were persisted and applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverSuccessMessage {
    pub message_type: String,
    pub session_id: String,
    /// Hash of the RecoverResponse whose entries were applied.
    pub hash_recover_update_message: String,
    pub success: bool,
    /// Sequence numbers of the entries that changed local state.
    pub entries_changed: Vec<u64>,
    pub client_signature: String,
}

impl RecoverSuccessMessage {
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecoveryError> {
        Ok(Self::from_proto(&pb::RecoverSuccessRequest::decode(bytes)?))
    }

    pub fn to_proto(&self) -> pb::RecoverSuccessRequest {
        pb::RecoverSuccessRequest {
            message_type: self.message_type.clone(),
            session_id: self.session_id.clone(),
            hash_recover_update_message: self.hash_recover_update_message.clone(),
            success: self.success,
            entries_changed: self.entries_changed.clone(),
            client_signature: self.client_signature.clone(),
        }
    }

    pub fn from_proto(proto: &pb::RecoverSuccessRequest) -> Self {
        Self {
            message_type: proto.message_type.clone(),
            session_id: proto.session_id.clone(),
            hash_recover_update_message: proto.hash_recover_update_message.clone(),
            success: proto.success,
            entries_changed: proto.entries_changed.clone(),
            client_signature: proto.client_signature.clone(),
        }
    }
}

impl SignedMessage for RecoverSuccessMessage {
    fn client_signature(&self) -> &str {
        &self.client_signature
    }
    fn server_signature(&self) -> &str {
        ""
    }
    fn clear_signatures(&mut self) {
        self.client_signature.clear();
    }
}

/// Acknowledgement of a RecoverSuccessMessage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverSuccessResponse {
    pub message_type: String,
    pub session_id: String,
    pub received: bool,
    pub server_signature: String,
}

impl RecoverSuccessResponse {
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecoveryError> {
        Ok(Self::from_proto(&pb::RecoverSuccessResponse::decode(bytes)?))
    }

    pub fn to_proto(&self) -> pb::RecoverSuccessResponse {
        pb::RecoverSuccessResponse {
            message_type: self.message_type.clone(),
            session_id: self.session_id.clone(),
            received: self.received,
            server_signature: self.server_signature.clone(),
        }
    }

    pub fn from_proto(proto: &pb::RecoverSuccessResponse) -> Self {
        Self {
            message_type: proto.message_type.clone(),
            session_id: proto.session_id.clone(),
            received: proto.received,
            server_signature: proto.server_signature.clone(),
        }
    }
}

impl SignedMessage for RecoverSuccessResponse {
    fn client_signature(&self) -> &str {
        ""
    }
    fn server_signature(&self) -> &str {
        &self.server_signature
    }
    fn clear_signatures(&mut self) {
        self.server_signature.clear();
    }
}

/// Report the compensating actions one side performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackMessage {
    pub message_type: String,
    pub session_id: String,
    pub success: bool,
    pub actions_performed: Vec<String>,
    pub proofs: Vec<String>,
    pub client_signature: String,
}

impl RollbackMessage {
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecoveryError> {
        Ok(Self::from_proto(&pb::RollbackRequest::decode(bytes)?))
    }

    pub fn to_proto(&self) -> pb::RollbackRequest {
        pb::RollbackRequest {
            message_type: self.message_type.clone(),
            session_id: self.session_id.clone(),
            success: self.success,
            actions_performed: self.actions_performed.clone(),
            proofs: self.proofs.clone(),
            client_signature: self.client_signature.clone(),
        }
    }

    pub fn from_proto(proto: &pb::RollbackRequest) -> Self {
        Self {
            message_type: proto.message_type.clone(),
            session_id: proto.session_id.clone(),
            success: proto.success,
            actions_performed: proto.actions_performed.clone(),
            proofs: proto.proofs.clone(),
            client_signature: proto.client_signature.clone(),
        }
    }
}

impl SignedMessage for RollbackMessage {
    fn client_signature(&self) -> &str {
        &self.client_signature
    }
    fn server_signature(&self) -> &str {
        ""
    }
    fn clear_signatures(&mut self) {
        self.client_signature.clear();
    }
}

/// The counterparty's own compensating actions, acknowledging a rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub message_type: String,
    pub session_id: String,
    pub success: bool,
    pub actions_performed: Vec<String>,
    pub proofs: Vec<String>,
    pub server_signature: String,
}

impl RollbackResponse {
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecoveryError> {
        Ok(Self::from_proto(&pb::RollbackResponse::decode(bytes)?))
    }

    pub fn to_proto(&self) -> pb::RollbackResponse {
        pb::RollbackResponse {
            message_type: self.message_type.clone(),
            session_id: self.session_id.clone(),
            success: self.success,
            actions_performed: self.actions_performed.clone(),
            proofs: self.proofs.clone(),
            server_signature: self.server_signature.clone(),
        }
    }

    pub fn from_proto(proto: &pb::RollbackResponse) -> Self {
        Self {
            message_type: proto.message_type.clone(),
            session_id: proto.session_id.clone(),
            success: proto.success,
            actions_performed: proto.actions_performed.clone(),
            proofs: proto.proofs.clone(),
            server_signature: proto.server_signature.clone(),
        }
    }
}

impl SignedMessage for RollbackResponse {
    fn client_signature(&self) -> &str {
        ""
    }
    fn server_signature(&self) -> &str {
        &self.server_signature
    }
    fn clear_signatures(&mut self) {
        self.server_signature.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{satp_log_key, OPERATION_DONE};

    fn log_entry() -> LocalLogEntry {
        LocalLogEntry {
            session_id: "s1".into(),
            entry_type: "stage1".into(),
            key: satp_log_key("s1", "stage1", OPERATION_DONE),
            operation: OPERATION_DONE.into(),
            timestamp: 1234,
            data: r#"{"id":"s1"}"#.into(),
            sequence_number: 2,
        }
    }

    #[test]
    fn test_recover_message_wire_roundtrip() {
        let msg = RecoverMessage {
            message_type: RECOVER_MSG_URN.into(),
            session_id: "s1".into(),
            satp_phase: 1,
            sequence_number: 2,
            is_backup: false,
            last_entry_timestamp: 99,
            client_signature: "sig".into(),
        };
        let decoded = RecoverMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_recover_response_carries_logs() {
        let msg = RecoverResponse {
            message_type: RECOVER_UPDATE_MSG_URN.into(),
            session_id: "s1".into(),
            hash_recover_message: "h".into(),
            recovered_logs: vec![log_entry()],
            server_signature: "sig".into(),
        };
        let decoded = RecoverResponse::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.recovered_logs.len(), 1);
        assert_eq!(decoded.recovered_logs[0].sequence_number, 2);
    }

    #[test]
    fn test_rollback_message_wire_roundtrip() {
        let msg = RollbackMessage {
            message_type: ROLLBACK_MSG_URN.into(),
            session_id: "s1".into(),
            success: true,
            actions_performed: vec!["unlock-asset".into()],
            proofs: vec!["proof-1".into()],
            client_signature: "sig".into(),
        };
        let decoded = RollbackMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_signature_blanking() {
        let mut msg = RecoverMessage {
            message_type: RECOVER_MSG_URN.into(),
            session_id: "s1".into(),
            satp_phase: 0,
            sequence_number: 1,
            is_backup: false,
            last_entry_timestamp: 0,
            client_signature: "sig".into(),
        };
        assert_eq!(msg.client_signature(), "sig");
        assert_eq!(msg.server_signature(), "");
        msg.clear_signatures();
        assert_eq!(msg.client_signature(), "");
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(RecoverMessage::decode(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
