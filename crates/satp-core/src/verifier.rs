//! Stage verifier: structural and integrity validation of inbound protocol
//! envelopes against session state.
//!
//! Cryptographic signature verification lives in `satp-crypto` (it needs the
//! key machinery); everything here is pure comparison against the session,
//! with one distinct error per violated clause.

use serde::Serialize;

use crate::error::SatpError;
use crate::message::{CommonBody, MessageType, SATP_VERSION};
use crate::session::SessionData;

/// A wire message carrying at most one populated signature field.
///
/// Canonicalization for signing blanks the populated field and serializes
/// the rest with stable JSON; implementors must clear *all* signature fields
/// in `clear_signatures` so the canonical bytes are signature-free.
pub trait SignedMessage: Serialize + Clone {
    fn client_signature(&self) -> &str;
    fn server_signature(&self) -> &str;
    fn clear_signatures(&mut self);
}

/// Validate the common envelope of an inbound message against session state.
///
/// Checks run in order, each raising its own error so callers can
/// discriminate the failure cause: field presence, protocol version, both
/// gateway pubkeys, sequence number (`last + 1`), transfer context, resource
/// URL, message type (primary or alternative), and finally the
/// hash-of-predecessor chain. The hash-of-predecessor field is required for
/// every message except the very first of the protocol.
pub fn common_body_verifier(
    common: &CommonBody,
    session_data: &SessionData,
    expected_type: MessageType,
    alt_expected_type: Option<MessageType>,
) -> Result<(), SatpError> {
    if common.version.is_empty() {
        return Err(SatpError::CommonBodyMissing { field: "version" });
    }
    if common.session_id.is_empty() {
        return Err(SatpError::CommonBodyMissing { field: "session_id" });
    }
    if common.resource_url.is_empty() {
        return Err(SatpError::CommonBodyMissing {
            field: "resource_url",
        });
    }
    if common.client_gateway_pubkey.is_empty() {
        return Err(SatpError::CommonBodyMissing {
            field: "client_gateway_pubkey",
        });
    }
    if common.server_gateway_pubkey.is_empty() {
        return Err(SatpError::CommonBodyMissing {
            field: "server_gateway_pubkey",
        });
    }
    if common.hash_previous_message.is_empty()
        && expected_type != MessageType::NewSessionRequest
    {
        return Err(SatpError::CommonBodyMissing {
            field: "hash_previous_message",
        });
    }

    if common.version != SATP_VERSION {
        return Err(SatpError::SatpVersionMismatch {
            expected: SATP_VERSION.to_string(),
            actual: common.version.clone(),
        });
    }

    if common.server_gateway_pubkey != session_data.server_gateway_pubkey {
        return Err(SatpError::ServerGatewayPubkeyMismatch);
    }

    if common.client_gateway_pubkey != session_data.client_gateway_pubkey {
        return Err(SatpError::ClientGatewayPubkeyMismatch);
    }

    if common.sequence_number != session_data.last_sequence_number + 1 {
        return Err(SatpError::SequenceNumberMismatch {
            expected: session_data.last_sequence_number + 1,
            actual: common.sequence_number,
        });
    }

    if common.transfer_context_id != session_data.transfer_context_id {
        return Err(SatpError::TransferContextMismatch {
            expected: session_data.transfer_context_id.clone(),
            actual: common.transfer_context_id.clone(),
        });
    }

    if common.resource_url != session_data.resource_url {
        return Err(SatpError::ResourceUrlMismatch);
    }

    if common.message_type != expected_type && Some(common.message_type) != alt_expected_type {
        return Err(SatpError::UnexpectedMessageType {
            actual: common.message_type,
            expected: expected_type,
            alt_expected: alt_expected_type,
        });
    }

    verify_hash_chain(common, session_data, expected_type)
}

/// The hash-of-predecessor of message N must equal the stored hash of the
/// protocol-defined predecessor of N's type.
fn verify_hash_chain(
    common: &CommonBody,
    session_data: &SessionData,
    expected_type: MessageType,
) -> Result<(), SatpError> {
    let reject_recorded = session_data.hashes.is_set(MessageType::InitReject);
    let Some(predecessor) = expected_type.predecessor(reject_recorded) else {
        // Protocol-opening message: nothing to chain against.
        return Ok(());
    };

    let stored = session_data
        .hashes
        .get(predecessor)
        .cloned()
        .unwrap_or_default();

    if common.hash_previous_message != stored {
        return Err(SatpError::HashChainMismatch {
            expected: stored,
            actual: common.hash_previous_message.clone(),
        });
    }
    Ok(())
}
