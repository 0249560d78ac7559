use serde::{Deserialize, Serialize};

use crate::message::MessageType;

/// Closed classification of protocol failures.
///
/// Stored on a session's `error_code` when a side is marked `Error`, so the
/// counterparty and operators can discriminate the failure cause without
/// parsing error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    SessionNotFound,
    SessionDataNotLoaded,
    SessionCompleted,
    CommonBody,
    SatpVersion,
    ClientGatewayPubkey,
    ServerGatewayPubkey,
    SequenceNumber,
    TransferContext,
    ResourceUrl,
    MessageType,
    HashChain,
    SignatureMissing,
    SignatureVerification,
    UnsupportedNetwork,
    NoLogsFound,
    LogRepository,
    StateTransition,
}

/// Core protocol errors.
///
/// Checks in the stage verifier are independent, never merged: each violated
/// clause raises its own variant so callers can discriminate the failure
/// cause and pick the right session side to mark as errored.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SatpError {
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("{side} session data not loaded")]
    SessionDataNotLoaded { side: &'static str },

    #[error("session already completed, no further mutation allowed")]
    SessionCompleted,

    #[error("common body missing or empty field: {field}")]
    CommonBodyMissing { field: &'static str },

    #[error("SATP version mismatch: expected {expected}, got {actual}")]
    SatpVersionMismatch { expected: String, actual: String },

    #[error("client gateway pubkey does not match session")]
    ClientGatewayPubkeyMismatch,

    #[error("server gateway pubkey does not match session")]
    ServerGatewayPubkeyMismatch,

    #[error("sequence number mismatch: expected {expected}, got {actual}")]
    SequenceNumberMismatch { expected: u64, actual: u64 },

    #[error("transfer context mismatch: expected {expected}, got {actual}")]
    TransferContextMismatch { expected: String, actual: String },

    #[error("resource URL does not match session")]
    ResourceUrlMismatch,

    #[error("unexpected message type {actual}, expected {expected}")]
    UnexpectedMessageType {
        actual: MessageType,
        expected: MessageType,
        alt_expected: Option<MessageType>,
    },

    #[error("hash chain mismatch: expected {expected}, got {actual}")]
    HashChainMismatch { expected: String, actual: String },

    #[error("message carries no usable signature")]
    SignatureMissing,

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("unsupported ledger pairing: {origin} -> {destination}")]
    UnsupportedNetwork {
        origin: String,
        destination: String,
    },

    #[error("no log entries found for session {session_id}")]
    NoLogsFound { session_id: String },

    #[error("log repository unavailable: {0}")]
    LogRepository(String),

    #[error("invalid session state transition from {from} to {to}")]
    StateTransition { from: String, to: String },
}

impl SatpError {
    /// Map to the closed error classification.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::SessionNotFound { .. } => ErrorType::SessionNotFound,
            Self::SessionDataNotLoaded { .. } => ErrorType::SessionDataNotLoaded,
            Self::SessionCompleted => ErrorType::SessionCompleted,
            Self::CommonBodyMissing { .. } => ErrorType::CommonBody,
            Self::SatpVersionMismatch { .. } => ErrorType::SatpVersion,
            Self::ClientGatewayPubkeyMismatch => ErrorType::ClientGatewayPubkey,
            Self::ServerGatewayPubkeyMismatch => ErrorType::ServerGatewayPubkey,
            Self::SequenceNumberMismatch { .. } => ErrorType::SequenceNumber,
            Self::TransferContextMismatch { .. } => ErrorType::TransferContext,
            Self::ResourceUrlMismatch => ErrorType::ResourceUrl,
            Self::UnexpectedMessageType { .. } => ErrorType::MessageType,
            Self::HashChainMismatch { .. } => ErrorType::HashChain,
            Self::SignatureMissing => ErrorType::SignatureMissing,
            Self::SignatureVerification => ErrorType::SignatureVerification,
            Self::UnsupportedNetwork { .. } => ErrorType::UnsupportedNetwork,
            Self::NoLogsFound { .. } => ErrorType::NoLogsFound,
            Self::LogRepository(_) => ErrorType::LogRepository,
            Self::StateTransition { .. } => ErrorType::StateTransition,
        }
    }

    /// HTTP-style status class for this error.
    ///
    /// Protocol violations are 400-class and never retried; infrastructure
    /// failures are 500-class and left for the next scheduled tick.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound { .. } | Self::NoLogsFound { .. } => 404,
            Self::LogRepository(_) => 500,
            _ => 400,
        }
    }

    /// Whether this failure is a protocol violation (never auto-retried) as
    /// opposed to a transient infrastructure fault.
    pub fn is_protocol_violation(&self) -> bool {
        self.status_code() < 500
    }
}
