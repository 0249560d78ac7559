use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version accepted by this gateway.
pub const SATP_VERSION: &str = "v02";

/// The four sequential protocol phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Session setup.
    Stage0,
    /// Proposal and commence.
    Stage1,
    /// Lock assertion.
    Stage2,
    /// Commit and complete.
    Stage3,
}

impl Stage {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Stage0 => 0,
            Self::Stage1 => 1,
            Self::Stage2 => 2,
            Self::Stage3 => 3,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Stage0),
            1 => Some(Self::Stage1),
            2 => Some(Self::Stage2),
            3 => Some(Self::Stage3),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage{}", self.as_u32())
    }
}

/// The closed set of SATP protocol message types, partitioned into 4 stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Stage 0
    NewSessionRequest,
    NewSessionResponse,
    PreTransferRequest,
    PreTransferResponse,
    // Stage 1
    InitProposal,
    InitReceipt,
    InitReject,
    TransferCommenceRequest,
    TransferCommenceResponse,
    // Stage 2
    LockAssert,
    AssertionReceipt,
    // Stage 3
    CommitPrepare,
    CommitReady,
    CommitFinal,
    AckCommitFinal,
    TransferComplete,
    TransferCompleteResponse,
}

impl MessageType {
    /// The stage this message type belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::NewSessionRequest
            | Self::NewSessionResponse
            | Self::PreTransferRequest
            | Self::PreTransferResponse => Stage::Stage0,
            Self::InitProposal
            | Self::InitReceipt
            | Self::InitReject
            | Self::TransferCommenceRequest
            | Self::TransferCommenceResponse => Stage::Stage1,
            Self::LockAssert | Self::AssertionReceipt => Stage::Stage2,
            Self::CommitPrepare
            | Self::CommitReady
            | Self::CommitFinal
            | Self::AckCommitFinal
            | Self::TransferComplete
            | Self::TransferCompleteResponse => Stage::Stage3,
        }
    }

    /// The unique causal predecessor of this message type.
    ///
    /// `NewSessionRequest` opens the protocol and has none. The only branch
    /// is into `TransferCommenceRequest`: its predecessor is `InitReject`
    /// when a reject was recorded, `InitReceipt` otherwise.
    pub fn predecessor(&self, reject_recorded: bool) -> Option<MessageType> {
        match self {
            Self::NewSessionRequest => None,
            Self::NewSessionResponse => Some(Self::NewSessionRequest),
            Self::PreTransferRequest => Some(Self::NewSessionResponse),
            Self::PreTransferResponse => Some(Self::PreTransferRequest),
            Self::InitProposal => Some(Self::PreTransferResponse),
            Self::InitReceipt => Some(Self::InitProposal),
            Self::InitReject => Some(Self::InitProposal),
            Self::TransferCommenceRequest => {
                if reject_recorded {
                    Some(Self::InitReject)
                } else {
                    Some(Self::InitReceipt)
                }
            }
            Self::TransferCommenceResponse => Some(Self::TransferCommenceRequest),
            Self::LockAssert => Some(Self::TransferCommenceResponse),
            Self::AssertionReceipt => Some(Self::LockAssert),
            Self::CommitPrepare => Some(Self::AssertionReceipt),
            Self::CommitReady => Some(Self::CommitPrepare),
            Self::CommitFinal => Some(Self::CommitReady),
            Self::AckCommitFinal => Some(Self::CommitFinal),
            Self::TransferComplete => Some(Self::AckCommitFinal),
            Self::TransferCompleteResponse => Some(Self::TransferComplete),
        }
    }

    /// Which role authors this message type.
    ///
    /// Requests and assertions originate from the client gateway; receipts,
    /// responses and acks from the server gateway. Drives the session side
    /// selection when recording verification errors.
    pub fn author(&self) -> crate::types::Role {
        use crate::types::Role;
        match self {
            Self::NewSessionRequest
            | Self::PreTransferRequest
            | Self::InitProposal
            | Self::TransferCommenceRequest
            | Self::LockAssert
            | Self::CommitPrepare
            | Self::CommitFinal
            | Self::TransferComplete => Role::Client,
            Self::NewSessionResponse
            | Self::PreTransferResponse
            | Self::InitReceipt
            | Self::InitReject
            | Self::TransferCommenceResponse
            | Self::AssertionReceipt
            | Self::CommitReady
            | Self::AckCommitFinal
            | Self::TransferCompleteResponse => Role::Server,
        }
    }

    /// The IETF URN identifying this message type on the wire.
    pub fn urn(&self) -> &'static str {
        match self {
            Self::NewSessionRequest => "urn:ietf:SATP-2pc:msgtype:new-session-request-msg",
            Self::NewSessionResponse => "urn:ietf:SATP-2pc:msgtype:new-session-response-msg",
            Self::PreTransferRequest => "urn:ietf:SATP-2pc:msgtype:pre-transfer-request-msg",
            Self::PreTransferResponse => "urn:ietf:SATP-2pc:msgtype:pre-transfer-response-msg",
            Self::InitProposal => "urn:ietf:SATP-2pc:msgtype:init-proposal-msg",
            Self::InitReceipt => "urn:ietf:SATP-2pc:msgtype:init-receipt-msg",
            Self::InitReject => "urn:ietf:SATP-2pc:msgtype:init-reject-msg",
            Self::TransferCommenceRequest => {
                "urn:ietf:SATP-2pc:msgtype:transfer-commence-request-msg"
            }
            Self::TransferCommenceResponse => {
                "urn:ietf:SATP-2pc:msgtype:transfer-commence-response-msg"
            }
            Self::LockAssert => "urn:ietf:SATP-2pc:msgtype:lock-assert-msg",
            Self::AssertionReceipt => "urn:ietf:SATP-2pc:msgtype:assertion-receipt-msg",
            Self::CommitPrepare => "urn:ietf:SATP-2pc:msgtype:commit-prepare-msg",
            Self::CommitReady => "urn:ietf:SATP-2pc:msgtype:commit-ready-msg",
            Self::CommitFinal => "urn:ietf:SATP-2pc:msgtype:commit-final-msg",
            Self::AckCommitFinal => "urn:ietf:SATP-2pc:msgtype:ack-commit-final-msg",
            Self::TransferComplete => "urn:ietf:SATP-2pc:msgtype:transfer-complete-msg",
            Self::TransferCompleteResponse => {
                "urn:ietf:SATP-2pc:msgtype:transfer-complete-response-msg"
            }
        }
    }

    /// All message types in causal order.
    pub fn all() -> &'static [MessageType] {
        &[
            Self::NewSessionRequest,
            Self::NewSessionResponse,
            Self::PreTransferRequest,
            Self::PreTransferResponse,
            Self::InitProposal,
            Self::InitReceipt,
            Self::InitReject,
            Self::TransferCommenceRequest,
            Self::TransferCommenceResponse,
            Self::LockAssert,
            Self::AssertionReceipt,
            Self::CommitPrepare,
            Self::CommitReady,
            Self::CommitFinal,
            Self::AckCommitFinal,
            Self::TransferComplete,
            Self::TransferCompleteResponse,
        ]
    }
}

impl fmt::Display for MessageType {
    // Display matches the variant name; the URN is the wire identity.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The common envelope carried by every SATP protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonBody {
    /// Protocol version, must equal [`SATP_VERSION`].
    pub version: String,
    pub message_type: MessageType,
    pub session_id: String,
    /// Strictly increasing per session; accepted iff last + 1.
    pub sequence_number: u64,
    pub transfer_context_id: String,
    pub resource_url: String,
    pub client_gateway_pubkey: String,
    pub server_gateway_pubkey: String,
    /// Hash of the protocol-defined predecessor message; empty only for the
    /// very first message of the protocol.
    pub hash_previous_message: String,
}
