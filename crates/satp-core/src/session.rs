use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorType, SatpError};
use crate::message::{MessageType, Stage, SATP_VERSION};
use crate::types::{Asset, NetworkId, Role};

/// The states of a session side's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Transfer in progress, advanced message by message.
    Ongoing,
    /// Transfer finished. Final state: the session is immutable.
    Completed,
    /// A verification or processing failure was recorded.
    Error,
    /// The counterparty rejected the transfer. Final state.
    Rejected,
    /// Crash detected, recovery exchange in flight.
    Recovering,
    /// Session state resynchronized from the counterparty's logs.
    Recovered,
}

impl SessionState {
    /// Whether this is a final state admitting no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Attempt a state transition.
    ///
    /// Valid transitions:
    /// - Ongoing → Completed | Error | Rejected | Recovering
    /// - Error → Recovering
    /// - Recovering → Recovered | Error
    /// - Recovered → Ongoing | Completed | Error | Recovering
    pub fn transition(self, next: SessionState) -> Result<SessionState, SatpError> {
        if self == Self::Completed {
            return Err(SatpError::SessionCompleted);
        }
        let ok = matches!(
            (self, next),
            (Self::Ongoing, Self::Completed)
                | (Self::Ongoing, Self::Error)
                | (Self::Ongoing, Self::Rejected)
                | (Self::Ongoing, Self::Recovering)
                | (Self::Error, Self::Recovering)
                | (Self::Recovering, Self::Recovered)
                | (Self::Recovering, Self::Error)
                | (Self::Recovered, Self::Ongoing)
                | (Self::Recovered, Self::Completed)
                | (Self::Recovered, Self::Error)
                | (Self::Recovered, Self::Recovering)
        );
        if !ok {
            return Err(SatpError::StateTransition {
                from: format!("{}", self),
                to: format!("{}", next),
            });
        }
        tracing::debug!(from = %self, to = %next, "session state transition");
        Ok(next)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ongoing => "ONGOING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Rejected => "REJECTED",
            Self::Recovering => "RECOVERING",
            Self::Recovered => "RECOVERED",
        };
        write!(f, "{}", name)
    }
}

/// Stage 0 message slots: session setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage0Slots<T> {
    pub new_session_request: Option<T>,
    pub new_session_response: Option<T>,
    pub pre_transfer_request: Option<T>,
    pub pre_transfer_response: Option<T>,
}

/// Stage 1 message slots: proposal and commence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Slots<T> {
    pub transfer_proposal_request: Option<T>,
    pub transfer_proposal_receipt: Option<T>,
    pub transfer_proposal_reject: Option<T>,
    pub transfer_commence_request: Option<T>,
    pub transfer_commence_response: Option<T>,
}

/// Stage 2 message slots: lock assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Slots<T> {
    pub lock_assertion_request: Option<T>,
    pub lock_assertion_receipt: Option<T>,
}

/// Stage 3 message slots: commit and complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage3Slots<T> {
    pub commit_preparation_request: Option<T>,
    pub commit_ready_response: Option<T>,
    pub commit_final_assertion_request: Option<T>,
    pub commit_final_ack_response: Option<T>,
    pub transfer_complete: Option<T>,
    pub transfer_complete_response: Option<T>,
}

// Manual Default impls: the derive would demand `T: Default` even though
// every field is an Option.
impl<T> Default for Stage0Slots<T> {
    fn default() -> Self {
        Self {
            new_session_request: None,
            new_session_response: None,
            pre_transfer_request: None,
            pre_transfer_response: None,
        }
    }
}

impl<T> Default for Stage1Slots<T> {
    fn default() -> Self {
        Self {
            transfer_proposal_request: None,
            transfer_proposal_receipt: None,
            transfer_proposal_reject: None,
            transfer_commence_request: None,
            transfer_commence_response: None,
        }
    }
}

impl<T> Default for Stage2Slots<T> {
    fn default() -> Self {
        Self {
            lock_assertion_request: None,
            lock_assertion_receipt: None,
        }
    }
}

impl<T> Default for Stage3Slots<T> {
    fn default() -> Self {
        Self {
            commit_preparation_request: None,
            commit_ready_response: None,
            commit_final_assertion_request: None,
            commit_final_ack_response: None,
            transfer_complete: None,
            transfer_complete_response: None,
        }
    }
}

/// One value slot per protocol message, partitioned by stage.
///
/// A session keeps four of these: message hashes, signatures, processed
/// timestamps, and received timestamps. Access goes through the exhaustive
/// `get`/`set` accessors keyed on [`MessageType`], so adding a message type
/// fails to compile until every record kind handles it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStageRecords<T> {
    pub stage0: Stage0Slots<T>,
    pub stage1: Stage1Slots<T>,
    pub stage2: Stage2Slots<T>,
    pub stage3: Stage3Slots<T>,
}

impl<T> MessageStageRecords<T> {
    /// Read the slot for the given message type.
    pub fn get(&self, message_type: MessageType) -> Option<&T> {
        match message_type {
            MessageType::NewSessionRequest => self.stage0.new_session_request.as_ref(),
            MessageType::NewSessionResponse => self.stage0.new_session_response.as_ref(),
            MessageType::PreTransferRequest => self.stage0.pre_transfer_request.as_ref(),
            MessageType::PreTransferResponse => self.stage0.pre_transfer_response.as_ref(),
            MessageType::InitProposal => self.stage1.transfer_proposal_request.as_ref(),
            MessageType::InitReceipt => self.stage1.transfer_proposal_receipt.as_ref(),
            MessageType::InitReject => self.stage1.transfer_proposal_reject.as_ref(),
            MessageType::TransferCommenceRequest => {
                self.stage1.transfer_commence_request.as_ref()
            }
            MessageType::TransferCommenceResponse => {
                self.stage1.transfer_commence_response.as_ref()
            }
            MessageType::LockAssert => self.stage2.lock_assertion_request.as_ref(),
            MessageType::AssertionReceipt => self.stage2.lock_assertion_receipt.as_ref(),
            MessageType::CommitPrepare => self.stage3.commit_preparation_request.as_ref(),
            MessageType::CommitReady => self.stage3.commit_ready_response.as_ref(),
            MessageType::CommitFinal => self.stage3.commit_final_assertion_request.as_ref(),
            MessageType::AckCommitFinal => self.stage3.commit_final_ack_response.as_ref(),
            MessageType::TransferComplete => self.stage3.transfer_complete.as_ref(),
            MessageType::TransferCompleteResponse => {
                self.stage3.transfer_complete_response.as_ref()
            }
        }
    }

    /// Write the slot for the given message type.
    pub fn set(&mut self, message_type: MessageType, value: T) {
        let slot = match message_type {
            MessageType::NewSessionRequest => &mut self.stage0.new_session_request,
            MessageType::NewSessionResponse => &mut self.stage0.new_session_response,
            MessageType::PreTransferRequest => &mut self.stage0.pre_transfer_request,
            MessageType::PreTransferResponse => &mut self.stage0.pre_transfer_response,
            MessageType::InitProposal => &mut self.stage1.transfer_proposal_request,
            MessageType::InitReceipt => &mut self.stage1.transfer_proposal_receipt,
            MessageType::InitReject => &mut self.stage1.transfer_proposal_reject,
            MessageType::TransferCommenceRequest => &mut self.stage1.transfer_commence_request,
            MessageType::TransferCommenceResponse => {
                &mut self.stage1.transfer_commence_response
            }
            MessageType::LockAssert => &mut self.stage2.lock_assertion_request,
            MessageType::AssertionReceipt => &mut self.stage2.lock_assertion_receipt,
            MessageType::CommitPrepare => &mut self.stage3.commit_preparation_request,
            MessageType::CommitReady => &mut self.stage3.commit_ready_response,
            MessageType::CommitFinal => &mut self.stage3.commit_final_assertion_request,
            MessageType::AckCommitFinal => &mut self.stage3.commit_final_ack_response,
            MessageType::TransferComplete => &mut self.stage3.transfer_complete,
            MessageType::TransferCompleteResponse => {
                &mut self.stage3.transfer_complete_response
            }
        };
        *slot = Some(value);
    }

    /// Whether the slot for the given message type is populated.
    pub fn is_set(&self, message_type: MessageType) -> bool {
        self.get(message_type).is_some()
    }
}

/// Default number of recovery attempts before escalating to rollback.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default session timeout before a stalled "done" log forces rollback.
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 30_000;

/// One role's view of a transfer's protocol state.
///
/// A session holds a client-side and/or a server-side instance; the two
/// sides must reach identical stage artifacts for any stage both completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    pub version: String,
    pub transfer_context_id: String,
    pub role: Role,
    pub state: SessionState,
    /// Monotonic counter; increases by exactly 1 per accepted inbound message.
    pub last_sequence_number: u64,
    pub max_retries: u32,
    pub max_timeout_ms: u64,
    pub client_gateway_pubkey: String,
    pub server_gateway_pubkey: String,
    pub sender_gateway_network_id: Option<NetworkId>,
    pub recipient_gateway_network_id: Option<NetworkId>,
    pub resource_url: String,
    pub hashes: MessageStageRecords<String>,
    pub signatures: MessageStageRecords<String>,
    pub processed_timestamps: MessageStageRecords<u64>,
    pub received_timestamps: MessageStageRecords<u64>,
    pub sender_asset: Option<Asset>,
    pub receiver_asset: Option<Asset>,
    /// Set only when `state == Error`.
    pub error_code: Option<ErrorType>,
    /// The message type being processed when the error was recorded.
    pub phase_error: Option<MessageType>,
}

impl SessionData {
    pub fn new(id: impl Into<String>, transfer_context_id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            version: SATP_VERSION.to_string(),
            transfer_context_id: transfer_context_id.into(),
            role,
            state: SessionState::Ongoing,
            last_sequence_number: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
            client_gateway_pubkey: String::new(),
            server_gateway_pubkey: String::new(),
            sender_gateway_network_id: None,
            recipient_gateway_network_id: None,
            resource_url: String::new(),
            hashes: MessageStageRecords::default(),
            signatures: MessageStageRecords::default(),
            processed_timestamps: MessageStageRecords::default(),
            received_timestamps: MessageStageRecords::default(),
            sender_asset: None,
            receiver_asset: None,
            error_code: None,
            phase_error: None,
        }
    }

    /// The stored pubkey of this side's counterparty gateway.
    pub fn counterparty_pubkey(&self) -> &str {
        match self.role {
            Role::Client => &self.server_gateway_pubkey,
            Role::Server => &self.client_gateway_pubkey,
        }
    }

    /// The last message type with a recorded hash, in causal order, together
    /// with its stage. `None` before any message was recorded.
    pub fn current_stage(&self) -> Option<(Stage, MessageType)> {
        let mut last = None;
        for mt in MessageType::all() {
            if self.hashes.is_set(*mt) {
                last = Some((mt.stage(), *mt));
            }
        }
        last
    }

    /// The first stage whose required artifacts are incomplete, i.e. where a
    /// crash would have interrupted the protocol. `None` when every stage is
    /// complete.
    pub fn crashed_stage(&self) -> Option<Stage> {
        let h = &self.hashes;
        let stage0_done = h.is_set(MessageType::NewSessionRequest)
            && h.is_set(MessageType::NewSessionResponse)
            && h.is_set(MessageType::PreTransferRequest)
            && h.is_set(MessageType::PreTransferResponse);
        if !stage0_done {
            return Some(Stage::Stage0);
        }
        let stage1_done = h.is_set(MessageType::InitProposal)
            && (h.is_set(MessageType::InitReceipt) || h.is_set(MessageType::InitReject))
            && h.is_set(MessageType::TransferCommenceRequest)
            && h.is_set(MessageType::TransferCommenceResponse);
        if !stage1_done {
            return Some(Stage::Stage1);
        }
        let stage2_done =
            h.is_set(MessageType::LockAssert) && h.is_set(MessageType::AssertionReceipt);
        if !stage2_done {
            return Some(Stage::Stage2);
        }
        let stage3_done = h.is_set(MessageType::CommitPrepare)
            && h.is_set(MessageType::CommitReady)
            && h.is_set(MessageType::CommitFinal)
            && h.is_set(MessageType::AckCommitFinal)
            && h.is_set(MessageType::TransferComplete)
            && h.is_set(MessageType::TransferCompleteResponse);
        if !stage3_done {
            return Some(Stage::Stage3);
        }
        None
    }
}

/// A transfer session, holding at most one client and/or one server
/// [`SessionData`], selected at construction by role flags.
#[derive(Debug, Clone)]
pub struct SatpSession {
    client_session_data: Option<SessionData>,
    server_session_data: Option<SessionData>,
}

impl SatpSession {
    /// Create a session for the given roles.
    ///
    /// At least one of `client`/`server` must be set. The session id is
    /// derived from the transfer context unless explicitly provided.
    pub fn new(
        transfer_context_id: &str,
        session_id: Option<String>,
        client: bool,
        server: bool,
    ) -> Result<Self, SatpError> {
        if !client && !server {
            return Err(SatpError::SessionDataNotLoaded { side: "any" });
        }
        let id = session_id
            .unwrap_or_else(|| format!("{}-{}", uuid::Uuid::now_v7(), transfer_context_id));

        let make = |role| SessionData::new(id.clone(), transfer_context_id, role);

        Ok(Self {
            client_session_data: client.then(|| make(Role::Client)),
            server_session_data: server.then(|| make(Role::Server)),
        })
    }

    /// Reconstruct a session from a persisted snapshot.
    ///
    /// Used only during recovery: hydrates state fields as-is, never re-runs
    /// the stage verifier.
    pub fn recreate(snapshot: SessionData) -> Self {
        match snapshot.role {
            Role::Client => Self {
                client_session_data: Some(snapshot),
                server_session_data: None,
            },
            Role::Server => Self {
                client_session_data: None,
                server_session_data: Some(snapshot),
            },
        }
    }

    /// Create the missing side of an existing session.
    pub fn create_session_data(
        &mut self,
        role: Role,
        session_id: &str,
        transfer_context_id: &str,
    ) -> Result<(), SatpError> {
        let slot = match role {
            Role::Client => &mut self.client_session_data,
            Role::Server => &mut self.server_session_data,
        };
        if slot.is_some() {
            return Err(SatpError::StateTransition {
                from: format!("{} side already present", role),
                to: "created".into(),
            });
        }
        *slot = Some(SessionData::new(session_id, transfer_context_id, role));
        Ok(())
    }

    pub fn get_client_session_data(&self) -> Result<&SessionData, SatpError> {
        self.client_session_data
            .as_ref()
            .ok_or(SatpError::SessionDataNotLoaded { side: "client" })
    }

    pub fn get_server_session_data(&self) -> Result<&SessionData, SatpError> {
        self.server_session_data
            .as_ref()
            .ok_or(SatpError::SessionDataNotLoaded { side: "server" })
    }

    pub fn get_client_session_data_mut(&mut self) -> Result<&mut SessionData, SatpError> {
        self.client_session_data
            .as_mut()
            .ok_or(SatpError::SessionDataNotLoaded { side: "client" })
    }

    pub fn get_server_session_data_mut(&mut self) -> Result<&mut SessionData, SatpError> {
        self.server_session_data
            .as_mut()
            .ok_or(SatpError::SessionDataNotLoaded { side: "server" })
    }

    pub fn has_client_session_data(&self) -> bool {
        self.client_session_data.is_some()
    }

    pub fn has_server_session_data(&self) -> bool {
        self.server_session_data.is_some()
    }

    pub fn session_id(&self) -> String {
        self.server_session_data
            .as_ref()
            .or(self.client_session_data.as_ref())
            .map(|d| d.id.clone())
            .unwrap_or_default()
    }

    /// Record a verification failure on the side that authored the message.
    pub fn set_error(&mut self, stage_message: MessageType, error: &SatpError) {
        self.record_error(stage_message.author(), stage_message, error);
    }

    /// Record a verification failure on the side that was *checking* the
    /// message, i.e. the counterpart of its author.
    pub fn set_error_checking(&mut self, stage_message: MessageType, error: &SatpError) {
        self.record_error(stage_message.author().opposite(), stage_message, error);
    }

    fn record_error(&mut self, side: Role, stage_message: MessageType, error: &SatpError) {
        let data = match side {
            Role::Client => self.client_session_data.as_mut(),
            Role::Server => self.server_session_data.as_mut(),
        };
        match data {
            Some(data) => {
                data.state = SessionState::Error;
                data.error_code = Some(error.error_type());
                data.phase_error = Some(stage_message);
            }
            None => {
                tracing::warn!(
                    session_id = %self.session_id(),
                    %side,
                    ?stage_message,
                    "cannot record error: session side not loaded"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_hashes(upto: &[MessageType]) -> SessionData {
        let mut data = SessionData::new("s1", "ctx1", Role::Client);
        for (i, mt) in upto.iter().enumerate() {
            data.hashes.set(*mt, format!("h{}", i + 1));
        }
        data
    }

    #[test]
    fn test_state_happy_path() {
        let state = SessionState::Ongoing;
        let state = state.transition(SessionState::Completed).unwrap();
        assert_eq!(state, SessionState::Completed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_state_recovery_path() {
        let state = SessionState::Ongoing
            .transition(SessionState::Recovering)
            .unwrap();
        let state = state.transition(SessionState::Recovered).unwrap();
        assert_eq!(state, SessionState::Recovered);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_completed_is_immutable() {
        for next in [
            SessionState::Ongoing,
            SessionState::Error,
            SessionState::Recovering,
        ] {
            let result = SessionState::Completed.transition(next);
            assert!(matches!(result, Err(SatpError::SessionCompleted)));
        }
    }

    #[test]
    fn test_rejected_is_terminal() {
        let result = SessionState::Rejected.transition(SessionState::Recovering);
        assert!(result.is_err());
    }

    #[test]
    fn test_errored_session_can_recover() {
        let state = SessionState::Error
            .transition(SessionState::Recovering)
            .unwrap();
        assert_eq!(state, SessionState::Recovering);
    }

    #[test]
    fn test_records_get_set_all_types() {
        let mut records = MessageStageRecords::<String>::default();
        for (i, mt) in MessageType::all().iter().enumerate() {
            assert!(records.get(*mt).is_none());
            records.set(*mt, format!("h{}", i));
            assert_eq!(records.get(*mt), Some(&format!("h{}", i)));
        }
    }

    #[test]
    fn test_records_slots_are_distinct() {
        let mut records = MessageStageRecords::<String>::default();
        records.set(MessageType::InitProposal, "h1".into());
        assert!(records.is_set(MessageType::InitProposal));
        assert!(!records.is_set(MessageType::InitReceipt));
        assert!(!records.is_set(MessageType::CommitPrepare));
    }

    #[test]
    fn test_session_requires_a_role() {
        assert!(SatpSession::new("ctx", None, false, false).is_err());
    }

    #[test]
    fn test_session_side_selection() {
        let session = SatpSession::new("ctx", None, true, false).unwrap();
        assert!(session.has_client_session_data());
        assert!(!session.has_server_session_data());
        assert!(session.get_client_session_data().is_ok());
        assert!(matches!(
            session.get_server_session_data(),
            Err(SatpError::SessionDataNotLoaded { side: "server" })
        ));
    }

    #[test]
    fn test_session_both_sides() {
        let session = SatpSession::new("ctx", None, true, true).unwrap();
        assert!(session.has_client_session_data());
        assert!(session.has_server_session_data());
        assert_eq!(
            session.get_client_session_data().unwrap().id,
            session.get_server_session_data().unwrap().id
        );
    }

    #[test]
    fn test_session_id_contains_context() {
        let session = SatpSession::new("ctx-42", None, true, false).unwrap();
        assert!(session.session_id().ends_with("-ctx-42"));
    }

    #[test]
    fn test_explicit_session_id() {
        let session =
            SatpSession::new("ctx", Some("fixed-id".into()), false, true).unwrap();
        assert_eq!(session.session_id(), "fixed-id");
    }

    #[test]
    fn test_recreate_hydrates_by_role() {
        let mut data = SessionData::new("s1", "ctx", Role::Server);
        data.state = SessionState::Recovering;
        data.last_sequence_number = 7;
        let session = SatpSession::recreate(data);
        assert!(session.has_server_session_data());
        assert!(!session.has_client_session_data());
        let data = session.get_server_session_data().unwrap();
        assert_eq!(data.state, SessionState::Recovering);
        assert_eq!(data.last_sequence_number, 7);
    }

    #[test]
    fn test_create_session_data_rejects_duplicate() {
        let mut session = SatpSession::new("ctx", None, true, false).unwrap();
        assert!(session
            .create_session_data(Role::Client, "s", "ctx")
            .is_err());
        assert!(session
            .create_session_data(Role::Server, "s", "ctx")
            .is_ok());
        assert!(session.has_server_session_data());
    }

    #[test]
    fn test_set_error_targets_author_side() {
        let mut session = SatpSession::new("ctx", None, true, true).unwrap();
        let err = SatpError::HashChainMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        // LockAssert is client-authored.
        session.set_error(MessageType::LockAssert, &err);

        let client = session.get_client_session_data().unwrap();
        assert_eq!(client.state, SessionState::Error);
        assert_eq!(client.error_code, Some(ErrorType::HashChain));
        assert_eq!(client.phase_error, Some(MessageType::LockAssert));

        let server = session.get_server_session_data().unwrap();
        assert_eq!(server.state, SessionState::Ongoing);
    }

    #[test]
    fn test_set_error_checking_targets_opposite_side() {
        let mut session = SatpSession::new("ctx", None, true, true).unwrap();
        let err = SatpError::SignatureVerification;
        // LockAssert is client-authored; the checking party is the server.
        session.set_error_checking(MessageType::LockAssert, &err);

        assert_eq!(
            session.get_server_session_data().unwrap().state,
            SessionState::Error
        );
        assert_eq!(
            session.get_client_session_data().unwrap().state,
            SessionState::Ongoing
        );
    }

    #[test]
    fn test_set_error_on_missing_side_is_noop() {
        let mut session = SatpSession::new("ctx", None, true, false).unwrap();
        let err = SatpError::SignatureMissing;
        // AssertionReceipt is server-authored but there is no server side.
        session.set_error(MessageType::AssertionReceipt, &err);
        assert_eq!(
            session.get_client_session_data().unwrap().state,
            SessionState::Ongoing
        );
    }

    #[test]
    fn test_current_stage_tracks_last_recorded() {
        let data = session_with_hashes(&[
            MessageType::NewSessionRequest,
            MessageType::NewSessionResponse,
        ]);
        assert_eq!(
            data.current_stage(),
            Some((Stage::Stage0, MessageType::NewSessionResponse))
        );

        let data = session_with_hashes(&[
            MessageType::NewSessionRequest,
            MessageType::NewSessionResponse,
            MessageType::PreTransferRequest,
            MessageType::PreTransferResponse,
            MessageType::InitProposal,
        ]);
        assert_eq!(
            data.current_stage(),
            Some((Stage::Stage1, MessageType::InitProposal))
        );
    }

    #[test]
    fn test_current_stage_empty() {
        let data = SessionData::new("s1", "ctx", Role::Client);
        assert_eq!(data.current_stage(), None);
    }

    #[test]
    fn test_crashed_stage_progression() {
        let data = SessionData::new("s1", "ctx", Role::Client);
        assert_eq!(data.crashed_stage(), Some(Stage::Stage0));

        let data = session_with_hashes(&[
            MessageType::NewSessionRequest,
            MessageType::NewSessionResponse,
            MessageType::PreTransferRequest,
            MessageType::PreTransferResponse,
        ]);
        assert_eq!(data.crashed_stage(), Some(Stage::Stage1));
    }

    #[test]
    fn test_crashed_stage_accepts_reject_branch() {
        // Stage 1 completes through the reject path without a receipt.
        let data = session_with_hashes(&[
            MessageType::NewSessionRequest,
            MessageType::NewSessionResponse,
            MessageType::PreTransferRequest,
            MessageType::PreTransferResponse,
            MessageType::InitProposal,
            MessageType::InitReject,
            MessageType::TransferCommenceRequest,
            MessageType::TransferCommenceResponse,
        ]);
        assert_eq!(data.crashed_stage(), Some(Stage::Stage2));
    }

    #[test]
    fn test_crashed_stage_none_when_complete() {
        let data = session_with_hashes(&[
            MessageType::NewSessionRequest,
            MessageType::NewSessionResponse,
            MessageType::PreTransferRequest,
            MessageType::PreTransferResponse,
            MessageType::InitProposal,
            MessageType::InitReceipt,
            MessageType::TransferCommenceRequest,
            MessageType::TransferCommenceResponse,
            MessageType::LockAssert,
            MessageType::AssertionReceipt,
            MessageType::CommitPrepare,
            MessageType::CommitReady,
            MessageType::CommitFinal,
            MessageType::AckCommitFinal,
            MessageType::TransferComplete,
            MessageType::TransferCompleteResponse,
        ]);
        assert_eq!(data.crashed_stage(), None);
    }

    #[test]
    fn test_counterparty_pubkey_by_role() {
        let mut data = SessionData::new("s1", "ctx", Role::Client);
        data.client_gateway_pubkey = "client-pk".into();
        data.server_gateway_pubkey = "server-pk".into();
        assert_eq!(data.counterparty_pubkey(), "server-pk");

        data.role = Role::Server;
        assert_eq!(data.counterparty_pubkey(), "client-pk");
    }

    #[test]
    fn test_session_data_snapshot_roundtrip() {
        let mut data = SessionData::new("s1", "ctx", Role::Client);
        data.hashes.set(MessageType::InitProposal, "h1".into());
        data.signatures.set(MessageType::InitProposal, "sig_h1".into());
        data.processed_timestamps.set(MessageType::InitProposal, 1234);
        data.state = SessionState::Recovering;

        let json = serde_json::to_string(&data).unwrap();
        let back: SessionData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}
