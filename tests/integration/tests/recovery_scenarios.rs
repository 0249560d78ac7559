//! Integration tests: crash recovery between two live gateways.
//!
//! Each scenario runs over the real channel layer: loopback libp2p
//! connections, signed protobuf messages, in-memory log repositories.

use std::sync::Arc;

use satp_core::message::MessageType;
use satp_core::session::{SatpSession, SessionData, SessionState};
use satp_core::types::Role;
use satp_crypto::KeyPair;
use satp_integration_tests::{besu_net, connect_pair, fabric_net, spawn_gateway, TestGateway};
use satp_recovery::{
    satp_log_key, BridgeManager as _, LocalLogEntry, LocalLogRepository as _, OPERATION_DONE,
    OPERATION_PARTIAL,
};

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Base session data shared by both sides of a scenario.
fn base_session_data(
    session_id: &str,
    role: Role,
    client_pubkey: &str,
    server_pubkey: &str,
) -> SessionData {
    let mut data = SessionData::new(session_id, "ctx-recovery", role);
    data.client_gateway_pubkey = client_pubkey.into();
    data.server_gateway_pubkey = server_pubkey.into();
    data.sender_gateway_network_id = Some(fabric_net());
    data.recipient_gateway_network_id = Some(besu_net());
    data.state = SessionState::Recovering;
    data.max_retries = 3;
    data.max_timeout_ms = 30_000;
    for (i, mt) in [
        MessageType::NewSessionRequest,
        MessageType::NewSessionResponse,
        MessageType::PreTransferRequest,
        MessageType::PreTransferResponse,
    ]
    .iter()
    .enumerate()
    {
        data.hashes.set(*mt, format!("h{}", i + 1));
        data.signatures.set(*mt, format!("sig_h{}", i + 1));
        data.processed_timestamps.set(*mt, 1_000 + i as u64);
    }
    data
}

/// Append a log entry whose data is the serialized snapshot of `data`.
async fn append_log(
    gateway: &TestGateway,
    data: &SessionData,
    operation: &str,
    sequence_number: u64,
) {
    let entry = LocalLogEntry {
        session_id: data.id.clone(),
        entry_type: "stage1".into(),
        key: satp_log_key(&data.id, "stage1", operation),
        operation: operation.into(),
        timestamp: now_ms(),
        data: serde_json::to_string(data).unwrap(),
        sequence_number,
    };
    gateway.repository.create(&entry).await.unwrap();
}

// =========================================================================
// Stage 1 recovery: client holds a partial stage-1, server a complete one
// =========================================================================

#[tokio::test]
async fn test_stage1_recovery_resynchronizes_client() {
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;
    let server_gw = spawn_gateway("gw-server", besu_net()).await;
    connect_pair(&client_gw, &server_gw).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let client_pub = client_gw.pubkey_hex();
    let server_pub = server_gw.pubkey_hex();

    // Client side: stage 1 only has the proposal request recorded.
    let mut client_data = base_session_data(&session_id, Role::Client, &client_pub, &server_pub);
    client_data.last_sequence_number = 1;
    client_data.hashes.set(MessageType::InitProposal, "h1".into());
    client_data
        .signatures
        .set(MessageType::InitProposal, "sig_h1".into());
    client_data
        .processed_timestamps
        .set(MessageType::InitProposal, 2_000);

    // Server side: stage 1 completed through the proposal receipt.
    let mut server_data = base_session_data(&session_id, Role::Server, &client_pub, &server_pub);
    server_data.last_sequence_number = 2;
    server_data.hashes.set(MessageType::InitProposal, "h1".into());
    server_data.hashes.set(MessageType::InitReceipt, "h2".into());
    server_data
        .signatures
        .set(MessageType::InitProposal, "sig_h1".into());
    server_data
        .signatures
        .set(MessageType::InitReceipt, "sig_h2".into());
    server_data
        .processed_timestamps
        .set(MessageType::InitProposal, 2_000);
    server_data
        .processed_timestamps
        .set(MessageType::InitReceipt, 2_001);

    // Client log: interrupted. Server log: done, carrying its snapshot.
    append_log(&client_gw, &client_data, OPERATION_PARTIAL, 1).await;
    append_log(&server_gw, &server_data, OPERATION_DONE, 2).await;

    client_gw
        .manager
        .track_session(SatpSession::recreate(client_data.clone()));
    server_gw
        .manager
        .track_session(SatpSession::recreate(server_data.clone()));

    let session = client_gw.manager.get_session(&session_id).unwrap();
    client_gw
        .manager
        .check_and_resolve_crash(&session)
        .await
        .unwrap();

    let recovered = client_gw.manager.get_session(&session_id).unwrap();
    let recovered_data = recovered.get_client_session_data().unwrap();

    assert_eq!(recovered_data.state, SessionState::Recovered);
    assert_eq!(recovered_data.hashes.stage1, server_data.hashes.stage1);
    assert_eq!(
        recovered_data.hashes.get(MessageType::InitReceipt),
        Some(&"h2".to_string())
    );
    assert_eq!(
        recovered_data.signatures.get(MessageType::InitReceipt),
        Some(&"sig_h2".to_string())
    );
    assert_eq!(
        recovered_data.processed_timestamps.stage1,
        server_data.processed_timestamps.stage1
    );
}

// =========================================================================
// Stage 3 recovery: analogous with commit-phase artifacts
// =========================================================================

#[tokio::test]
async fn test_stage3_recovery_resynchronizes_client() {
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;
    let server_gw = spawn_gateway("gw-server", besu_net()).await;
    connect_pair(&client_gw, &server_gw).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let client_pub = client_gw.pubkey_hex();
    let server_pub = server_gw.pubkey_hex();

    // Client side: stage 3 only has the commit preparation recorded.
    let mut client_data = base_session_data(&session_id, Role::Client, &client_pub, &server_pub);
    client_data.last_sequence_number = 11;
    client_data
        .hashes
        .set(MessageType::CommitPrepare, "h12".into());
    client_data
        .signatures
        .set(MessageType::CommitPrepare, "sig_h12".into());
    client_data
        .processed_timestamps
        .set(MessageType::CommitPrepare, 3_000);

    // Server side: commit ready already answered.
    let mut server_data = base_session_data(&session_id, Role::Server, &client_pub, &server_pub);
    server_data.last_sequence_number = 12;
    server_data
        .hashes
        .set(MessageType::CommitPrepare, "h12".into());
    server_data.hashes.set(MessageType::CommitReady, "h13".into());
    server_data
        .signatures
        .set(MessageType::CommitPrepare, "sig_h12".into());
    server_data
        .signatures
        .set(MessageType::CommitReady, "sig_h13".into());
    server_data
        .processed_timestamps
        .set(MessageType::CommitPrepare, 3_000);
    server_data
        .processed_timestamps
        .set(MessageType::CommitReady, 3_001);

    append_log(&client_gw, &client_data, OPERATION_PARTIAL, 11).await;
    append_log(&server_gw, &server_data, OPERATION_DONE, 12).await;

    client_gw
        .manager
        .track_session(SatpSession::recreate(client_data.clone()));
    server_gw
        .manager
        .track_session(SatpSession::recreate(server_data.clone()));

    let session = client_gw.manager.get_session(&session_id).unwrap();
    client_gw
        .manager
        .check_and_resolve_crash(&session)
        .await
        .unwrap();

    let recovered = client_gw.manager.get_session(&session_id).unwrap();
    let recovered_data = recovered.get_client_session_data().unwrap();

    assert_eq!(recovered_data.state, SessionState::Recovered);
    assert_eq!(recovered_data.hashes.stage3, server_data.hashes.stage3);
    assert_eq!(recovered_data.signatures.stage3, server_data.signatures.stage3);
    assert_eq!(
        recovered_data.signatures.get(MessageType::CommitReady),
        Some(&"sig_h13".to_string())
    );
    assert_eq!(
        recovered_data.processed_timestamps.stage3,
        server_data.processed_timestamps.stage3
    );
}

// =========================================================================
// Rejected signature: recovery must fail when the requester's key does
// not match the stored counterpart pubkey
// =========================================================================

#[tokio::test]
async fn test_recovery_rejected_for_unknown_signing_key() {
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;
    let server_gw = spawn_gateway("gw-server", besu_net()).await;
    connect_pair(&client_gw, &server_gw).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let server_pub = server_gw.pubkey_hex();

    // The server stores a different client pubkey than the one our client
    // gateway actually signs with.
    let stranger = KeyPair::generate();
    let client_data = {
        let mut data = base_session_data(
            &session_id,
            Role::Client,
            &client_gw.pubkey_hex(),
            &server_pub,
        );
        data.last_sequence_number = 1;
        data
    };
    let server_data = {
        let mut data = base_session_data(
            &session_id,
            Role::Server,
            &stranger.public_key_hex(),
            &server_pub,
        );
        data.last_sequence_number = 2;
        data
    };

    append_log(&client_gw, &client_data, OPERATION_PARTIAL, 1).await;
    append_log(&server_gw, &server_data, OPERATION_DONE, 2).await;

    client_gw
        .manager
        .track_session(SatpSession::recreate(client_data.clone()));
    server_gw
        .manager
        .track_session(SatpSession::recreate(server_data));

    assert!(!client_gw.manager.handle_recovery(&client_data).await);

    // The client session never reached Recovered.
    let session = client_gw.manager.get_session(&session_id).unwrap();
    assert_ne!(
        session.get_client_session_data().unwrap().state,
        SessionState::Recovered
    );
}

// =========================================================================
// Retry exhaustion: forced rollback, scheduler resumed
// =========================================================================

#[tokio::test]
async fn test_retry_exhaustion_escalates_to_rollback() {
    // No counterparty connected: every recovery attempt fails at channel
    // resolution.
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let mut client_data = base_session_data(
        &session_id,
        Role::Client,
        &client_gw.pubkey_hex(),
        &KeyPair::generate().public_key_hex(),
    );
    client_data.max_retries = 2;
    client_data.last_sequence_number = 1;
    client_data.hashes.set(MessageType::LockAssert, "h-lock".into());
    client_data.sender_asset = Some(satp_core::types::Asset {
        token_id: "token-src".into(),
        ..Default::default()
    });

    // The asset is locked on the source ledger; rollback must release it.
    client_gw
        .bridge
        .lock_asset("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap();

    append_log(&client_gw, &client_data, OPERATION_PARTIAL, 1).await;
    client_gw
        .manager
        .track_session(SatpSession::recreate(client_data.clone()));

    let session = client_gw.manager.get_session(&session_id).unwrap();
    client_gw
        .manager
        .check_and_resolve_crash(&session)
        .await
        .unwrap();

    // The forced rollback released the lock even though the counterparty
    // was unreachable.
    assert!(!client_gw
        .bridge
        .is_asset_locked("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap());
    // The scheduler ends up resumed regardless of the rollback outcome.
    assert!(!client_gw.manager.is_scheduler_paused(&session_id));
}

// =========================================================================
// Recovery is re-runnable: replaying the exchange converges to the same
// state instead of corrupting it
// =========================================================================

#[tokio::test]
async fn test_recovery_replay_is_idempotent() {
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;
    let server_gw = spawn_gateway("gw-server", besu_net()).await;
    connect_pair(&client_gw, &server_gw).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let client_pub = client_gw.pubkey_hex();
    let server_pub = server_gw.pubkey_hex();

    let mut client_data = base_session_data(&session_id, Role::Client, &client_pub, &server_pub);
    client_data.last_sequence_number = 1;
    let mut server_data = base_session_data(&session_id, Role::Server, &client_pub, &server_pub);
    server_data.last_sequence_number = 2;
    server_data.hashes.set(MessageType::InitProposal, "h1".into());
    server_data.hashes.set(MessageType::InitReceipt, "h2".into());

    append_log(&client_gw, &client_data, OPERATION_PARTIAL, 1).await;
    append_log(&server_gw, &server_data, OPERATION_DONE, 2).await;

    client_gw
        .manager
        .track_session(SatpSession::recreate(client_data.clone()));
    server_gw
        .manager
        .track_session(SatpSession::recreate(server_data.clone()));

    assert!(client_gw.manager.handle_recovery(&client_data).await);
    let first = client_gw.manager.get_session(&session_id).unwrap();
    let first_hashes = first.get_client_session_data().unwrap().hashes.clone();

    // A crash between persisting and updating in-memory state means the
    // exchange can replay; the result must be the same.
    assert!(client_gw.manager.handle_recovery(&client_data).await);
    let second = client_gw.manager.get_session(&session_id).unwrap();
    assert_eq!(second.get_client_session_data().unwrap().hashes, first_hashes);
}
