//! Integration tests: the rollback exchange between two live gateways.

use satp_core::message::MessageType;
use satp_core::session::{SatpSession, SessionData, SessionState};
use satp_core::types::{Asset, Role};
use satp_integration_tests::{besu_net, connect_pair, fabric_net, spawn_gateway};
use satp_recovery::BridgeManager as _;

fn session_pair(
    session_id: &str,
    client_pubkey: &str,
    server_pubkey: &str,
) -> (SessionData, SessionData) {
    let mut client = SessionData::new(session_id, "ctx-rollback", Role::Client);
    client.client_gateway_pubkey = client_pubkey.into();
    client.server_gateway_pubkey = server_pubkey.into();
    client.sender_gateway_network_id = Some(fabric_net());
    client.recipient_gateway_network_id = Some(besu_net());
    client.state = SessionState::Ongoing;
    client.sender_asset = Some(Asset {
        token_id: "token-src".into(),
        ..Default::default()
    });
    client.receiver_asset = Some(Asset {
        token_id: "token-dst".into(),
        ..Default::default()
    });
    client.hashes.set(MessageType::LockAssert, "h-lock".into());

    let mut server = client.clone();
    server.role = Role::Server;
    server.hashes.set(MessageType::CommitFinal, "h-commit".into());

    (client, server)
}

#[tokio::test]
async fn test_rollback_compensates_both_sides() {
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;
    let server_gw = spawn_gateway("gw-server", besu_net()).await;
    connect_pair(&client_gw, &server_gw).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let (client_data, server_data) =
        session_pair(&session_id, &client_gw.pubkey_hex(), &server_gw.pubkey_hex());

    // State before the crash: the client locked its asset on the source
    // ledger, the server minted the destination asset.
    client_gw
        .bridge
        .lock_asset("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap();
    server_gw
        .bridge
        .mint_asset("besu-net", server_data.receiver_asset.as_ref().unwrap())
        .await
        .unwrap();

    let client_session = SatpSession::recreate(client_data.clone());
    client_gw.manager.track_session(client_session.clone());
    server_gw
        .manager
        .track_session(SatpSession::recreate(server_data.clone()));

    let rolled_back = client_gw
        .manager
        .initiate_rollback(&client_session, &client_data, true)
        .await;
    assert!(rolled_back, "rollback exchange failed");

    // Client side released the lock.
    assert!(!client_gw
        .bridge
        .is_asset_locked("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap());
    // Server side burned the minted asset.
    assert!(!server_gw
        .bridge
        .is_asset_minted("besu-net", server_data.receiver_asset.as_ref().unwrap())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rollback_without_force_is_noop() {
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let (client_data, _) = session_pair(
        &session_id,
        &client_gw.pubkey_hex(),
        &client_gw.pubkey_hex(),
    );

    client_gw
        .bridge
        .lock_asset("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap();

    let session = SatpSession::recreate(client_data.clone());
    client_gw.manager.track_session(session.clone());

    assert!(
        client_gw
            .manager
            .initiate_rollback(&session, &client_data, false)
            .await
    );
    // Nothing was compensated.
    assert!(client_gw
        .bridge
        .is_asset_locked("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rollback_reinvocation_does_not_double_compensate() {
    let client_gw = spawn_gateway("gw-client", fabric_net()).await;
    let server_gw = spawn_gateway("gw-server", besu_net()).await;
    connect_pair(&client_gw, &server_gw).await;

    let session_id = format!("session-{}", uuid::Uuid::now_v7());
    let (client_data, server_data) =
        session_pair(&session_id, &client_gw.pubkey_hex(), &server_gw.pubkey_hex());

    client_gw
        .bridge
        .lock_asset("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap();

    let client_session = SatpSession::recreate(client_data.clone());
    client_gw.manager.track_session(client_session.clone());
    server_gw
        .manager
        .track_session(SatpSession::recreate(server_data));

    assert!(
        client_gw
            .manager
            .initiate_rollback(&client_session, &client_data, true)
            .await
    );
    // Second invocation on the already rolled-back session still succeeds
    // and takes no further ledger actions.
    assert!(
        client_gw
            .manager
            .initiate_rollback(&client_session, &client_data, true)
            .await
    );
    assert!(!client_gw
        .bridge
        .is_asset_locked("fabric-net", client_data.sender_asset.as_ref().unwrap())
        .await
        .unwrap());
}
