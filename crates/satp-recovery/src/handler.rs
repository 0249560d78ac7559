//! Bridges inbound network requests to the crash-recovery server service:
//! decode the protobuf payload, dispatch, encode the signed response.

use async_trait::async_trait;
use std::sync::Arc;

use satp_network::{CrashMessageHandler, CrashRequest, CrashResponse, PeerId};

use crate::messages::{RecoverMessage, RecoverSuccessMessage, RollbackMessage};
use crate::server::CrashRecoveryServerService;

pub struct CrashRecoveryHandler {
    server_service: Arc<CrashRecoveryServerService>,
}

impl CrashRecoveryHandler {
    pub fn new(server_service: Arc<CrashRecoveryServerService>) -> Self {
        Self { server_service }
    }
}

#[async_trait]
impl CrashMessageHandler for CrashRecoveryHandler {
    async fn handle(&self, peer: PeerId, request: CrashRequest) -> CrashResponse {
        match request {
            CrashRequest::Recover { data } => match RecoverMessage::decode(&data) {
                Ok(message) => {
                    tracing::debug!(%peer, session_id = %message.session_id, "recover request");
                    match self.server_service.handle_recover(message).await {
                        Ok(response) => CrashResponse::Recover {
                            data: response.encode(),
                        },
                        Err(e) => error_response(&e),
                    }
                }
                Err(e) => error_response(&e),
            },
            CrashRequest::RecoverSuccess { data } => {
                match RecoverSuccessMessage::decode(&data) {
                    Ok(message) => {
                        match self.server_service.handle_recover_success(message).await {
                            Ok(response) => CrashResponse::RecoverSuccess {
                                data: response.encode(),
                            },
                            Err(e) => error_response(&e),
                        }
                    }
                    Err(e) => error_response(&e),
                }
            }
            CrashRequest::Rollback { data } => match RollbackMessage::decode(&data) {
                Ok(message) => {
                    tracing::debug!(%peer, session_id = %message.session_id, "rollback request");
                    match self.server_service.handle_rollback(message).await {
                        Ok(response) => CrashResponse::Rollback {
                            data: response.encode(),
                        },
                        Err(e) => error_response(&e),
                    }
                }
                Err(e) => error_response(&e),
            },
        }
    }
}

fn error_response(error: &dyn std::fmt::Display) -> CrashResponse {
    tracing::warn!(error = %error, "crash-recovery request failed");
    CrashResponse::Error {
        message: error.to_string(),
    }
}
