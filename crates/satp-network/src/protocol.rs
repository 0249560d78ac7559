//! Crash-recovery request/response protocol types for gateway-to-gateway
//! messaging.
//!
//! Framing is the CBOR codec provided by libp2p; the payloads are the
//! protobuf-encoded crash-recovery messages from `satp.v1`, so the wire
//! schema stays the single source of truth.

use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};

/// The crash-recovery protocol identifier.
pub const CRASH_PROTOCOL: StreamProtocol = StreamProtocol::new("/satp/crash/1.0.0");

/// Protocol handler name a channel registers its crash RPC client under.
pub const PROTOCOL_HANDLER_CRASH: &str = "crash";

/// Request sent to a counterparty gateway's crash-recovery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrashRequest {
    /// Ask the counterparty for log entries to resynchronize a session.
    /// Payload: protobuf `satp.v1.RecoverRequest`.
    Recover { data: Vec<u8> },
    /// Confirm that recovered entries were applied.
    /// Payload: protobuf `satp.v1.RecoverSuccessRequest`.
    RecoverSuccess { data: Vec<u8> },
    /// Report compensating actions and request the counterparty's own.
    /// Payload: protobuf `satp.v1.RollbackRequest`.
    Rollback { data: Vec<u8> },
}

/// Response from a counterparty gateway's crash-recovery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrashResponse {
    /// Payload: protobuf `satp.v1.RecoverResponse`.
    Recover { data: Vec<u8> },
    /// Payload: protobuf `satp.v1.RecoverSuccessResponse`.
    RecoverSuccess { data: Vec<u8> },
    /// Payload: protobuf `satp.v1.RollbackResponse`.
    Rollback { data: Vec<u8> },
    /// The service could not process the request.
    Error { message: String },
}
