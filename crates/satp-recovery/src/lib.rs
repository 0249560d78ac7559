//! Crash detection, recovery and rollback for SATP gateway sessions.
//!
//! A transfer writes one local log entry per protocol step. The crash
//! manager periodically inspects the latest entry per tracked session: a
//! non-"done" entry means a step was interrupted (recovery), a stale "done"
//! entry means the counterparty stalled (rollback). Recovery exchanges
//! signed messages over the gateway channel to replay the counterparty's
//! log entries; rollback executes chain-pair-specific compensating actions
//! through the bridge manager.

pub mod client;
pub mod error;
pub mod handler;
pub mod manager;
pub mod messages;
pub mod repository;
pub mod rollback;
pub mod server;

pub use client::CrashRecoveryClientService;
pub use error::RecoveryError;
pub use handler::CrashRecoveryHandler;
pub use manager::{CrashManager, CrashManagerOptions};
pub use messages::{
    RecoverMessage, RecoverResponse, RecoverSuccessMessage, RecoverSuccessResponse,
    RollbackMessage, RollbackResponse,
};
pub use repository::{
    satp_log_key, InMemoryLogRepository, LocalLogEntry, LocalLogRepository, OPERATION_DONE,
    OPERATION_PARTIAL,
};
pub use rollback::{
    BridgeManager, FungibleRollbackStrategy, InMemoryBridgeManager, RollbackLogEntry,
    RollbackState, RollbackStatus, RollbackStrategy, RollbackStrategyFactory,
};
pub use server::CrashRecoveryServerService;
