//! The append-only local log: one entry per protocol step per session.
//!
//! The *last* entry for a session is the ground truth for crash
//! classification. Entries carry a serialized session snapshot so a crashed
//! gateway can rebuild its in-memory state from the counterparty's log.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use satp_core::proto::satp::v1 as pb;
use satp_core::SatpError;

/// A step that completed fully.
pub const OPERATION_DONE: &str = "done";
/// A step that was started but not finished.
pub const OPERATION_PARTIAL: &str = "partial";

/// Standardized log key: `{session_id}-{type}-{operation}`.
pub fn satp_log_key(session_id: &str, entry_type: &str, operation: &str) -> String {
    format!("{}-{}-{}", session_id, entry_type, operation)
}

/// One persisted protocol log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalLogEntry {
    pub session_id: String,
    /// Stage tag, e.g. "stage1".
    pub entry_type: String,
    pub key: String,
    /// "partial", "done", or an operation-specific tag.
    pub operation: String,
    /// Milliseconds since UNIX epoch.
    pub timestamp: u64,
    /// Serialized `SessionData` snapshot (JSON).
    pub data: String,
    pub sequence_number: u64,
}

impl LocalLogEntry {
    pub fn to_proto(&self) -> pb::LocalLogEntry {
        pb::LocalLogEntry {
            session_id: self.session_id.clone(),
            entry_type: self.entry_type.clone(),
            key: self.key.clone(),
            operation: self.operation.clone(),
            timestamp: self.timestamp,
            data: self.data.clone(),
            sequence_number: self.sequence_number,
        }
    }

    pub fn from_proto(proto: &pb::LocalLogEntry) -> Self {
        Self {
            session_id: proto.session_id.clone(),
            entry_type: proto.entry_type.clone(),
            key: proto.key.clone(),
            operation: proto.operation.clone(),
            timestamp: proto.timestamp,
            data: proto.data.clone(),
            sequence_number: proto.sequence_number,
        }
    }
}

/// Append-only repository of local log entries, keyed by session id.
///
/// Concurrent writers for different sessions never conflict; the crash
/// manager and the recovery server service are the only consumers.
#[async_trait]
pub trait LocalLogRepository: Send + Sync {
    /// Append one entry.
    async fn create(&self, entry: &LocalLogEntry) -> Result<(), SatpError>;

    /// The most recent entry for a session, if any.
    async fn read_latest_log(&self, session_id: &str) -> Result<Option<LocalLogEntry>, SatpError>;

    /// All non-proof entries across sessions, oldest first. Used by the
    /// startup recovery scan.
    async fn read_logs_not_proofs(&self) -> Result<Vec<LocalLogEntry>, SatpError>;

    /// All entries for a session with `sequence_number >= from_sequence`,
    /// ordered by sequence number.
    async fn fetch_logs_from_sequence(
        &self,
        session_id: &str,
        from_sequence: u64,
    ) -> Result<Vec<LocalLogEntry>, SatpError>;
}

/// In-memory repository backed by a concurrent map.
///
/// The reference implementation used in tests and single-process setups;
/// production gateways use the rocksdb-backed repository.
#[derive(Default)]
pub struct InMemoryLogRepository {
    entries: DashMap<String, Vec<LocalLogEntry>>,
}

impl InMemoryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entries, across sessions.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LocalLogRepository for InMemoryLogRepository {
    async fn create(&self, entry: &LocalLogEntry) -> Result<(), SatpError> {
        self.entries
            .entry(entry.session_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn read_latest_log(&self, session_id: &str) -> Result<Option<LocalLogEntry>, SatpError> {
        Ok(self
            .entries
            .get(session_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn read_logs_not_proofs(&self) -> Result<Vec<LocalLogEntry>, SatpError> {
        let mut logs: Vec<LocalLogEntry> = self
            .entries
            .iter()
            .flat_map(|e| e.value().clone())
            .filter(|entry| !entry.entry_type.starts_with("proof"))
            .collect();
        logs.sort_by_key(|entry| entry.timestamp);
        Ok(logs)
    }

    async fn fetch_logs_from_sequence(
        &self,
        session_id: &str,
        from_sequence: u64,
    ) -> Result<Vec<LocalLogEntry>, SatpError> {
        let mut logs: Vec<LocalLogEntry> = self
            .entries
            .get(session_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.sequence_number >= from_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        logs.sort_by_key(|entry| entry.sequence_number);
        Ok(logs)
    }
}
