//! RocksDB-backed local log repository.
//!
//! Entries are keyed `{session_id}/{sequence_number:020}` so a forward
//! range scan over a session prefix yields entries in sequence order.
//! Re-persisting a recovered entry overwrites the identical key, which
//! keeps recovery replay idempotent.

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::path::Path;

use satp_core::SatpError;
use satp_recovery::{LocalLogEntry, LocalLogRepository};

const CF_LOGS: &str = "logs";

fn log_key(session_id: &str, sequence_number: u64) -> String {
    format!("{}/{:020}", session_id, sequence_number)
}

fn repo_err(e: impl std::fmt::Display) -> SatpError {
    SatpError::LogRepository(e.to_string())
}

/// RocksDB-backed storage for the gateway's protocol log.
pub struct RocksDbLogRepository {
    db: DB,
}

impl RocksDbLogRepository {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self, SatpError> {
        std::fs::create_dir_all(path).map_err(repo_err)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_LOGS, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors).map_err(repo_err)?;

        Ok(Self { db })
    }

    fn scan_session(&self, session_id: &str) -> Result<Vec<LocalLogEntry>, SatpError> {
        let cf = self
            .db
            .cf_handle(CF_LOGS)
            .ok_or_else(|| repo_err("column family 'logs' not found"))?;
        let prefix = format!("{}/", session_id);

        let mut entries = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        for item in iter {
            let (key, value) = item.map_err(repo_err)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let entry: LocalLogEntry = serde_json::from_slice(&value).map_err(repo_err)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[async_trait]
impl LocalLogRepository for RocksDbLogRepository {
    async fn create(&self, entry: &LocalLogEntry) -> Result<(), SatpError> {
        let cf = self
            .db
            .cf_handle(CF_LOGS)
            .ok_or_else(|| repo_err("column family 'logs' not found"))?;
        let key = log_key(&entry.session_id, entry.sequence_number);
        let value = serde_json::to_vec(entry).map_err(repo_err)?;
        self.db.put_cf(&cf, key.as_bytes(), value).map_err(repo_err)
    }

    async fn read_latest_log(&self, session_id: &str) -> Result<Option<LocalLogEntry>, SatpError> {
        Ok(self.scan_session(session_id)?.into_iter().last())
    }

    async fn read_logs_not_proofs(&self) -> Result<Vec<LocalLogEntry>, SatpError> {
        let cf = self
            .db
            .cf_handle(CF_LOGS)
            .ok_or_else(|| repo_err("column family 'logs' not found"))?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(repo_err)?;
            let entry: LocalLogEntry = serde_json::from_slice(&value).map_err(repo_err)?;
            if !entry.entry_type.starts_with("proof") {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(entries)
    }

    async fn fetch_logs_from_sequence(
        &self,
        session_id: &str,
        from_sequence: u64,
    ) -> Result<Vec<LocalLogEntry>, SatpError> {
        Ok(self
            .scan_session(session_id)?
            .into_iter()
            .filter(|entry| entry.sequence_number >= from_sequence)
            .collect())
    }
}
