//! The crash manager: per-session crash detection timers, the recovery
//! exchange, and rollback escalation.
//!
//! Each tracked session owns one cancellable repeating timer task holding a
//! pause flag and an abort handle; tasks for different sessions run
//! concurrently and independently. Within one session's task the pause flag
//! guarantees at most one crash-check/recovery/rollback cycle in flight:
//! pausing happens before any network or storage I/O and resuming happens
//! on every exit path.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use satp_core::config::CoreConfig;
use satp_core::session::{SatpSession, SessionData, SessionState};
use satp_core::types::{CrashStatus, Role};
use satp_crypto::{signature_verifier, KeyPair};
use satp_network::{CrashRequest, CrashResponse, GatewayOrchestrator};

use crate::client::CrashRecoveryClientService;
use crate::error::RecoveryError;
use crate::handler::CrashRecoveryHandler;
use crate::messages::{RecoverResponse, RecoverSuccessResponse, RollbackResponse};
use crate::repository::{LocalLogRepository, OPERATION_DONE};
use crate::rollback::{BridgeManager, RollbackState, RollbackStatus, RollbackStrategyFactory};
use crate::server::CrashRecoveryServerService;

pub struct CrashManagerOptions {
    pub repository: Arc<dyn LocalLogRepository>,
    pub orchestrator: Arc<GatewayOrchestrator>,
    pub bridge: Arc<dyn BridgeManager>,
    pub signer: Arc<KeyPair>,
    pub config: CoreConfig,
}

struct SessionScheduler {
    paused: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct CrashManager {
    sessions: Arc<DashMap<String, SatpSession>>,
    repository: Arc<dyn LocalLogRepository>,
    orchestrator: Arc<GatewayOrchestrator>,
    client_service: CrashRecoveryClientService,
    server_service: Arc<CrashRecoveryServerService>,
    factory: Arc<RollbackStrategyFactory>,
    schedulers: DashMap<String, SessionScheduler>,
    check_interval: Duration,
}

impl CrashManager {
    pub fn new(options: CrashManagerOptions) -> Arc<Self> {
        let sessions: Arc<DashMap<String, SatpSession>> = Arc::new(DashMap::new());
        let factory = Arc::new(RollbackStrategyFactory::new(options.bridge));

        let server_service = Arc::new(CrashRecoveryServerService::new(
            sessions.clone(),
            options.repository.clone(),
            factory.clone(),
            options.signer.clone(),
        ));
        let client_service = CrashRecoveryClientService::new(options.signer);

        tracing::info!(
            gateway_id = %options.orchestrator.self_id(),
            check_interval_ms = options.config.crash_check_interval_ms,
            "crash manager created"
        );

        Arc::new(Self {
            sessions,
            repository: options.repository,
            orchestrator: options.orchestrator,
            client_service,
            server_service,
            factory,
            schedulers: DashMap::new(),
            check_interval: Duration::from_millis(options.config.crash_check_interval_ms),
        })
    }

    /// The inbound request handler to register on the gateway network.
    pub fn handler(&self) -> Arc<CrashRecoveryHandler> {
        Arc::new(CrashRecoveryHandler::new(self.server_service.clone()))
    }

    /// The tracked session for an id, if any.
    pub fn get_session(&self, session_id: &str) -> Option<SatpSession> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    /// Ids of every tracked session.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Track a session and start its crash detection timer.
    pub fn track_session(self: &Arc<Self>, session: SatpSession) {
        let session_id = session.session_id();
        self.sessions.insert(session_id.clone(), session);
        self.start_crash_detection(session_id);
    }

    /// Start the repeating crash detection task for one session.
    pub fn start_crash_detection(self: &Arc<Self>, session_id: String) {
        if self.schedulers.contains_key(&session_id) {
            tracing::debug!(%session_id, "crash detection already running");
            return;
        }

        let paused = Arc::new(AtomicBool::new(false));
        let manager = Arc::clone(self);
        let flag = paused.clone();
        let id = session_id.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the first
            // check happens one full period after tracking starts.
            interval.tick().await;

            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    tracing::debug!(session_id = %id, "scheduler paused, skipping check");
                    continue;
                }
                let session = match manager.sessions.get(&id) {
                    Some(entry) => entry.value().clone(),
                    None => {
                        tracing::warn!(session_id = %id, "no session found for scheduler");
                        continue;
                    }
                };
                manager.check_and_resolve_crashes(&session).await;
            }
        });

        self.schedulers
            .insert(session_id.clone(), SessionScheduler { paused, handle });
        tracing::info!(%session_id, "crash detection running");
    }

    pub fn pause_scheduler(&self, session_id: &str) {
        if let Some(scheduler) = self.schedulers.get(session_id) {
            if !scheduler.paused.swap(true, Ordering::SeqCst) {
                tracing::info!(%session_id, "scheduler paused");
            }
        }
    }

    pub fn resume_scheduler(&self, session_id: &str) {
        if let Some(scheduler) = self.schedulers.get(session_id) {
            if scheduler.paused.swap(false, Ordering::SeqCst) {
                tracing::info!(%session_id, "scheduler resumed");
            }
        }
    }

    pub fn is_scheduler_paused(&self, session_id: &str) -> bool {
        self.schedulers
            .get(session_id)
            .map(|s| s.paused.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Cancel one session's crash detection timer.
    pub fn stop_scheduler(&self, session_id: &str) {
        match self.schedulers.remove(session_id) {
            Some((_, scheduler)) => {
                scheduler.handle.abort();
                tracing::info!(%session_id, "crash detection stopped");
            }
            None => {
                tracing::warn!(%session_id, "no active crash detection to stop");
            }
        }
    }

    /// Cancel every outstanding timer. Does not interrupt in-flight work.
    pub fn shutdown(&self) {
        let session_ids: Vec<String> = self.schedulers.iter().map(|e| e.key().clone()).collect();
        for session_id in session_ids {
            self.stop_scheduler(&session_id);
        }
    }

    /// Startup recovery: rebuild the first interrupted session found in the
    /// local log and start tracking it.
    ///
    /// Single-pass over the first matching log only; concurrent
    /// multi-session recovery at startup is intentionally not attempted.
    pub async fn recover_sessions(self: &Arc<Self>) {
        let logs = match self.repository.read_logs_not_proofs().await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::error!(error = %e, "error reading logs for session recovery");
                return;
            }
        };

        let Some(log) = logs.first() else {
            tracing::info!("no logs available for recovery");
            return;
        };

        let session_id = log.session_id.clone();
        tracing::info!(%session_id, "recovering session from local log");

        let snapshot: SessionData = match serde_json::from_str(&log.data) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(%session_id, error = %e, "invalid session snapshot in log");
                return;
            }
        };

        let session = SatpSession::recreate(snapshot);
        self.sessions.insert(session_id.clone(), session);
        self.start_crash_detection(session_id.clone());
        tracing::info!(%session_id, "session reconstructed from log");
    }

    /// Set the state on every populated side of a tracked session.
    pub fn update_session_state(&self, session_id: &str, new_state: SessionState) {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            tracing::warn!(%session_id, "cannot update state: session not tracked");
            return;
        };
        if let Ok(data) = session.get_client_session_data_mut() {
            data.state = new_state;
            tracing::debug!(%session_id, state = %new_state, "client session state updated");
        }
        if let Ok(data) = session.get_server_session_data_mut() {
            data.state = new_state;
            tracing::debug!(%session_id, state = %new_state, "server session state updated");
        }
    }

    /// One scheduled pass: resolve crashes, then log where the session
    /// ended up.
    pub async fn check_and_resolve_crashes(&self, session: &SatpSession) {
        let session_id = session.session_id();

        if let Err(e) = self.check_and_resolve_crash(session).await {
            tracing::error!(%session_id, error = %e, "crash resolution failed");
        }

        let Some(current) = self.sessions.get(&session_id) else {
            tracing::warn!(%session_id, "session missing after resolution");
            return;
        };
        if let Ok(data) = current.get_client_session_data() {
            tracing::debug!(%session_id, state = %data.state, "client session state");
        }
        if let Ok(data) = current.get_server_session_data() {
            tracing::debug!(%session_id, state = %data.state, "server session state");
        }
    }

    /// Detect and resolve a crash for each populated side of a session.
    ///
    /// Per side, up to `max_retries` recovery attempts; on exhaustion, one
    /// unconditional escalation to forced rollback. The scheduler is paused
    /// before any recovery or rollback I/O and resumed on every exit path.
    pub async fn check_and_resolve_crash(
        &self,
        session: &SatpSession,
    ) -> Result<(), RecoveryError> {
        let session_id = session.session_id();

        let mut session_data_list: Vec<SessionData> = Vec::new();
        if let Ok(data) = session.get_client_session_data() {
            session_data_list.push(data.clone());
        }
        if let Ok(data) = session.get_server_session_data() {
            session_data_list.push(data.clone());
        }
        if session_data_list.is_empty() {
            return Err(RecoveryError::Core(
                satp_core::SatpError::SessionDataNotLoaded { side: "any" },
            ));
        }

        for session_data in &session_data_list {
            let max_retries = session_data.max_retries;
            let mut attempts = 0u32;

            loop {
                match self.check_crash(session_data).await {
                    CrashStatus::InRecovery => {
                        tracing::info!(
                            %session_id,
                            role = %session_data.role,
                            attempt = attempts + 1,
                            "crash detected, attempting recovery"
                        );
                        self.pause_scheduler(&session_id);
                        self.update_session_state(&session_id, SessionState::Recovering);

                        if self.handle_recovery(session_data).await {
                            self.update_session_state(&session_id, SessionState::Recovered);
                            self.resume_scheduler(&session_id);
                            tracing::info!(%session_id, "recovery successful");
                            break;
                        }

                        attempts += 1;
                        tracing::info!(%session_id, attempt = attempts, "recovery attempt failed");

                        if attempts >= max_retries {
                            tracing::warn!(
                                %session_id,
                                "recovery attempts exhausted, initiating rollback"
                            );
                            let rolled_back =
                                self.initiate_rollback(session, session_data, true).await;
                            self.resume_scheduler(&session_id);
                            if !rolled_back {
                                tracing::error!(%session_id, "forced rollback failed");
                            }
                            // Exit after rollback: no further sides this cycle.
                            return Ok(());
                        }
                    }
                    CrashStatus::InRollback => {
                        tracing::warn!(%session_id, "session timed out, initiating rollback");
                        self.pause_scheduler(&session_id);
                        let rolled_back = self.initiate_rollback(session, session_data, true).await;
                        self.resume_scheduler(&session_id);
                        if rolled_back {
                            tracing::info!(%session_id, "rollback completed");
                        } else {
                            tracing::error!(%session_id, "rollback failed");
                        }
                        break;
                    }
                    CrashStatus::Idle => {
                        tracing::debug!(%session_id, role = %session_data.role, "no crash detected");
                        break;
                    }
                    CrashStatus::Error => {
                        tracing::warn!(%session_id, "crash check errored, deferring to next tick");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Classify one session side from its latest log entry.
    pub async fn check_crash(&self, session_data: &SessionData) -> CrashStatus {
        let last_log = match self.repository.read_latest_log(&session_data.id).await {
            Ok(log) => log,
            Err(e) => {
                tracing::error!(session_id = %session_data.id, error = %e, "log repository unavailable");
                return CrashStatus::Error;
            }
        };

        let Some(last_log) = last_log else {
            tracing::warn!(session_id = %session_data.id, "no logs found for session");
            return CrashStatus::Error;
        };

        if last_log.operation != OPERATION_DONE {
            tracing::info!(
                session_id = %session_data.id,
                operation = %last_log.operation,
                "interrupted step detected"
            );
            return CrashStatus::InRecovery;
        }

        let now = Utc::now().timestamp_millis() as u64;
        let age = now.saturating_sub(last_log.timestamp);
        if age > session_data.max_timeout_ms {
            tracing::warn!(
                session_id = %session_data.id,
                age_ms = age,
                max_timeout_ms = session_data.max_timeout_ms,
                "session timeout exceeded"
            );
            return CrashStatus::InRollback;
        }

        CrashStatus::Idle
    }

    /// One recovery exchange with the counterparty, as explicit steps:
    /// resolve channel → build/send RecoverMessage → verify response →
    /// persist entries → reconstruct session → acknowledge. Returns false
    /// (never panics) on any failure so the caller's retry loop can
    /// re-attempt.
    pub async fn handle_recovery(&self, session_data: &SessionData) -> bool {
        let session_id = &session_data.id;
        tracing::debug!(
            %session_id,
            crashed_stage = ?session_data.crashed_stage(),
            "starting crash recovery exchange"
        );

        // Resolve the counterparty channel.
        let Some(network) = session_data.recipient_gateway_network_id.as_ref() else {
            tracing::warn!(%session_id, "no recipient network on session");
            return false;
        };
        let channel = match self.orchestrator.get_channel(&network.id) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "no channel to counterparty");
                return false;
            }
        };
        let client = match channel.crash_client() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "no crash client on channel");
                return false;
            }
        };

        // Build and send the signed RecoverMessage.
        let last_entry_timestamp = match self.repository.read_latest_log(session_id).await {
            Ok(Some(entry)) => entry.timestamp,
            _ => 0,
        };
        let recover_message = match self
            .client_service
            .create_recover_message(session_data, last_entry_timestamp)
        {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "failed to build recover message");
                return false;
            }
        };
        let response = match client
            .request(CrashRequest::Recover {
                data: recover_message.encode(),
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "recover request failed");
                return false;
            }
        };
        let update = match response {
            CrashResponse::Recover { data } => match RecoverResponse::decode(&data) {
                Ok(update) => update,
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "invalid recover response");
                    return false;
                }
            },
            CrashResponse::Error { message } => {
                tracing::warn!(%session_id, error = %message, "counterparty rejected recover");
                return false;
            }
            _ => {
                tracing::warn!(%session_id, "unexpected response variant to recover");
                return false;
            }
        };

        // Verify the response against the counterpart pubkey.
        if let Err(e) = signature_verifier(&update, session_data) {
            tracing::warn!(%session_id, error = %e, "recover response signature invalid");
            return false;
        }

        let sequence_numbers: Vec<u64> = update
            .recovered_logs
            .iter()
            .map(|l| l.sequence_number)
            .collect();
        tracing::info!(%session_id, ?sequence_numbers, "received recovered log entries");

        // Persist every returned entry locally. Re-persisting an entry on a
        // replayed recovery is harmless: the reconstruction below is
        // idempotent on the latest snapshot.
        for entry in &update.recovered_logs {
            if let Err(e) = self.repository.create(entry).await {
                tracing::warn!(%session_id, error = %e, "failed to persist recovered entry");
                return false;
            }
        }

        // Reconstruct from the most recent recovered snapshot.
        let Some(latest) = update
            .recovered_logs
            .iter()
            .max_by_key(|l| l.sequence_number)
        else {
            tracing::warn!(%session_id, "recover response contained no entries");
            return false;
        };
        let snapshot: SessionData = match serde_json::from_str(&latest.data) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "invalid snapshot in recovered entry");
                return false;
            }
        };
        self.reconstruct_session_side(session_id, session_data.role, &snapshot);

        // Acknowledge.
        let success_message = match self
            .client_service
            .create_recover_success_message(session_data, &update)
        {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "failed to build recover success");
                return false;
            }
        };
        let ack = match client
            .request(CrashRequest::RecoverSuccess {
                data: success_message.encode(),
            })
            .await
        {
            Ok(CrashResponse::RecoverSuccess { data }) => RecoverSuccessResponse::decode(&data),
            Ok(CrashResponse::Error { message }) => {
                tracing::warn!(%session_id, error = %message, "recover success rejected");
                return false;
            }
            Ok(_) => {
                tracing::warn!(%session_id, "unexpected response variant to recover success");
                return false;
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "recover success request failed");
                return false;
            }
        };
        match ack {
            Ok(ack) if ack.received => {
                tracing::info!(%session_id, "crash recovery exchange completed");
                true
            }
            Ok(_) => {
                tracing::warn!(%session_id, "counterparty did not acknowledge recovery");
                false
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "invalid recover success ack");
                false
            }
        }
    }

    /// Overwrite one side's stage artifacts from a recovered snapshot.
    fn reconstruct_session_side(&self, session_id: &str, role: Role, snapshot: &SessionData) {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            tracing::warn!(%session_id, "cannot reconstruct: session not tracked");
            return;
        };
        let data = match role {
            Role::Client => session.get_client_session_data_mut(),
            Role::Server => session.get_server_session_data_mut(),
        };
        match data {
            Ok(data) => {
                data.hashes = snapshot.hashes.clone();
                data.processed_timestamps = snapshot.processed_timestamps.clone();
                data.signatures = snapshot.signatures.clone();
                tracing::info!(%session_id, %role, "session artifacts reconstructed");
            }
            Err(e) => {
                tracing::warn!(%session_id, %role, error = %e, "cannot reconstruct side");
            }
        }
    }

    /// Execute a forced rollback: resolve the strategy, run it, and on a
    /// completed execution run cleanup and notify the counterparty.
    /// Without `force` this is a no-op returning true.
    pub async fn initiate_rollback(
        &self,
        session: &SatpSession,
        session_data: &SessionData,
        force_rollback: bool,
    ) -> bool {
        let session_id = session.session_id();

        if !force_rollback {
            tracing::info!(%session_id, "rollback not needed");
            return true;
        }
        tracing::info!(%session_id, role = %session_data.role, "initiating rollback");

        let strategy = match self.factory.create_strategy(session_data) {
            Ok(strategy) => strategy,
            Err(e) => {
                tracing::error!(%session_id, error = %e, "no rollback strategy");
                return false;
            }
        };

        let state = match strategy.execute(session_data, session_data.role).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(%session_id, error = %e, "rollback execution failed");
                return false;
            }
        };

        if state.status != RollbackStatus::Completed {
            tracing::error!(%session_id, status = ?state.status, "rollback did not complete");
            return false;
        }

        let cleanup_ok = match strategy.cleanup(session_data, state.clone()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(%session_id, error = %e, "rollback cleanup failed");
                false
            }
        };

        let ack_ok = self.send_rollback_message(session_data, &state).await;
        cleanup_ok && ack_ok
    }

    /// Report our compensating actions to the counterparty and await its
    /// acknowledgement.
    async fn send_rollback_message(
        &self,
        session_data: &SessionData,
        rollback_state: &RollbackState,
    ) -> bool {
        let session_id = &session_data.id;

        let Some(network) = session_data.recipient_gateway_network_id.as_ref() else {
            tracing::warn!(%session_id, "no recipient network on session");
            return false;
        };
        let channel = match self.orchestrator.get_channel(&network.id) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "no channel to counterparty");
                return false;
            }
        };
        let client = match channel.crash_client() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "no crash client on channel");
                return false;
            }
        };

        let message = match self
            .client_service
            .create_rollback_message(session_data, rollback_state)
        {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "failed to build rollback message");
                return false;
            }
        };

        let response = match client
            .request(CrashRequest::Rollback {
                data: message.encode(),
            })
            .await
        {
            Ok(CrashResponse::Rollback { data }) => RollbackResponse::decode(&data),
            Ok(CrashResponse::Error { message }) => {
                tracing::warn!(%session_id, error = %message, "rollback rejected by counterparty");
                return false;
            }
            Ok(_) => {
                tracing::warn!(%session_id, "unexpected response variant to rollback");
                return false;
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "rollback request failed");
                return false;
            }
        };

        match response {
            Ok(ack) => {
                if let Err(e) = signature_verifier(&ack, session_data) {
                    tracing::warn!(%session_id, error = %e, "rollback ack signature invalid");
                    return false;
                }
                if ack.success {
                    tracing::info!(%session_id, "rollback acknowledged by counterparty");
                } else {
                    tracing::warn!(%session_id, "rollback failed at counterparty");
                }
                ack.success
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "invalid rollback ack");
                false
            }
        }
    }
}

impl Drop for CrashManager {
    fn drop(&mut self) {
        // No leaked background timers once the manager goes away.
        for entry in self.schedulers.iter() {
            entry.value().handle.abort();
        }
    }
}
