//! Lifecycle orchestration for one managed server
//!
//! Bridges the persisted PID record and the [`ProcessManager`]. Every call
//! re-checks the OS; nothing is cached between invocations except the record.

use crate::config::START_TIME_SLACK;
use crate::core::models::{
    command_matches, PidRecord, ProcessInfo, RestartOutcome, ServerState, SpawnRequest,
    StartOutcome, StatusReport, StopOutcome, StopPolicy,
};
use crate::error::{WardenError, WardenResult};
use crate::platform::ProcessManager;
use crate::storage::PidStore;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Whether a live PID has been taken over by an unrelated process.
///
/// Ours as long as the process started no later than the record was written
/// (within [`START_TIME_SLACK`]). A later start alone is not enough: the
/// reported program must also differ, since wrappers and `env` shebangs make
/// the OS name an unreliable identity on its own.
fn is_recycled(record: &PidRecord, info: &ProcessInfo) -> bool {
    let Some(recorded_at) = record.started_at else {
        return false;
    };
    let slack = chrono::Duration::from_std(START_TIME_SLACK)
        .unwrap_or_else(|_| chrono::Duration::zero());
    let started_later = info.start_time > recorded_at + slack;
    started_later && !command_matches(&record.command, &info.command)
}

pub struct Supervisor<S: PidStore> {
    name: String,
    manager: ProcessManager,
    store: S,
    policy: StopPolicy,
    log_file: Option<PathBuf>,
}

impl<S: PidStore> Supervisor<S> {
    pub fn new(name: impl Into<String>, manager: ProcessManager, store: S) -> Self {
        Self {
            name: name.into(),
            manager,
            store,
            policy: StopPolicy::default(),
            log_file: None,
        }
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Default log target for spawns that do not name one.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the record and confirm it still refers to our server.
    ///
    /// Dead PIDs and PIDs recycled by an unrelated process are cleared and
    /// reported as `None`.
    async fn live_process(&self) -> WardenResult<Option<(PidRecord, Option<ProcessInfo>)>> {
        let Some(record) = self.store.load(&self.name)? else {
            return Ok(None);
        };

        if !self.manager.is_running(record.pid).await {
            debug!(name = %self.name, pid = record.pid, "recorded PID is not running");
            self.store.clear(&self.name)?;
            return Ok(None);
        }

        let info = self.manager.get_process_info(record.pid).await;
        if let Some(info) = &info {
            if is_recycled(&record, info) {
                warn!(
                    name = %self.name,
                    pid = record.pid,
                    expected = %record.command,
                    found = %info.command,
                    started = %info.start_time,
                    "recorded PID now belongs to a newer, unrelated process, discarding record"
                );
                self.store.clear(&self.name)?;
                return Ok(None);
            }
            if !command_matches(&record.command, &info.command) {
                debug!(
                    pid = record.pid,
                    expected = %record.command,
                    found = %info.command,
                    "program name differs but process predates the record, keeping it"
                );
            }
        }

        Ok(Some((record, info)))
    }

    pub async fn status(&self) -> WardenResult<StatusReport> {
        let report = match self.live_process().await? {
            Some((record, info)) => StatusReport {
                name: self.name.clone(),
                state: ServerState::Running,
                pid: Some(record.pid),
                info,
                log_file: self.log_file.clone(),
            },
            None => StatusReport {
                log_file: self.log_file.clone(),
                ..StatusReport::stopped(&self.name)
            },
        };
        Ok(report)
    }

    /// Idempotent: a live server is reported, never duplicated.
    pub async fn start(&self, request: &SpawnRequest) -> WardenResult<StartOutcome> {
        if let Some((record, _)) = self.live_process().await? {
            info!(name = %self.name, pid = record.pid, "already running");
            return Ok(StartOutcome::AlreadyRunning { pid: record.pid });
        }

        let mut request = request.clone();
        if request.log_file.is_none() {
            request.log_file = self.log_file.clone();
        }

        let pid = self.manager.start(&request).await?;
        let record = PidRecord::new(&self.name, pid, request.program_name());

        if let Err(err) = self.store.save(&record) {
            // an unrecorded server could never be stopped by name
            warn!(name = %self.name, pid, error = %err, "could not persist PID, stopping server");
            return match self.manager.stop(pid, &self.policy).await {
                Ok(true) => Err(err),
                Ok(false) => {
                    warn!(name = %self.name, pid, "server survived cleanup stop, left running unrecorded");
                    Err(err.with_orphan_pid(pid))
                }
                Err(stop_err) => {
                    warn!(
                        name = %self.name,
                        pid,
                        error = %stop_err,
                        "cleanup stop failed, server left running unrecorded"
                    );
                    Err(err.with_orphan_pid(pid))
                }
            };
        }

        info!(name = %self.name, pid, "server started");
        Ok(StartOutcome::Started { pid })
    }

    /// Idempotent: stopping a stopped server succeeds. On failure the record
    /// is kept so the stop can be retried.
    pub async fn stop(&self) -> WardenResult<StopOutcome> {
        let Some((record, _)) = self.live_process().await? else {
            info!(name = %self.name, "already stopped");
            return Ok(StopOutcome::AlreadyStopped);
        };

        let pid = record.pid;
        match self.manager.stop(pid, &self.policy).await {
            Ok(true) => {
                self.store.clear(&self.name)?;
                info!(name = %self.name, pid, "server stopped");
                Ok(StopOutcome::Stopped { pid })
            }
            Ok(false) => {
                warn!(name = %self.name, pid, "server survived termination, keeping PID record");
                Err(WardenError::StopFailed { pid })
            }
            Err(err) => {
                warn!(name = %self.name, pid, error = %err, "stop failed, keeping PID record");
                Err(err)
            }
        }
    }

    /// Stop (nothing-to-stop is fine) then start.
    pub async fn restart(&self, request: &SpawnRequest) -> WardenResult<RestartOutcome> {
        let stop = self.stop().await?;
        let start = self.start(request).await?;
        Ok(RestartOutcome { stop, start })
    }
}
