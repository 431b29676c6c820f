//! Shared data model
//!
//! Snapshots, launch requests, stop policy and the outcome records reported
//! back to callers of the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL};

/// Point-in-time snapshot of a running process.
///
/// Produced on demand by a handler query and owned by the caller; it is never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// OS process identifier (always > 0)
    pub pid: u32,
    /// Executable/image name as reported by the OS
    pub command: String,
    /// Estimated start time (now minus reported elapsed time, second precision)
    pub start_time: DateTime<Utc>,
    /// Resident memory in bytes, 0 when unavailable
    pub memory_usage: u64,
    /// CPU percentage; values above 100 are kept as reported
    pub cpu_usage: f64,
}

impl ProcessInfo {
    /// Uptime relative to `now`, clamped at zero.
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Everything needed to launch the managed server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// stdout/stderr of the child are appended here; discarded when `None`
    pub log_file: Option<PathBuf>,
}

impl SpawnRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::default()
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Base name of the program, used to recognise the process later.
    pub fn program_name(&self) -> String {
        executable_name(&self.program)
    }
}

/// Grace window for `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Total time the process gets to exit after the graceful signal
    pub grace_period: Duration,
    /// Delay between liveness probes, and after the forceful signal
    pub poll_interval: Duration,
}

impl StopPolicy {
    pub fn new(grace_period: Duration, poll_interval: Duration) -> Self {
        Self {
            grace_period,
            poll_interval,
        }
    }
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL)
    }
}

/// Persisted last-known PID of a managed process. May be stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidRecord {
    pub name: String,
    pub pid: u32,
    /// Executable base name at launch time
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl PidRecord {
    pub fn new(name: impl Into<String>, pid: u32, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pid,
            command: command.into(),
            started_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Running,
    Stopped,
}

/// Result of a `status` check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub state: ServerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ProcessInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl StatusReport {
    pub fn stopped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServerState::Stopped,
            pid: None,
            info: None,
            log_file: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

impl StartOutcome {
    pub fn pid(&self) -> u32 {
        match self {
            StartOutcome::Started { pid } | StartOutcome::AlreadyRunning { pid } => *pid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped { pid: u32 },
    AlreadyStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestartOutcome {
    pub stop: StopOutcome,
    pub start: StartOutcome,
}

/// Normalised executable base name: directory, `.exe` suffix and case removed.
pub fn executable_name(program: &str) -> String {
    let base = program
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(program)
        .trim()
        .to_lowercase();
    match base.strip_suffix(".exe") {
        Some(stripped) => stripped.to_string(),
        None => base,
    }
}

/// Whether an OS-reported command name plausibly belongs to `expected`.
///
/// Linux truncates `comm` to 15 bytes, so a prefix match in either direction
/// counts. An empty side matches everything.
pub fn command_matches(expected: &str, reported: &str) -> bool {
    let expected = executable_name(expected);
    let reported = executable_name(reported);
    if expected.is_empty() || reported.is_empty() {
        return true;
    }
    expected.starts_with(&reported) || reported.starts_with(&expected)
}

/// Default log file for a managed name inside `log_dir`.
pub fn log_file_for(log_dir: &Path, name: &str) -> PathBuf {
    log_dir.join(format!("{name}.log"))
}
