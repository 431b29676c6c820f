//! Platform process handling
//!
//! [`ProcessHandler`] is the capability every OS family implements. The
//! [`ProcessManager`] facade picks the implementation for the host once, at
//! construction, and forwards every call to it unchanged.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::models::{ProcessInfo, SpawnRequest, StopPolicy};
use crate::error::WardenResult;

pub mod escalation;
pub mod output_parser;

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

/// Spawn, signal and query operations for one OS family.
///
/// Handlers are stateless between calls. Soft conditions (no such process,
/// unparseable utility output) are absorbed: `is_running` answers `false`,
/// `stop` answers `true`, `get_process_info` answers `None`.
#[async_trait]
pub trait ProcessHandler: Send + Sync {
    /// Short platform label for diagnostics
    fn platform(&self) -> &'static str;

    /// Launch a detached process and return its PID without waiting for it to
    /// initialise.
    async fn start(&self, request: &SpawnRequest) -> WardenResult<u32>;

    /// Terminate `pid`. `Ok(true)` when the process is gone (or never existed).
    async fn stop(&self, pid: u32, policy: &StopPolicy) -> WardenResult<bool>;

    /// Non-destructive existence probe.
    async fn is_running(&self, pid: u32) -> bool;

    /// Resource-usage snapshot, `None` when unavailable.
    async fn get_process_info(&self, pid: u32) -> Option<ProcessInfo>;
}

/// Handler for the host operating system.
pub fn host_handler() -> Arc<dyn ProcessHandler> {
    #[cfg(unix)]
    {
        Arc::new(unix::UnixProcessHandler::new())
    }

    #[cfg(windows)]
    {
        Arc::new(windows::WindowsProcessHandler::new())
    }
}

/// OS-independent entry point. Pure delegation: no retries, no caching.
#[derive(Clone)]
pub struct ProcessManager {
    handler: Arc<dyn ProcessHandler>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::with_handler(host_handler())
    }

    pub fn with_handler(handler: Arc<dyn ProcessHandler>) -> Self {
        Self { handler }
    }

    pub fn platform(&self) -> &'static str {
        self.handler.platform()
    }

    pub async fn start(&self, request: &SpawnRequest) -> WardenResult<u32> {
        self.handler.start(request).await
    }

    pub async fn stop(&self, pid: u32, policy: &StopPolicy) -> WardenResult<bool> {
        self.handler.stop(pid, policy).await
    }

    pub async fn is_running(&self, pid: u32) -> bool {
        self.handler.is_running(pid).await
    }

    pub async fn get_process_info(&self, pid: u32) -> Option<ProcessInfo> {
        self.handler.get_process_info(pid).await
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Hand the child to a background thread that only waits for its exit status,
/// so the launcher never keeps a zombie around while it is still running. The
/// thread never touches the child's streams and disappears with the launcher.
pub(crate) fn reap_in_background(mut child: std::process::Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reaper-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => tracing::debug!(pid, %status, "detached child exited"),
            Err(err) => tracing::debug!(pid, error = %err, "failed to wait on detached child"),
        });
    if let Err(err) = spawned {
        tracing::warn!(pid, error = %err, "could not start reaper thread");
    }
}

/// Open the append-only log target for a child's stdout and stderr.
pub(crate) fn child_output(
    request: &SpawnRequest,
) -> std::io::Result<(std::process::Stdio, std::process::Stdio)> {
    use std::process::Stdio;

    match &request.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let stderr = file.try_clone()?;
            Ok((Stdio::from(file), Stdio::from(stderr)))
        }
        None => Ok((Stdio::null(), Stdio::null())),
    }
}
