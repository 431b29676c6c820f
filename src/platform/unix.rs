//! POSIX process handler
//!
//! Spawns into a new session (`setsid`) so the server outlives the CLI, probes
//! with signal 0, stops with SIGTERM escalating to SIGKILL and reads usage
//! figures from `ps`.

use async_trait::async_trait;
use chrono::Utc;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{setsid, Pid};
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::{debug, info};

use super::escalation::{escalate_stop, Delivery, SignalSink, StopSignal};
use super::output_parser::parse_ps_row;
use super::{child_output, reap_in_background, ProcessHandler};
use crate::core::models::{ProcessInfo, SpawnRequest, StopPolicy};
use crate::error::{errors, WardenResult};

/// Columns requested from `ps`, in the order `parse_ps_row` expects.
const PS_COLUMNS: &str = "comm,etime,rss,%cpu";

#[derive(Debug, Default, Clone, Copy)]
pub struct UnixProcessHandler;

impl UnixProcessHandler {
    pub fn new() -> Self {
        Self
    }
}

/// PID 0 and negative values address process groups, never signal those.
fn nix_pid(pid: u32) -> Option<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
        _ => None,
    }
}

fn probe(pid: u32) -> bool {
    let Some(target) = nix_pid(pid) else {
        return false;
    };
    match kill(target, None) {
        Ok(()) => !is_zombie(pid),
        Err(Errno::ESRCH) => false,
        // exists, owned by someone else
        Err(Errno::EPERM) => true,
        Err(err) => {
            debug!(pid, error = %err, "liveness probe failed");
            false
        }
    }
}

/// A zombie still answers signal 0 but has already exited.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.trim_start().chars().next()
        })
        .map(|state| state == 'Z')
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[async_trait]
impl SignalSink for UnixProcessHandler {
    fn send(&self, pid: u32, signal: StopSignal) -> WardenResult<Delivery> {
        let Some(target) = nix_pid(pid) else {
            return Ok(Delivery::NoSuchProcess);
        };
        let os_signal = match signal {
            StopSignal::Graceful => Signal::SIGTERM,
            StopSignal::Forceful => Signal::SIGKILL,
        };

        match kill(target, os_signal) {
            Ok(()) => {
                debug!(pid, signal = signal.name(), "signal delivered");
                Ok(Delivery::Delivered)
            }
            Err(Errno::ESRCH) => Ok(Delivery::NoSuchProcess),
            Err(err) => Err(errors::signal_error(pid, signal.name(), err.desc())),
        }
    }

    async fn is_alive(&self, pid: u32) -> bool {
        probe(pid)
    }
}

#[async_trait]
impl ProcessHandler for UnixProcessHandler {
    fn platform(&self) -> &'static str {
        "unix"
    }

    async fn start(&self, request: &SpawnRequest) -> WardenResult<u32> {
        let (stdout, stderr) =
            child_output(request).map_err(|err| errors::spawn_error(&request.program, err))?;

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        // New session: no controlling terminal, no SIGHUP when the CLI exits.
        unsafe {
            command.pre_exec(|| setsid().map(|_| ()).map_err(io::Error::from));
        }

        let child = command
            .spawn()
            .map_err(|err| errors::spawn_error(&request.program, err))?;
        let pid = child.id();
        reap_in_background(child);

        info!(
            pid,
            program = %request.program,
            log = ?request.log_file,
            "spawned detached process"
        );
        Ok(pid)
    }

    async fn stop(&self, pid: u32, policy: &StopPolicy) -> WardenResult<bool> {
        if nix_pid(pid).is_none() {
            return Ok(true);
        }
        escalate_stop(self, pid, policy).await
    }

    async fn is_running(&self, pid: u32) -> bool {
        probe(pid)
    }

    async fn get_process_info(&self, pid: u32) -> Option<ProcessInfo> {
        nix_pid(pid)?;

        let output = tokio::process::Command::new("ps")
            .args(["-p", &pid.to_string(), "-o", PS_COLUMNS])
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let info = parse_ps_row(&stdout, pid, Utc::now());
                if info.is_none() {
                    debug!(pid, status = %output.status, "ps returned no usable row");
                }
                info
            }
            Err(err) => {
                debug!(pid, error = %err, "failed to run ps");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_addressing_pids_are_rejected() {
        assert!(nix_pid(0).is_none());
        assert!(nix_pid(u32::MAX).is_none());
        assert_eq!(nix_pid(42), Some(Pid::from_raw(42)));
    }

    #[test]
    fn init_is_alive() {
        assert!(probe(1));
    }

    #[test]
    fn current_process_is_not_a_zombie() {
        assert!(!is_zombie(std::process::id()));
    }

    #[tokio::test]
    async fn info_for_current_process() {
        let handler = UnixProcessHandler::new();
        let info = handler
            .get_process_info(std::process::id())
            .await
            .expect("ps should report the test binary");
        assert_eq!(info.pid, std::process::id());
        assert!(info.memory_usage > 0);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let handler = UnixProcessHandler::new();
        let request = SpawnRequest::new("/nonexistent/srvw-test-binary", Vec::new());
        let err = handler.start(&request).await.unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Spawn);
        assert!(err.to_string().contains("/nonexistent/srvw-test-binary"));
    }
}
