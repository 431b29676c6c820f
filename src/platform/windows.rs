//! Windows process handler
//!
//! Windows has no two-phase signal model, so `stop` is a single forced
//! `taskkill`. Liveness comes from `tasklist`, usage figures from `wmic`, or
//! from `Get-CimInstance` through PowerShell where `wmic` has been removed.

use async_trait::async_trait;
use chrono::Utc;
use std::os::windows::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};
use windows::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW, DETACHED_PROCESS};

use super::output_parser::{parse_windows_process_info, tasklist_contains_pid};
use super::{child_output, reap_in_background, ProcessHandler};
use crate::core::models::{ProcessInfo, SpawnRequest, StopPolicy};
use crate::error::{errors, WardenResult};

/// `taskkill` exit code when no process matches the PID.
const TASKKILL_NOT_FOUND: i32 = 128;

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsProcessHandler;

impl WindowsProcessHandler {
    pub fn new() -> Self {
        Self
    }
}

/// Run a console utility without flashing a window and capture its stdout.
async fn run_utility(program: &str, args: &[String]) -> Option<std::process::Output> {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW.0);
    match command.output().await {
        Ok(output) => Some(output),
        Err(err) => {
            debug!(program, error = %err, "failed to run utility");
            None
        }
    }
}

/// Whether a failed `taskkill` only means the PID was already gone.
fn is_not_found(code: Option<i32>, stderr: &str) -> bool {
    code == Some(TASKKILL_NOT_FOUND) || stderr.to_lowercase().contains("not found")
}

/// PowerShell script printing the same `Key=Value` lines as `wmic /format:list`.
fn cim_query_script(pid: u32) -> String {
    format!(
        "$p = Get-CimInstance Win32_Process -Filter 'ProcessId={pid}'; \
         if ($p) {{ \
         'Name=' + $p.Name; \
         'WorkingSetSize=' + $p.WorkingSetSize; \
         'CreationDate=' + $p.CreationDate.ToString('yyyyMMddHHmmss'); \
         $c = Get-CimInstance Win32_PerfFormattedData_PerfProc_Process -Filter 'IDProcess={pid}'; \
         if ($c) {{ 'PercentProcessorTime=' + $c.PercentProcessorTime }} }}"
    )
}

async fn wmic_process_info(pid: u32) -> Option<ProcessInfo> {
    let process_args = vec![
        "process".to_string(),
        "where".to_string(),
        format!("ProcessId={pid}"),
        "get".to_string(),
        "CreationDate,Name,WorkingSetSize".to_string(),
        "/format:list".to_string(),
    ];
    let process_output = run_utility("wmic", &process_args).await?;

    // One-shot sample, not continuous monitoring
    let cpu_args = vec![
        "path".to_string(),
        "Win32_PerfFormattedData_PerfProc_Process".to_string(),
        "where".to_string(),
        format!("IDProcess={pid}"),
        "get".to_string(),
        "PercentProcessorTime".to_string(),
        "/format:list".to_string(),
    ];
    let cpu_stdout = run_utility("wmic", &cpu_args)
        .await
        .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
        .unwrap_or_default();

    parse_windows_process_info(
        &String::from_utf8_lossy(&process_output.stdout),
        &cpu_stdout,
        pid,
        Utc::now(),
    )
}

async fn cim_process_info(pid: u32) -> Option<ProcessInfo> {
    let args = vec![
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        cim_query_script(pid),
    ];
    let output = run_utility("powershell", &args).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_windows_process_info(&stdout, &stdout, pid, Utc::now())
}

#[async_trait]
impl ProcessHandler for WindowsProcessHandler {
    fn platform(&self) -> &'static str {
        "windows"
    }

    async fn start(&self, request: &SpawnRequest) -> WardenResult<u32> {
        let (stdout, stderr) =
            child_output(request).map_err(|err| errors::spawn_error(&request.program, err))?;

        // Launched directly, never through `cmd /c`, so the PID is the server's own.
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .creation_flags(DETACHED_PROCESS.0 | CREATE_NEW_PROCESS_GROUP.0);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
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

    async fn stop(&self, pid: u32, _policy: &StopPolicy) -> WardenResult<bool> {
        if pid == 0 {
            return Ok(true);
        }

        let args = vec!["/PID".to_string(), pid.to_string(), "/F".to_string()];
        let Some(output) = run_utility("taskkill", &args).await else {
            return Err(errors::signal_error(pid, "taskkill", "taskkill could not be executed"));
        };

        if output.status.success() {
            info!(pid, "process terminated");
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_not_found(output.status.code(), &stderr) {
            debug!(pid, "process already gone");
            return Ok(true);
        }

        warn!(pid, status = %output.status, %stderr, "taskkill failed");
        Err(errors::signal_error(pid, "taskkill", stderr))
    }

    async fn is_running(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let args = vec![
            "/FI".to_string(),
            format!("PID eq {pid}"),
            "/FO".to_string(),
            "CSV".to_string(),
        ];
        match run_utility("tasklist", &args).await {
            Some(output) => tasklist_contains_pid(&String::from_utf8_lossy(&output.stdout), pid),
            None => false,
        }
    }

    async fn get_process_info(&self, pid: u32) -> Option<ProcessInfo> {
        if pid == 0 {
            return None;
        }

        if let Some(info) = wmic_process_info(pid).await {
            return Some(info);
        }
        debug!(pid, "wmic gave no answer, querying CIM through PowerShell");
        cim_process_info(pid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some(128), "" ; "taskkill not-found exit code")]
    #[test_case(Some(1), "ERROR: The process \"4242\" not found." ; "not-found message")]
    fn gone_process_counts_as_stopped(code: Option<i32>, stderr: &str) {
        assert!(is_not_found(code, stderr));
    }

    #[test_case(Some(1), "ERROR: Access is denied." ; "access denied")]
    #[test_case(None, "" ; "killed without exit code")]
    fn other_taskkill_failures_are_errors(code: Option<i32>, stderr: &str) {
        assert!(!is_not_found(code, stderr));
    }

    #[test]
    fn cim_script_filters_by_pid_and_emits_list_keys() {
        let script = cim_query_script(4242);
        assert!(script.contains("-Filter 'ProcessId=4242'"));
        assert!(script.contains("-Filter 'IDProcess=4242'"));
        for key in ["Name=", "WorkingSetSize=", "CreationDate=", "PercentProcessorTime="] {
            assert!(script.contains(key), "missing {key}");
        }
        assert!(!script.contains('"'));
    }

    #[tokio::test]
    async fn current_process_is_described() {
        let info = WindowsProcessHandler::new()
            .get_process_info(std::process::id())
            .await
            .expect("own process should be visible");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.command.is_empty());
    }
}
