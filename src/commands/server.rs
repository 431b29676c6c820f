//! Subcommand execution and result rendering

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, warn};

use super::parser::{Cli, Commands};
use crate::core::models::{RestartOutcome, StartOutcome, StatusReport, StopOutcome};
use crate::error::{ErrorSeverity, WardenError, WardenResult};
use crate::platform::ProcessManager;
use crate::storage::FilePidStore;
use crate::supervisor::Supervisor;
use crate::utils::format::{format_cpu, format_memory, format_uptime};
use crate::utils::settings::WardenSettings;

/// JSON envelope naming the managed server alongside a result.
#[derive(Serialize)]
struct Named<'a, T: Serialize> {
    name: &'a str,
    #[serde(flatten)]
    result: &'a T,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(body) => println!("{body}"),
        Err(err) => warn!(error = %err, "failed to encode result as JSON"),
    }
}

/// Resolve settings and run the requested subcommand.
pub async fn run(cli: &Cli) -> WardenResult<()> {
    let mut settings = WardenSettings::load(cli.global.config.as_deref())?;
    settings.apply(cli.overrides());
    settings.validate()?;
    debug!(?settings, "settings resolved");

    let supervisor = Supervisor::new(
        settings.name(),
        ProcessManager::new(),
        FilePidStore::new(settings.state_dir()?),
    )
    .with_stop_policy(settings.stop_policy())
    .with_log_file(settings.log_file());

    let name = supervisor.name().to_string();
    let json = cli.global.json;

    match cli.command() {
        Commands::Status => {
            let report = supervisor.status().await?;
            if json {
                print_json(&report);
            } else {
                println!("{}", render_status(&report, Utc::now()));
            }
        }
        Commands::Start { .. } => {
            let request = settings.spawn_request()?;
            let outcome = supervisor.start(&request).await?;
            if json {
                print_json(&Named { name: &name, result: &outcome });
            } else {
                println!("{}", render_start(&name, &outcome));
            }
        }
        Commands::Stop { .. } => {
            let outcome = supervisor.stop().await?;
            if json {
                print_json(&Named { name: &name, result: &outcome });
            } else {
                println!("{}", render_stop(&name, &outcome));
            }
        }
        Commands::Restart { .. } => {
            let request = settings.spawn_request()?;
            let outcome = supervisor.restart(&request).await?;
            if json {
                print_json(&Named { name: &name, result: &outcome });
            } else {
                println!("{}", render_restart(&name, &outcome));
            }
        }
    }
    Ok(())
}

pub fn render_status(report: &StatusReport, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();

    if report.is_running() {
        lines.push(format!("{} {} is running", "●".green(), report.name.cyan()));
        if let Some(pid) = report.pid {
            lines.push(format!("  PID:     {pid}"));
        }
        if let Some(info) = &report.info {
            lines.push(format!("  Command: {}", info.command));
            lines.push(format!("  Uptime:  {}", format_uptime(info.uptime(now))));
            lines.push(format!("  Memory:  {}", format_memory(info.memory_usage)));
            lines.push(format!("  CPU:     {}", format_cpu(info.cpu_usage)));
        }
    } else {
        lines.push(format!("{} {} is stopped", "○".dimmed(), report.name.cyan()));
    }

    if let Some(log) = &report.log_file {
        lines.push(format!("  Log:     {}", log.display()));
    }
    lines.join("\n")
}

pub fn render_start(name: &str, outcome: &StartOutcome) -> String {
    match outcome {
        StartOutcome::Started { pid } => {
            format!("{} {} started (PID {pid})", "✅".green(), name.cyan())
        }
        StartOutcome::AlreadyRunning { pid } => {
            format!("{} {} already running (PID {pid})", "ℹ".yellow(), name.cyan())
        }
    }
}

pub fn render_stop(name: &str, outcome: &StopOutcome) -> String {
    match outcome {
        StopOutcome::Stopped { pid } => {
            format!("{} {} stopped (PID {pid})", "✅".green(), name.cyan())
        }
        StopOutcome::AlreadyStopped => {
            format!("{} {} already stopped", "ℹ".yellow(), name.cyan())
        }
    }
}

pub fn render_restart(name: &str, outcome: &RestartOutcome) -> String {
    format!(
        "{}\n{}",
        render_stop(name, &outcome.stop),
        render_start(name, &outcome.start)
    )
}

/// Failure report for stderr, highlighted by severity.
pub fn render_error(err: &WardenError) -> String {
    let facing = err.to_user_facing();
    let title = match err.severity() {
        ErrorSeverity::High => facing.title.red().bold(),
        ErrorSeverity::Medium => facing.title.yellow().bold(),
        ErrorSeverity::Low => facing.title.normal(),
    };

    let mut lines = vec![format!("{} {title}: {}", "❌".red(), facing.message)];
    if let Some(hint) = facing.hint {
        lines.push(format!("   {hint}"));
    }
    if err.is_recoverable() {
        lines.push(format!("   {}", "Nothing was lost; the command can be retried.".dimmed()));
    }
    lines.join("\n")
}
