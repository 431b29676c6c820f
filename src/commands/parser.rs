//! Command-line definition

use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::utils::settings::SettingsOverrides;

/// srvw - manage one long-running background server
#[derive(Parser, Debug, Clone)]
#[command(
    name = "srvw",
    about = "Start, stop, restart and inspect a background server",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags accepted before or after any subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: ~/.srvw/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Name of the managed server
    #[arg(short, long, global = true)]
    pub name: Option<String>,

    /// Directory holding PID records
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Directory receiving server output
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Diagnostic filter, e.g. `debug` or `srvwarden=trace` (default: `RUST_LOG`, else `warn`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also append srvw's own diagnostics (not the server's output) to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

/// Launch arguments shared by `start` and `restart`.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchArgs {
    /// Server command and its arguments, after `--`
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Stop timing shared by `stop` and `restart`.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StopArgs {
    /// Time allowed for a graceful exit before forcing, in milliseconds
    #[arg(long = "grace-ms", value_name = "MS")]
    pub grace_period_ms: Option<u64>,

    /// Interval between liveness checks, in milliseconds
    #[arg(long = "poll-ms", value_name = "MS")]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show whether the server is running (default)
    Status,

    /// Start the server unless it is already running
    Start {
        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Stop the server, escalating to a forced kill after the grace period
    Stop {
        #[command(flatten)]
        stop: StopArgs,
    },

    /// Stop then start the server
    Restart {
        #[command(flatten)]
        launch: LaunchArgs,
        #[command(flatten)]
        stop: StopArgs,
    },
}

impl Cli {
    pub fn try_parse_args_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Cli::try_parse_from(iter)
    }

    /// Subcommand to run; none means `status`.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Status)
    }

    /// Command-line layer for the settings loader.
    pub fn overrides(&self) -> SettingsOverrides {
        let mut overrides = SettingsOverrides {
            name: self.global.name.clone(),
            state_dir: self.global.state_dir.clone(),
            log_dir: self.global.log_dir.clone(),
            ..Default::default()
        };

        let (launch, stop) = match &self.command {
            Some(Commands::Start { launch }) => (Some(launch), None),
            Some(Commands::Stop { stop }) => (None, Some(stop)),
            Some(Commands::Restart { launch, stop }) => (Some(launch), Some(stop)),
            Some(Commands::Status) | None => (None, None),
        };

        if let Some((program, args)) = launch.and_then(|launch| launch.command.split_first()) {
            overrides.command = Some(program.clone());
            overrides.args = Some(args.to_vec());
        }
        if let Some(stop) = stop {
            overrides.grace_period_ms = stop.grace_period_ms;
            overrides.poll_interval_ms = stop.poll_interval_ms;
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_args_from(args).unwrap()
    }

    #[test]
    fn no_subcommand_means_status() {
        let cli = parse(&["srvw"]);
        assert_eq!(cli.command(), Commands::Status);
        assert_eq!(cli.global.log_level, None);
        assert_eq!(cli.global.log_file, None);
        assert!(!cli.global.json);
    }

    #[test]
    fn logging_flags_are_global() {
        let cli = parse(&[
            "srvw",
            "stop",
            "--log-level",
            "srvwarden=trace",
            "--log-file",
            "/tmp/srvw-diag.log",
        ]);
        assert_eq!(cli.global.log_level.as_deref(), Some("srvwarden=trace"));
        assert_eq!(cli.global.log_file, Some(PathBuf::from("/tmp/srvw-diag.log")));
    }

    #[test]
    fn start_takes_trailing_command() {
        let cli = parse(&["srvw", "start", "--", "node", "server.js", "--port", "4000"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.command.as_deref(), Some("node"));
        assert_eq!(
            overrides.args,
            Some(vec!["server.js".to_string(), "--port".into(), "4000".into()])
        );
    }

    #[test]
    fn start_without_command_leaves_config_alone() {
        let cli = parse(&["srvw", "start"]);
        let overrides = cli.overrides();
        assert!(overrides.command.is_none());
        assert!(overrides.args.is_none());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["srvw", "stop", "--name", "docs", "--grace-ms", "750", "--json"]);
        assert!(cli.global.json);
        let overrides = cli.overrides();
        assert_eq!(overrides.name.as_deref(), Some("docs"));
        assert_eq!(overrides.grace_period_ms, Some(750));
        assert_eq!(overrides.poll_interval_ms, None);
    }

    #[test]
    fn restart_accepts_stop_and_launch_args() {
        let cli = parse(&["srvw", "restart", "--poll-ms", "50", "--", "./serve"]);
        let overrides = cli.overrides();
        assert_eq!(overrides.poll_interval_ms, Some(50));
        assert_eq!(overrides.command.as_deref(), Some("./serve"));
        assert_eq!(overrides.args, Some(Vec::new()));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_args_from(["srvw", "launch"]).is_err());
    }
}
