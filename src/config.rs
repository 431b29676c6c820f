use std::time::Duration;

pub const APP_DIRECTORY: &str = ".srvw";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATE_DIRECTORY: &str = "state";
pub const LOG_DIRECTORY: &str = "logs";
pub const PID_FILE_SUFFIX: &str = ".pid.json";

pub const ENV_PREFIX: &str = "SRVW";
pub const DEFAULT_SERVER_NAME: &str = "review-server";

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tolerance when comparing a process start time with its PID record.
pub const START_TIME_SLACK: Duration = Duration::from_secs(5);
