//! Unified error handling for srvwarden
//!
//! Hard failures (a spawn that never happened, a signal that could not be
//! delivered) are represented here. Soft conditions such as "no such process" or
//! unparseable OS utility output never become a `WardenError`; the platform
//! handlers absorb them into `false` / `None` / zero values.

use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum WardenError {
    /// The executable could not be launched at all
    #[error("Failed to spawn '{command}': {message}")]
    Spawn {
        command: String,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// A termination signal could not be delivered (other than "not found")
    #[error("Failed to send {signal} to PID {pid}: {message}")]
    Signal {
        pid: u32,
        signal: String,
        message: String,
    },

    /// Kill was sent but the process is still observed alive
    #[error("Process {pid} is still running after forced termination")]
    StopFailed { pid: u32 },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persisted PID record could not be read or written
    #[error("Storage error: {message} (path: {path})")]
    Storage {
        message: String,
        path: String,
        /// Server left running without a record because of this failure
        orphan_pid: Option<u32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Spawn,
    Signal,
    Config,
    Storage,
    Validation,
}

impl ErrorCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorCategory::Spawn => "Launch",
            ErrorCategory::Signal => "Termination",
            ErrorCategory::Config => "Configuration",
            ErrorCategory::Storage => "State",
            ErrorCategory::Validation => "Validation",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

/// Rich, user-friendly error information printed by the CLI.
#[derive(Debug, Clone)]
pub struct UserFacingError {
    pub title: String,
    pub message: String,
    pub hint: Option<String>,
}

impl WardenError {
    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            WardenError::Spawn { .. } => ErrorCategory::Spawn,
            WardenError::Signal { .. } | WardenError::StopFailed { .. } => ErrorCategory::Signal,
            WardenError::Config { .. } => ErrorCategory::Config,
            WardenError::Storage { .. } => ErrorCategory::Storage,
            WardenError::Validation { .. } => ErrorCategory::Validation,
        }
    }

    /// Get error severity
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WardenError::Spawn { .. } => ErrorSeverity::High,
            WardenError::Signal { .. } => ErrorSeverity::Medium,
            WardenError::StopFailed { .. } => ErrorSeverity::High,
            WardenError::Config { .. } => ErrorSeverity::High,
            WardenError::Storage { .. } => ErrorSeverity::Medium,
            WardenError::Validation { .. } => ErrorSeverity::Low,
        }
    }

    /// A retry (possibly with different privileges or settings) can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WardenError::Signal { .. } | WardenError::StopFailed { .. } | WardenError::Storage { .. }
        )
    }

    /// Mark a storage failure as having left `pid` running unrecorded.
    pub fn with_orphan_pid(self, pid: u32) -> Self {
        match self {
            WardenError::Storage {
                message,
                path,
                source,
                ..
            } => WardenError::Storage {
                message,
                path,
                orphan_pid: Some(pid),
                source,
            },
            other => other,
        }
    }

    /// PID involved in the failure, if any.
    pub fn pid(&self) -> Option<u32> {
        match self {
            WardenError::Signal { pid, .. } | WardenError::StopFailed { pid } => Some(*pid),
            WardenError::Storage { orphan_pid, .. } => *orphan_pid,
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            WardenError::Spawn {
                command, message, ..
            } => format!("Could not launch '{command}': {message}"),
            WardenError::Signal {
                pid,
                signal,
                message,
            } => format!("Could not deliver {signal} to PID {pid}: {message}"),
            WardenError::StopFailed { pid } => {
                format!("PID {pid} survived SIGKILL-equivalent termination")
            }
            WardenError::Config { message, .. } => message.clone(),
            WardenError::Storage {
                message,
                path,
                orphan_pid: Some(pid),
                ..
            } => format!(
                "{message} ({path}); server PID {pid} is still running without a PID record"
            ),
            WardenError::Storage { message, path, .. } => format!("{message} ({path})"),
            WardenError::Validation { message, field } => match field {
                Some(field) => format!("{field}: {message}"),
                None => message.clone(),
            },
        }
    }

    /// Convert into a user-facing payload with actionable hints.
    pub fn to_user_facing(&self) -> UserFacingError {
        let hint = match self {
            WardenError::Spawn { .. } => Some(
                "Check that `server.command` exists and is executable (absolute path or on PATH)."
                    .to_string(),
            ),
            WardenError::Signal { .. } => Some(
                "The process may belong to another user. Retry with sufficient privileges; the PID record was kept."
                    .to_string(),
            ),
            WardenError::StopFailed { .. } => Some(
                "The PID record was kept so `srvw stop` can be retried.".to_string(),
            ),
            WardenError::Config { .. } => {
                Some("Fix ~/.srvw/config.toml or the SRVW_* environment variables.".to_string())
            }
            WardenError::Storage {
                orphan_pid: Some(pid),
                ..
            } => Some(format!(
                "Stop PID {pid} manually, then fix the state directory permissions."
            )),
            WardenError::Storage { .. } => Some(
                "Ensure the state directory exists and is writable by the current user."
                    .to_string(),
            ),
            WardenError::Validation { .. } => {
                Some("Correct the provided value and try again.".to_string())
            }
        };

        UserFacingError {
            title: format!("{} Error", self.category().display_name()),
            message: self.user_message(),
            hint,
        }
    }
}

/// Result type alias for convenience
pub type WardenResult<T> = Result<T, WardenError>;

impl From<config::ConfigError> for WardenError {
    fn from(err: config::ConfigError) -> Self {
        WardenError::Config {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Convenience functions for creating common errors
pub mod errors {
    use super::*;

    pub fn spawn_error(command: impl Into<String>, source: io::Error) -> WardenError {
        WardenError::Spawn {
            command: command.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn signal_error(
        pid: u32,
        signal: impl Into<String>,
        message: impl Into<String>,
    ) -> WardenError {
        WardenError::Signal {
            pid,
            signal: signal.into(),
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> WardenError {
        WardenError::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_error(
        message: impl Into<String>,
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> WardenError {
        WardenError::Storage {
            message: message.into(),
            path: path.into(),
            orphan_pid: None,
            source: Some(Box::new(source)),
        }
    }

    pub fn validation_error(message: impl Into<String>, field: Option<String>) -> WardenError {
        WardenError::Validation {
            message: message.into(),
            field,
        }
    }
}
