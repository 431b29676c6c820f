//! srvwarden
//!
//! Lifecycle management for a single long-running background server: start it
//! detached, stop it gracefully with forced escalation, restart it and report
//! its status, on POSIX systems and on Windows.

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod platform;
pub mod storage;
pub mod supervisor;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::core::models::*;
pub use error::{WardenError, WardenResult};
pub use platform::{ProcessHandler, ProcessManager};
pub use storage::{FilePidStore, MemoryPidStore, PidStore};
pub use supervisor::Supervisor;
