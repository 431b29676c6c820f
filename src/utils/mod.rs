//! Ambient helpers: settings, logging and output formatting

pub mod format;
pub mod logger;
pub mod settings;
