//! Core data model
//!
//! Types shared by the platform handlers, the PID store and the orchestrator.

pub mod models;
