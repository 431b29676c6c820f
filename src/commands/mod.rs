//! Command-line surface

pub mod parser;
pub mod server;

pub use parser::{Cli, Commands};
pub use server::{render_error, run};
