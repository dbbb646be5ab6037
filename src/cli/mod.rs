//! CLI module
//!
//! Command-line interface for running a sync.
//!
//! # Commands
//!
//! - `check` - Exchange credentials and probe the API
//! - `streams` - List stream names in sync order
//! - `read` - Extract data from streams

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
