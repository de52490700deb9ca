//! CLI command handling module
//!
//! Handles all CLI subcommands and argument parsing.

mod commands;
mod config;
mod logging;
mod output;

pub use commands::{Command, RunArgs, run_command};
pub use config::handle_config_command;
pub use logging::init_logging;
