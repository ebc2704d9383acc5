//! Command line interface for xcode_builder.
//!
//! This module wires argument parsing to the two step phases (`run` and
//! `post`) and owns the user-facing output manager.

mod args;
pub mod commands;
mod output;

pub use args::{Args, CleanupSeverity, Command, PostArgs, RunArgs};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}

/// Parse arguments without executing (for testing)
pub fn parse_args() -> Args {
    Args::parse_args()
}

/// Validate arguments without executing (for testing)
pub fn validate_args(args: &Args) -> std::result::Result<(), String> {
    args.validate()
}
