//! Command-line interface for planguard.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
