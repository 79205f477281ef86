//! Marklock: a mutual-exclusion test harness.
//!
//! Races workers over a shared file under a chosen lock backend and reports
//! whether their critical sections overlapped. This is the entry point for
//! the `marklock` CLI: it parses arguments, dispatches to the command
//! handler, and maps the result to an exit code.

mod cli;
mod commands;
pub mod config;
pub mod coordination;
pub mod detector;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod harness;
pub mod jitter;
pub mod locks;
pub mod resource;
pub mod worker;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
