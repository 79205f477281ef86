//! Command implementations for marklock.
//!
//! The CLI has a single command, a batch of runs; this module routes the
//! parsed arguments to it.

mod run;

use crate::cli::Cli;
use crate::error::Result;

/// Dispatch parsed arguments to the run command and return its exit code.
pub fn dispatch(cli: Cli) -> Result<i32> {
    run::cmd_run(cli)
}
