//! CLI argument parsing for marklock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! Flags override the values loaded from `--config`; the actual work happens
//! in the `commands` module.

use crate::config::BackendKind;
use clap::Parser;
use std::path::PathBuf;

/// Marklock: exercise a lock backend by racing workers over a shared file
/// and checking whether their critical sections overlapped.
///
/// Each worker writes `<`, sleeps for a random while, then writes `>`.
/// A serialized run leaves `<><>...<>`; anything else is garbled.
#[derive(Parser, Debug)]
#[command(name = "marklock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Lock backend guarding the critical section (unsafe, polling, leased).
    #[arg(value_parser = parse_backend)]
    pub backend: BackendKind,

    /// Number of concurrent workers per run.
    #[arg(short, long)]
    pub workers: Option<u32>,

    /// Number of runs, each against a fresh resource.
    #[arg(short, long)]
    pub runs: Option<u32>,

    /// Master seed for reproducible sleeps and backoff.
    #[arg(long)]
    pub seed: Option<u64>,

    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Append NDJSON run events to this file.
    #[arg(long)]
    pub event_log: Option<PathBuf>,

    /// Keep resource and lock files after each run.
    #[arg(long)]
    pub keep_files: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    BackendKind::from_str(s).ok_or_else(|| {
        format!(
            "unknown backend '{}' (expected one of: unsafe, polling, leased)",
            s
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_backend_only() {
        let cli = Cli::try_parse_from(["marklock", "polling"]).unwrap();
        assert_eq!(cli.backend, BackendKind::Polling);
        assert_eq!(cli.workers, None);
        assert_eq!(cli.runs, None);
        assert!(!cli.keep_files);
    }

    #[test]
    fn parse_all_flags() {
        let cli = Cli::try_parse_from([
            "marklock",
            "leased",
            "--workers",
            "8",
            "--runs",
            "3",
            "--seed",
            "1234",
            "--config",
            "marklock.yaml",
            "--event-log",
            "events.ndjson",
            "--keep-files",
        ])
        .unwrap();

        assert_eq!(cli.backend, BackendKind::Leased);
        assert_eq!(cli.workers, Some(8));
        assert_eq!(cli.runs, Some(3));
        assert_eq!(cli.seed, Some(1234));
        assert_eq!(cli.config, Some(PathBuf::from("marklock.yaml")));
        assert_eq!(cli.event_log, Some(PathBuf::from("events.ndjson")));
        assert!(cli.keep_files);
    }

    #[test]
    fn parse_short_flags() {
        let cli = Cli::try_parse_from(["marklock", "unsafe", "-w", "2", "-r", "5"]).unwrap();
        assert_eq!(cli.backend, BackendKind::Unsafe);
        assert_eq!(cli.workers, Some(2));
        assert_eq!(cli.runs, Some(5));
    }

    #[test]
    fn reject_unknown_backend() {
        let err = Cli::try_parse_from(["marklock", "spinlock"]).unwrap_err();
        assert!(err.to_string().contains("unknown backend 'spinlock'"));
    }

    #[test]
    fn backend_is_required() {
        assert!(Cli::try_parse_from(["marklock"]).is_err());
    }
}
