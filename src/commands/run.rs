//! Implementation of a marklock batch.
//!
//! Loads configuration, applies flag overrides, runs the batch and prints
//! one line per run followed by a summary.

use crate::cli::Cli;
use crate::config::Config;
use crate::detector::Scan;
use crate::error::Result;
use crate::events::EventLog;
use crate::exit_codes;
use crate::harness::{Backend, BatchSummary, Harness, RunOutcome, RunStatus};

/// Execute a batch and return the process exit code.
///
/// Configuration errors are returned as `Err`; garbled or failed runs are
/// reported and turned into [`exit_codes::RUN_FAILURE`].
pub fn cmd_run(cli: Cli) -> Result<i32> {
    let config = resolve_config(&cli)?;
    let backend = Backend::from_config(cli.backend, &config)?;
    let events = match &config.event_log {
        Some(path) => EventLog::to_file(path),
        None => EventLog::disabled(),
    };

    println!(
        "Running {} run(s) of {} worker(s) with the {} backend",
        config.runs, config.workers, cli.backend
    );

    let runs = config.runs;
    let harness = Harness::new(backend, &config, events);
    let summary = harness.run_batch(|run, result| print_run(run, runs, result));

    print_summary(&summary);

    Ok(if summary.is_clean() {
        exit_codes::SUCCESS
    } else {
        exit_codes::RUN_FAILURE
    })
}

/// Config file (or defaults) with command line overrides applied.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(runs) = cli.runs {
        config.runs = runs;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.event_log.is_some() {
        config.event_log = cli.event_log.clone();
    }
    if cli.keep_files {
        config.keep_files = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_run(run: u32, runs: u32, result: &Result<RunOutcome>) {
    let label = format!("run {}/{}", run + 1, runs);

    match result {
        Ok(outcome) => {
            let status = outcome.status();
            println!(
                "{}: {}, {} (seed {})",
                label,
                status,
                describe_scan(&outcome.scan),
                outcome.seed
            );
            if status == RunStatus::Failed {
                for failure in outcome.failures() {
                    if let Err(e) = &failure.result {
                        println!("  - {}", e);
                    }
                }
            }
        }
        Err(e) => println!("{}: failed: {}", label, e),
    }
}

/// Where the stream broke, or how many sections it held.
fn describe_scan(scan: &Scan) -> String {
    match scan.mismatch {
        Some((offset, byte)) => format!(
            "overlap at byte {} ({:?}) after {} section(s)",
            offset,
            char::from(byte),
            scan.sections()
        ),
        None => format!("{} section(s)", scan.sections()),
    }
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!(
        "{} run(s): {} clean, {} garbled, {} failed",
        summary.total(),
        summary.clean,
        summary.garbled,
        summary.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("marklock").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_config_file() {
        let config = resolve_config(&cli(&["unsafe"])).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.runs, 1);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marklock.yaml");
        std::fs::write(&path, "workers: 4\nruns: 9\nseed: 1\nmax_critical_sleep_ms: 7\n").unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let config = resolve_config(&cli(&[
            "polling",
            "--config",
            &path_arg,
            "--workers",
            "6",
            "--seed",
            "99",
            "--keep-files",
        ]))
        .unwrap();

        assert_eq!(config.workers, 6);
        assert_eq!(config.runs, 9);
        assert_eq!(config.seed, Some(99));
        assert_eq!(config.max_critical_sleep_ms, 7);
        assert!(config.keep_files);
    }

    #[test]
    fn test_zero_workers_is_user_error() {
        let err = resolve_config(&cli(&["unsafe", "--workers", "0"])).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn test_missing_config_file_is_user_error() {
        let err = resolve_config(&cli(&["unsafe", "--config", "/nonexistent/marklock.yaml"]))
            .unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn test_clean_batch_exits_successfully() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marklock.yaml");
        let log = temp_dir.path().join("events.ndjson");
        std::fs::write(
            &path,
            format!(
                "max_critical_sleep_ms: 2\ntemp_dir: {}\n",
                temp_dir.path().display()
            ),
        )
        .unwrap();

        let code = cmd_run(Cli {
            backend: BackendKind::Polling,
            workers: Some(3),
            runs: Some(2),
            seed: Some(5),
            config: Some(path),
            event_log: Some(log.clone()),
            keep_files: false,
        })
        .unwrap();

        assert_eq!(code, exit_codes::SUCCESS);
        assert!(log.exists());
    }

    #[test]
    fn test_describe_scan() {
        use crate::detector::scan;

        assert_eq!(describe_scan(&scan(b"<><><>\n")), "3 section(s)");
        assert_eq!(describe_scan(&scan(b"\n")), "0 section(s)");
        assert_eq!(
            describe_scan(&scan(b"<><<>>\n")),
            "overlap at byte 3 ('<') after 1 section(s)"
        );
    }

    #[test]
    fn test_unsupported_endpoint_fails_before_running() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("marklock.yaml");
        std::fs::write(&path, "coordinator:\n  endpoint: \"etcd://127.0.0.1:2379\"\n").unwrap();

        let err = cmd_run(Cli {
            backend: BackendKind::Leased,
            workers: None,
            runs: None,
            seed: None,
            config: Some(PathBuf::from(&path)),
            event_log: None,
            keep_files: false,
        })
        .unwrap_err();

        assert_eq!(err.exit_code(), exit_codes::RUN_FAILURE);
    }
}
