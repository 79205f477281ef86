//! Test harness: one run launches N workers against a fresh resource and
//! judges the result.
//!
//! # Run lifecycle
//!
//! 1. Derive the run's master seed and prepare its locks. The leased backend
//!    opens its session here; if that fails the run is aborted before any
//!    worker exists.
//! 2. Fan out: every worker runs on its own scoped thread and reports one
//!    outcome over a shared channel.
//! 3. Fan in: collect exactly N outcomes. A worker that panics is reported
//!    as a failed outcome in its place.
//! 4. Close the session, finish the resource, run the detector.
//!
//! Workers all finish before the session is closed, and the session is
//! closed before the resource is finalized, whatever the workers reported.

mod backend;
mod outcome;


pub use backend::Backend;
pub use outcome::{BatchSummary, RunOutcome, RunStatus};

use crate::config::Config;
use crate::detector;
use crate::error::{MarklockError, Result};
use crate::events::{Event, EventAction, EventLog};
use crate::jitter::{derive_rng, master_seed};
use crate::resource::{SharedResource, remove_artifacts};
use crate::worker::{Worker, WorkerOutcome};
use serde_json::json;
use std::any::Any;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Runs workers against shared resources with one lock backend.
#[derive(Debug)]
pub struct Harness {
    backend: Backend,
    workers: u32,
    runs: u32,
    max_critical_sleep: Duration,
    seed: Option<u64>,
    temp_dir: Option<PathBuf>,
    keep_files: bool,
    events: EventLog,
}

impl Harness {
    pub fn new(backend: Backend, config: &Config, events: EventLog) -> Self {
        Self {
            backend,
            workers: config.workers,
            runs: config.runs,
            max_critical_sleep: config.max_critical_sleep(),
            seed: config.seed,
            temp_dir: config.temp_dir.clone(),
            keep_files: config.keep_files,
            events,
        }
    }

    /// Seed for run `run`: offset from the configured seed, random otherwise.
    fn run_seed(&self, run: u32) -> u64 {
        master_seed(self.seed.map(|seed| seed.wrapping_add(u64::from(run))))
    }

    /// Execute every configured run, each against a fresh resource.
    ///
    /// `report` sees each run as it completes. A run that fails outright is
    /// counted and the batch moves on to the next one.
    pub fn run_batch(&self, mut report: impl FnMut(u32, &Result<RunOutcome>)) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for run in 0..self.runs {
            let result = SharedResource::create_temp(self.temp_dir.as_deref()).and_then(|resource| {
                let path = resource.path().to_path_buf();
                let result = self.run(resource, run);
                if !self.keep_files
                    && let Err(e) = remove_artifacts(&path)
                {
                    eprintln!("Warning: {}", e);
                }
                result
            });

            report(run, &result);
            summary.record(&result);
        }

        summary
    }

    /// Execute one run over `resource`, consuming it.
    ///
    /// Worker failures are part of the returned outcome. `Err` means the run
    /// itself could not be carried out: no session, an unreadable resource,
    /// or a session that would not close.
    pub fn run(&self, resource: SharedResource, run: u32) -> Result<RunOutcome> {
        let seed = self.run_seed(run);
        let kind = self.backend.kind();

        self.events.record(Event::new(EventAction::RunStarted).with_run(run).with_details(
            json!({
                "backend": kind.as_str(),
                "workers": self.workers,
                "seed": seed,
                "resource": resource.path().display().to_string(),
            }),
        ));

        let plan = self.backend.plan(&resource, seed)?;
        if let Some(session) = plan.session() {
            self.events.record(
                Event::new(EventAction::SessionOpened)
                    .with_run(run)
                    .with_details(json!({ "session": session.id().to_string() })),
            );
        }
        let session_id = plan.session().map(|s| s.id());

        let workers = (0..self.workers)
            .map(|ordinal| {
                let worker = Worker::new(
                    ordinal,
                    &resource,
                    self.max_critical_sleep,
                    derive_rng(seed, u64::from(ordinal)),
                );
                match plan.lock_for(ordinal) {
                    Some(lock) => worker.with_lock(lock),
                    None => worker,
                }
            })
            .collect();

        let outcomes = run_workers(workers);

        let closed = plan.close();
        if let Some(id) = session_id {
            let mut details = json!({ "session": id.to_string() });
            if let Err(e) = &closed {
                details["error"] = json!(e.to_string());
            }
            self.events.record(
                Event::new(EventAction::SessionClosed)
                    .with_run(run)
                    .with_details(details),
            );
        }

        for outcome in &outcomes {
            self.record_worker(run, outcome);
        }

        let path = resource.finish()?;
        let scan = detector::scan_file(&path)?;
        closed?;

        let outcome = RunOutcome {
            run,
            backend: kind,
            seed,
            path,
            workers: outcomes,
            scan,
        };

        self.events.record(
            Event::new(EventAction::RunFinished)
                .with_run(run)
                .with_details(json!({
                    "status": outcome.status().as_str(),
                    "garbled": outcome.garbled(),
                    "sections": outcome.scan.sections(),
                    "failures": outcome.failures().count(),
                })),
        );

        Ok(outcome)
    }

    fn record_worker(&self, run: u32, outcome: &WorkerOutcome) {
        let event = match &outcome.result {
            Ok(()) => Event::new(EventAction::WorkerFinished),
            Err(e) => Event::new(EventAction::WorkerFailed)
                .with_details(json!({ "error": e.to_string() })),
        };
        self.events
            .record(event.with_run(run).with_worker(outcome.ordinal));
    }
}

/// Run every worker on its own thread and collect one outcome per worker,
/// ordered by ordinal.
pub fn run_workers(workers: Vec<Worker<'_>>) -> Vec<WorkerOutcome> {
    let expected = workers.len();
    let (tx, rx) = mpsc::channel();
    let mut outcomes = Vec::with_capacity(expected);

    thread::scope(|scope| {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|worker| {
                let ordinal = worker.ordinal();
                let tx = tx.clone();
                (ordinal, scope.spawn(move || worker.work(&tx)))
            })
            .collect();
        drop(tx);

        // Ends early only if a worker died without reporting.
        outcomes.extend(rx.iter().take(expected));

        for (ordinal, handle) in handles {
            if let Err(panic) = handle.join()
                && !outcomes.iter().any(|o: &WorkerOutcome| o.ordinal == ordinal)
            {
                outcomes.push(WorkerOutcome {
                    ordinal,
                    result: Err(MarklockError::worker(
                        format!("worker {}", ordinal),
                        "running",
                        MarklockError::Panicked(panic_message(panic.as_ref())),
                    )),
                });
            }
        }
    });

    outcomes.sort_by_key(|o| o.ordinal);
    outcomes
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
