//! Run and batch outcomes.

use crate::config::BackendKind;
use crate::detector::Scan;
use crate::error::Result;
use crate::worker::WorkerOutcome;
use std::path::PathBuf;

/// Final classification of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every worker succeeded and the stream alternates.
    Clean,
    /// Every worker succeeded but critical sections overlapped.
    Garbled,
    /// At least one worker reported an error.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Clean => "clean",
            RunStatus::Garbled => "garbled",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub run: u32,
    pub backend: BackendKind,
    /// Master seed the run's random sources were derived from.
    pub seed: u64,
    /// Where the resource lived. Gone unless files are kept.
    pub path: PathBuf,
    /// One outcome per worker, ordered by ordinal.
    pub workers: Vec<WorkerOutcome>,
    /// Detector scan of the finalized resource.
    pub scan: Scan,
}

impl RunOutcome {
    /// Whether critical sections overlapped.
    pub fn garbled(&self) -> bool {
        self.scan.is_garbled()
    }

    pub fn status(&self) -> RunStatus {
        if self.workers.iter().any(|w| !w.is_ok()) {
            RunStatus::Failed
        } else if self.garbled() {
            RunStatus::Garbled
        } else {
            RunStatus::Clean
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.workers.iter().filter(|w| !w.is_ok())
    }
}

/// Tally over a batch of runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub clean: u32,
    pub garbled: u32,
    /// Runs with a failed worker plus runs that could not complete at all.
    pub failed: u32,
}

impl BatchSummary {
    pub fn record(&mut self, run: &Result<RunOutcome>) {
        match run.as_ref().map(RunOutcome::status) {
            Ok(RunStatus::Clean) => self.clean += 1,
            Ok(RunStatus::Garbled) => self.garbled += 1,
            Ok(RunStatus::Failed) | Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.clean + self.garbled + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.garbled == 0 && self.failed == 0
    }
}
