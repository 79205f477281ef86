//! The shared append-only resource workers write markers to.
//!
//! A `SharedResource` is a file opened in append mode and identified by its
//! path. The path doubles as the identity lock backends derive their own
//! names from (`<path>.lock` for the advisory lock file, the path itself as
//! the default coordination key).
//!
//! Writes go straight through a shared `&File`; nothing here serializes them.
//! Serialization is the lock's job, and its absence is what the unsafe
//! backend demonstrates.

use crate::error::{MarklockError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Filename prefix of provisioned resource files.
pub const RESOURCE_PREFIX: &str = "marklock-";

/// Suffix appended to the resource path to name its advisory lock file.
pub const LOCK_SUFFIX: &str = ".lock";

/// Line terminator appended once all workers are done.
pub const TERMINATOR: u8 = b'\n';

/// An append-capable byte sink shared by every worker of a run.
pub trait MarkerSink: Send + Sync {
    /// Append a single byte.
    fn append(&self, byte: u8) -> io::Result<()>;
}

/// A file-backed shared resource.
#[derive(Debug)]
pub struct SharedResource {
    path: PathBuf,
    file: File,
}

impl SharedResource {
    /// Create a fresh, uniquely named resource file.
    ///
    /// The file lands in `dir` when given, otherwise in the system temp dir.
    /// It is kept on disk after this call; see [`remove_artifacts`].
    pub fn create_temp(dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(RESOURCE_PREFIX);

        let temp = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| MarklockError::Resource(format!("cannot create temporary file: {}", e)))?;

        let (_, path) = temp.keep().map_err(|e| {
            MarklockError::Resource(format!("cannot keep temporary file: {}", e.error))
        })?;

        Self::open(path)
    }

    /// Open (creating if needed) a resource at `path` in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                MarklockError::Resource(format!("cannot open '{}': {}", path.display(), e))
            })?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable name other lock identities are derived from.
    pub fn name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Path of the companion advisory lock file.
    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }

    /// Terminate the marker stream and close the resource.
    ///
    /// Consumes the resource, so no worker can still hold a reference to it.
    pub fn finish(self) -> Result<PathBuf> {
        let Self { path, mut file } = self;

        file.write_all(&[TERMINATOR]).map_err(|e| {
            MarklockError::Resource(format!(
                "cannot terminate '{}': {}",
                path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            MarklockError::Resource(format!("cannot sync '{}': {}", path.display(), e))
        })?;

        Ok(path)
    }
}

impl MarkerSink for SharedResource {
    fn append(&self, byte: u8) -> io::Result<()> {
        (&self.file).write_all(&[byte])
    }
}

/// Companion lock file path for a resource path: `<path>.lock`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Delete a finished resource and its lock file, if present.
pub fn remove_artifacts(path: &Path) -> Result<()> {
    for target in [path.to_path_buf(), lock_path_for(path)] {
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MarklockError::Resource(format!(
                    "cannot remove '{}': {}",
                    target.display(),
                    e
                )));
            }
        }
    }
    Ok(())
}
