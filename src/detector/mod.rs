//! Corruption detector for the marker stream.
//!
//! A correctly serialized run leaves `<><>...<>` followed by one line
//! terminator. The detector scans up to the first terminator, expecting the
//! stream to start closed (next symbol `<`) and to flip between `<` and `>`
//! on every byte. The first byte that breaks the alternation makes the
//! stream garbled: interleaved sections (`<<>>`), a stray close (`>`), or any
//! foreign byte.
//!
//! A stream ending open (`<><`) is not garbled by this rule; only a mismatch
//! is. Alternation also cannot tell a serialized run from a race that happens
//! to land bytes in alternating order.

#[cfg(test)]
mod tests;

use crate::error::{MarklockError, Result};
use std::fs;
use std::path::Path;

/// Marker written when a critical section starts.
pub const OPEN_MARKER: u8 = b'<';

/// Marker written when a critical section ends.
pub const CLOSE_MARKER: u8 = b'>';

/// Byte that ends the scanned region.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Result of scanning a marker stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan {
    /// Bytes examined before the terminator or the first mismatch.
    pub scanned: usize,
    /// Offset and value of the first byte that broke alternation.
    pub mismatch: Option<(usize, u8)>,
}

impl Scan {
    pub fn is_garbled(&self) -> bool {
        self.mismatch.is_some()
    }

    /// Complete open/close pairs seen before any mismatch.
    pub fn sections(&self) -> usize {
        self.scanned / 2
    }
}

/// Scan `data` and report where, if anywhere, alternation broke.
pub fn scan(data: &[u8]) -> Scan {
    let mut expected = OPEN_MARKER;

    for (offset, &byte) in data.iter().enumerate() {
        if byte == LINE_TERMINATOR {
            return Scan {
                scanned: offset,
                mismatch: None,
            };
        }
        if byte != expected {
            return Scan {
                scanned: offset,
                mismatch: Some((offset, byte)),
            };
        }
        expected = if expected == OPEN_MARKER {
            CLOSE_MARKER
        } else {
            OPEN_MARKER
        };
    }

    Scan {
        scanned: data.len(),
        mismatch: None,
    }
}

/// Whether `data` shows overlapping critical sections.
///
/// Fails with `EmptyInput` on zero-length content.
pub fn is_garbled(data: &[u8]) -> Result<bool> {
    if data.is_empty() {
        return Err(MarklockError::EmptyInput);
    }
    Ok(scan(data).is_garbled())
}

/// Read a finished resource and scan it.
///
/// Fails with `EmptyInput` on a zero-length file.
pub fn scan_file(path: &Path) -> Result<Scan> {
    let data = fs::read(path).map_err(|source| MarklockError::DetectorIo {
        path: path.to_path_buf(),
        source,
    })?;
    if data.is_empty() {
        return Err(MarklockError::EmptyInput);
    }
    Ok(scan(&data))
}

/// Read a finished resource and check it.
pub fn is_garbled_file(path: &Path) -> Result<bool> {
    scan_file(path).map(|scan| scan.is_garbled())
}
