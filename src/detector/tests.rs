//! Tests for the corruption detector.

use super::*;
use tempfile::TempDir;

#[test]
fn test_alternating_pairs_are_clean() {
    assert!(!is_garbled(b"<><>\n").unwrap());
}

#[test]
fn test_interleaved_opens_are_garbled() {
    assert!(is_garbled(b"<<>>\n").unwrap());
}

#[test]
fn test_single_pair_is_clean() {
    assert!(!is_garbled(b"<>\n").unwrap());
}

#[test]
fn test_leading_close_is_garbled() {
    assert!(is_garbled(b">\n").unwrap());
}

#[test]
fn test_empty_input_is_an_error() {
    let err = is_garbled(b"").unwrap_err();
    assert!(matches!(err, MarklockError::EmptyInput));
}

#[test]
fn test_terminator_only_is_clean() {
    assert!(!is_garbled(b"\n").unwrap());
}

#[test]
fn test_missing_terminator_scans_everything() {
    assert!(!is_garbled(b"<><>").unwrap());
    assert!(is_garbled(b"<>>").unwrap());
}

#[test]
fn test_bytes_after_terminator_are_ignored() {
    assert!(!is_garbled(b"<>\n>>>garbage").unwrap());
}

#[test]
fn test_foreign_byte_is_garbled() {
    assert!(is_garbled(b"<x>\n").unwrap());
    assert!(is_garbled(b"<>\r\n").unwrap());
}

#[test]
fn test_trailing_open_is_not_a_mismatch() {
    assert!(!is_garbled(b"<><\n").unwrap());
}

#[test]
fn test_verdict_is_idempotent() {
    for data in [&b"<><>\n"[..], &b"<<>>\n"[..], &b"\n"[..], &b"<>"[..]] {
        let first = is_garbled(data).unwrap();
        for _ in 0..3 {
            assert_eq!(is_garbled(data).unwrap(), first);
        }
    }
}

#[test]
fn test_scan_reports_mismatch_offset() {
    let result = scan(b"<><<>>\n");
    assert_eq!(result.mismatch, Some((3, b'<')));
    assert_eq!(result.scanned, 3);
    assert_eq!(result.sections(), 1);
    assert!(result.is_garbled());
}

#[test]
fn test_scan_counts_sections() {
    let result = scan(b"<><><>\n");
    assert_eq!(result.scanned, 6);
    assert_eq!(result.sections(), 3);
    assert!(!result.is_garbled());
}

#[test]
fn test_is_garbled_file_reads_content() {
    let temp_dir = TempDir::new().unwrap();
    let clean = temp_dir.path().join("clean");
    let garbled = temp_dir.path().join("garbled");
    std::fs::write(&clean, b"<><><>\n").unwrap();
    std::fs::write(&garbled, b"<<>>\n").unwrap();

    assert!(!is_garbled_file(&clean).unwrap());
    assert!(is_garbled_file(&garbled).unwrap());
}

#[test]
fn test_is_garbled_file_empty_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty");
    std::fs::write(&path, b"").unwrap();

    assert!(matches!(
        is_garbled_file(&path),
        Err(MarklockError::EmptyInput)
    ));
}

#[test]
fn test_is_garbled_file_missing_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing");

    let err = is_garbled_file(&path).unwrap_err();
    assert!(matches!(err, MarklockError::DetectorIo { .. }));
    assert!(err.to_string().contains("missing"));
}

#[test]
fn test_scan_file_reports_sections_and_mismatch() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("res");

    std::fs::write(&path, b"<><>\n").unwrap();
    assert_eq!(scan_file(&path).unwrap().sections(), 2);

    std::fs::write(&path, b"<>>\n").unwrap();
    assert_eq!(scan_file(&path).unwrap().mismatch, Some((2, b'>')));
}
