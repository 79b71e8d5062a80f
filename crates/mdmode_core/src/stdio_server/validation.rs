//! Stateless document/file predicates.
//!
//! Everything here is side-effect free and tolerant of I/O failure: an
//! unreadable file is "not large" and "not binary" rather than an error, so
//! a broken stat can never block a preview decision.

use crate::uri;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Lines scanned for merge-conflict markers.
const CONFLICT_SCAN_LINES: usize = 500;

/// Bytes sampled for binary detection.
const BINARY_SAMPLE_BYTES: usize = 8 * 1024;

pub fn is_markdown(language_id: &str) -> bool {
    language_id == "markdown"
}

/// Whether the document is one side of a diff/comparison view.
pub fn is_diff_view(document_uri: &str) -> bool {
    matches!(uri::scheme(document_uri), Some("git") | Some("diff"))
}

/// Scans at most the first [`CONFLICT_SCAN_LINES`] lines for classic merge
/// conflict markers. Empty and unreadable files have none.
pub fn has_conflict_markers(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .take(CONFLICT_SCAN_LINES)
        .any(|line| {
            line.starts_with("<<<<<<<")
                || line.starts_with("=======")
                || line.starts_with(">>>>>>>")
        })
}

/// True iff the file size strictly exceeds `max_bytes`. Stat failure is
/// "not large".
pub fn is_large_file(path: &Path, max_bytes: u64) -> bool {
    std::fs::metadata(path)
        .map(|metadata| metadata.len() > max_bytes)
        .unwrap_or(false)
}

/// Samples the first [`BINARY_SAMPLE_BYTES`] bytes; a NUL byte means
/// binary. Invalid UTF-8 alone does not: plenty of legacy-encoded text
/// files are still previewable. Read failure is "not binary".
pub fn is_binary_file(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut sample = Vec::with_capacity(BINARY_SAMPLE_BYTES);
    let Ok(_) = file
        .take(BINARY_SAMPLE_BYTES as u64)
        .read_to_end(&mut sample)
    else {
        return false;
    };
    sample.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn markdown_is_language_tag_equality() {
        assert!(is_markdown("markdown"));
        assert!(!is_markdown("plaintext"));
        assert!(!is_markdown("Markdown"));
    }

    #[test]
    fn diff_view_schemes() {
        assert!(is_diff_view("git:/repo/a.md?ref=HEAD"));
        assert!(is_diff_view("diff:/a.md"));
        assert!(!is_diff_view("file:///a.md"));
        assert!(!is_diff_view("untitled:Untitled-1"));
    }

    #[test]
    fn conflict_markers_detected_in_head() {
        let file = temp_file(b"# Title\n<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> main\n");
        assert!(has_conflict_markers(file.path()));

        let separator_only = temp_file(b"above\n=======\nbelow\n");
        assert!(has_conflict_markers(separator_only.path()));
    }

    #[test]
    fn conflict_scan_is_bounded_and_tolerant() {
        let clean = temp_file(b"# Title\n\nplain text\n");
        assert!(!has_conflict_markers(clean.path()));

        let empty = temp_file(b"");
        assert!(!has_conflict_markers(empty.path()));

        // Markers past the scan window are ignored.
        let mut late = String::new();
        for _ in 0..CONFLICT_SCAN_LINES {
            late.push_str("text\n");
        }
        late.push_str("<<<<<<< HEAD\n");
        let late = temp_file(late.as_bytes());
        assert!(!has_conflict_markers(late.path()));

        assert!(!has_conflict_markers(Path::new("/nonexistent/file.md")));
    }

    #[test]
    fn large_file_is_strictly_greater() {
        let file = temp_file(&[b'x'; 100]);
        assert!(!is_large_file(file.path(), 100));
        assert!(is_large_file(file.path(), 99));
        assert!(!is_large_file(Path::new("/nonexistent/file.md"), 0));
    }

    #[test]
    fn nul_byte_means_binary() {
        let binary = temp_file(b"PK\x03\x04\x00rest");
        assert!(is_binary_file(binary.path()));

        let text = temp_file(b"# plain markdown\n");
        assert!(!is_binary_file(text.path()));
    }

    #[test]
    fn invalid_utf8_without_nul_is_not_binary() {
        // Latin-1 bytes, not valid UTF-8, but no NUL anywhere.
        let latin1 = temp_file(b"caf\xe9 cr\xe8me\n");
        assert!(!is_binary_file(latin1.path()));
    }

    #[test]
    fn binary_sniffing_only_samples_the_head() {
        let mut bytes = vec![b'a'; BINARY_SAMPLE_BYTES];
        bytes.push(0);
        let file = temp_file(&bytes);
        assert!(!is_binary_file(file.path()));
    }

    #[test]
    fn read_failure_is_not_binary() {
        assert!(!is_binary_file(Path::new("/nonexistent/file.md")));
    }
}
