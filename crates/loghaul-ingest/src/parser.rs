//! Line-oriented log file parser with resume support

use crate::error::IngestError;
use crate::splitter::{PatternSplitter, Row};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Result of parsing one file
#[derive(Debug)]
pub struct ParseOutcome {
    /// Rows of matching lines, in line order
    pub rows: Vec<Row>,
    /// Lines seen so far, including lines skipped on resume
    pub line_count: u64,
    /// Set when reading stopped early; `rows` and `line_count` hold the
    /// progress made up to that point
    pub error: Option<IngestError>,
}

/// Parses downloaded log files into rows
#[derive(Debug, Clone)]
pub struct FileParser {
    splitter: PatternSplitter,
}

impl FileParser {
    pub fn new(splitter: PatternSplitter) -> Self {
        Self { splitter }
    }

    pub fn splitter(&self) -> &PatternSplitter {
        &self.splitter
    }

    /// Parse a local file, discarding the first `resume_lines` lines
    ///
    /// Never fails: an unreadable file or a read error part way through is
    /// reported in [`ParseOutcome::error`] alongside whatever was collected.
    pub fn parse_file(&self, path: &Path, resume_lines: u64) -> ParseOutcome {
        match std::fs::File::open(path) {
            Ok(file) => self.parse_reader(BufReader::new(file), resume_lines, path),
            Err(e) => ParseOutcome {
                rows: Vec::new(),
                line_count: resume_lines,
                error: Some(IngestError::Parse {
                    path: path.display().to_string(),
                    lines: resume_lines,
                    message: e.to_string(),
                }),
            },
        }
    }

    /// Parse lines from any buffered reader
    ///
    /// `origin` only labels log messages and errors.
    pub fn parse_reader<R: BufRead>(
        &self,
        mut reader: R,
        resume_lines: u64,
        origin: &Path,
    ) -> ParseOutcome {
        let mut rows = Vec::new();
        let mut buf = Vec::with_capacity(256);
        let mut seen: u64 = 0;

        let stopped = loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break None,
                Ok(_) => {
                    seen += 1;
                    if seen <= resume_lines {
                        continue;
                    }
                    let row = self.splitter.split(&decode_line(&buf));
                    if !row.is_empty() {
                        rows.push(row);
                    }
                },
                Err(e) => break Some(e),
            }
        };

        // A file shorter than the cursor (truncated or rotated) keeps the cursor
        let line_count = seen.max(resume_lines);

        let error = stopped.map(|e| {
            warn!(
                path = %origin.display(),
                lines = line_count,
                error = %e,
                "Read failed mid-file, keeping partial rows"
            );
            IngestError::Parse {
                path: origin.display().to_string(),
                lines: line_count,
                message: e.to_string(),
            }
        });

        debug!(
            path = %origin.display(),
            skipped = resume_lines.min(seen),
            rows = rows.len(),
            lines = line_count,
            "Parsed file"
        );

        ParseOutcome {
            rows,
            line_count,
            error,
        }
    }
}

/// Strip the line terminator; invalid UTF-8 is replaced rather than rejected
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read, Write};

    fn two_word_parser() -> FileParser {
        FileParser::new(PatternSplitter::new(r"^(\w+)\s(\w+)$").unwrap())
    }

    fn parse_str(parser: &FileParser, content: &str, resume: u64) -> ParseOutcome {
        parser.parse_reader(Cursor::new(content.as_bytes()), resume, Path::new("mem"))
    }

    #[test]
    fn test_parse_skips_non_matching_lines_but_counts_them() {
        let parser = two_word_parser();
        let outcome = parse_str(&parser, "Jan Kowalski\nbad line here\nAndrzej Nowak\n", 0);

        assert_eq!(
            outcome.rows,
            vec![vec!["Jan", "Kowalski"], vec!["Andrzej", "Nowak"]]
        );
        assert_eq!(outcome.line_count, 3);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_two_word_line_matches_two_word_pattern() {
        // "bad line" is itself two words, so it is a row and not a skipped line
        let parser = two_word_parser();
        let outcome = parse_str(&parser, "Jan Kowalski\nbad line\nAndrzej Nowak\n", 0);

        assert_eq!(outcome.rows.len(), 3);
        assert_eq!(outcome.rows[1], vec!["bad", "line"]);
        assert_eq!(outcome.line_count, 3);
    }

    #[test]
    fn test_resume_skips_exactly_k_lines() {
        let parser = two_word_parser();
        let content = "a b\nc d\ne f\ng h\ni j\n";

        let resumed = parse_str(&parser, content, 2);
        assert_eq!(
            resumed.rows,
            vec![vec!["e", "f"], vec!["g", "h"], vec!["i", "j"]]
        );
        assert_eq!(resumed.line_count, 5);

        let full = parse_str(&parser, content, 0);
        assert_eq!(resumed.rows, full.rows[2..].to_vec());
    }

    #[test]
    fn test_resume_past_end_keeps_cursor() {
        let parser = two_word_parser();
        let outcome = parse_str(&parser, "a b\n", 4);
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.line_count, 4);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let parser = two_word_parser();
        let outcome = parse_str(&parser, "a b\r\nc d", 0);
        assert_eq!(outcome.rows, vec![vec!["a", "b"], vec!["c", "d"]]);
        assert_eq!(outcome.line_count, 2);
    }

    #[test]
    fn test_invalid_utf8_is_not_a_read_failure() {
        let parser = FileParser::new(PatternSplitter::new(r"^(\S+) (\S+)$").unwrap());
        let bytes: &[u8] = b"ok line\n\xff\xfe x\nlast one\n";
        let outcome = parser.parse_reader(Cursor::new(bytes), 0, Path::new("mem"));
        assert_eq!(outcome.line_count, 3);
        assert_eq!(outcome.rows.len(), 3);
        assert_eq!(outcome.rows[1][1], "x");
        assert!(outcome.error.is_none());
    }

    struct FailAfter {
        inner: Cursor<Vec<u8>>,
        remaining: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.remaining == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "disk went away",
                ));
            }
            let limit = buf.len().min(self.remaining);
            let n = self.inner.read(&mut buf[..limit])?;
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_read_failure_keeps_partial_progress() {
        let parser = two_word_parser();
        let content = b"a b\nc d\ne f\n".to_vec();
        // Fails once the first two complete lines have been delivered
        let reader = BufReader::with_capacity(
            4,
            FailAfter {
                inner: Cursor::new(content),
                remaining: 8,
            },
        );

        let outcome = parser.parse_reader(reader, 0, Path::new("flaky.log"));
        assert_eq!(outcome.rows, vec![vec!["a", "b"], vec!["c", "d"]]);
        assert_eq!(outcome.line_count, 2);
        assert!(matches!(
            outcome.error,
            Some(IngestError::Parse { lines: 2, .. })
        ));
    }

    #[test]
    fn test_parse_file_from_disk() {
        let parser = two_word_parser();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Jan Kowalski\nbad line here\nAndrzej Nowak\n").unwrap();

        let outcome = parser.parse_file(file.path(), 1);
        assert_eq!(outcome.rows, vec![vec!["Andrzej", "Nowak"]]);
        assert_eq!(outcome.line_count, 3);
    }

    #[test]
    fn test_missing_file_reports_error_without_rows() {
        let parser = two_word_parser();
        let outcome = parser.parse_file(Path::new("/nonexistent/loghaul/file.log"), 3);
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.line_count, 3);
        assert!(matches!(outcome.error, Some(IngestError::Parse { .. })));
    }
}
