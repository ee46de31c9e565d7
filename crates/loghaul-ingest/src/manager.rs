//! Download manager
//!
//! Drives one run for one source: step through time from a start point up to
//! "now", render the file name at each point, fetch it into a scratch file,
//! parse it, and collect the rows. The run returns the rows together with the
//! advanced [`ResumeCursor`]; persisting that cursor is the caller's job.
//!
//! # Run semantics
//!
//! - "now" is read from the clock once, before the first step, so a run always
//!   terminates even while new files keep appearing.
//! - Steps run strictly one after another; rows come out in step order, then
//!   line order.
//! - A fetch failure skips its step. A read failure keeps the rows read so far.
//!   Neither stops the run or holds the cursor back.
//! - Continuation (skipping already consumed lines) applies to the first file
//!   of [`DownloadManager::download_since_last`] only.

use crate::cursor::ResumeCursor;
use crate::error::{IngestError, Result};
use crate::parser::FileParser;
use crate::source::Source;
use crate::splitter::Row;
use crate::transport::{self, Transport, TransportOptions};
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Source of the "now" bound of a run
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Wall-clock local time
pub fn system_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

/// What happened at one time step
#[derive(Debug)]
pub enum StepStatus {
    /// File fetched and parsed; `error` is set when reading stopped early
    Parsed {
        bytes: u64,
        rows: usize,
        line_count: u64,
        error: Option<IngestError>,
    },
    /// File could not be fetched; the step was skipped
    FetchFailed(IngestError),
}

/// Report for one attempted time step
#[derive(Debug)]
pub struct StepReport {
    pub at: NaiveDateTime,
    pub remote_path: String,
    pub status: StepStatus,
}

/// Output of one run
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Rows of every parsed file, in step order then line order
    pub rows: Vec<Row>,
    /// Cursor to hand to the next run
    pub cursor: ResumeCursor,
    /// One entry per attempted step
    pub steps: Vec<StepReport>,
}

impl DownloadOutcome {
    pub fn files_parsed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Parsed { .. }))
            .count()
    }

    pub fn files_failed(&self) -> usize {
        self.steps.len() - self.files_parsed()
    }
}

/// Downloads and parses the files of one source
pub struct DownloadManager {
    source: Source,
    transport: Box<dyn Transport>,
    parser: FileParser,
    scratch_dir: PathBuf,
    clock: Clock,
}

impl DownloadManager {
    /// Connect the source's transport
    ///
    /// Fails with [`IngestError::Connection`] when no session can be
    /// established; no step runs in that case.
    pub async fn connect(
        source: Source,
        scratch_dir: impl Into<PathBuf>,
        options: &TransportOptions,
    ) -> Result<Self> {
        let transport = transport::connect(source.endpoint(), options).await?;
        Self::with_transport(source, transport, scratch_dir)
    }

    /// Build a manager around an already connected transport
    pub fn with_transport(
        source: Source,
        transport: Box<dyn Transport>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let scratch_dir = scratch_dir.into();
        std::fs::create_dir_all(&scratch_dir)?;

        if transport.protocol() != source.protocol() {
            return Err(IngestError::config(format!(
                "source '{}' is {} but the transport speaks {}",
                source.name(),
                source.protocol(),
                transport.protocol()
            )));
        }

        let parser = FileParser::new(source.splitter().clone());
        Ok(Self {
            source,
            transport,
            parser,
            scratch_dir,
            clock: system_clock(),
        })
    }

    /// Replace the clock that provides the "now" bound
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Download everything from `start` up to now, ignoring any resume state
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn initial_download(&mut self, start: NaiveDateTime) -> DownloadOutcome {
        self.download_from(ResumeCursor::at(start), false).await
    }

    /// Download everything since the cursor of the previous run
    ///
    /// The first file skips the `cursor.last_line` lines consumed last time.
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn download_since_last(&mut self, cursor: &ResumeCursor) -> DownloadOutcome {
        self.download_from(*cursor, true).await
    }

    /// Close the transport session
    pub async fn close(mut self) {
        self.transport.close().await;
    }

    async fn download_from(&mut self, cursor: ResumeCursor, continuation: bool) -> DownloadOutcome {
        let end = (self.clock)();
        let mut current = Some(cursor.last_download);
        let mut last_line = cursor.last_line;
        let mut resume_lines = if continuation { cursor.last_line } else { 0 };
        let mut rows = Vec::new();
        let mut steps = Vec::new();

        info!(
            start = %cursor.last_download,
            end = %end,
            continuation,
            "Starting download run"
        );

        let mut next_point = cursor.last_download;
        while let Some(at) = current.filter(|at| *at < end) {
            let remote_path = self.source.remote_path_at(&at);
            let status = self.run_step(&remote_path, resume_lines, &mut rows).await;

            if let StepStatus::Parsed { line_count, .. } = &status {
                last_line = *line_count;
            }
            resume_lines = 0;

            steps.push(StepReport {
                at,
                remote_path,
                status,
            });

            // `None` means the step arithmetic left chrono's range
            current = self.source.step().advance(at);
            next_point = current.unwrap_or(at);
        }

        let outcome = DownloadOutcome {
            rows,
            cursor: ResumeCursor::new(next_point, last_line),
            steps,
        };

        info!(
            files = outcome.steps.len(),
            parsed = outcome.files_parsed(),
            failed = outcome.files_failed(),
            rows = outcome.rows.len(),
            next = %outcome.cursor.last_download,
            "Download run finished"
        );

        outcome
    }

    async fn run_step(&mut self, remote_path: &str, resume_lines: u64, rows: &mut Vec<Row>) -> StepStatus {
        // Removed on drop, whichever way this step ends
        let scratch = match scratch_file(&self.scratch_dir, self.source.name()) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = remote_path, error = %e, "Cannot create scratch file, skipping step");
                return StepStatus::FetchFailed(IngestError::fetch(remote_path, e));
            },
        };

        let bytes = match self.transport.fetch(remote_path, scratch.path()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = remote_path, error = %e, "Fetch failed, skipping step");
                return StepStatus::FetchFailed(e);
            },
        };

        let parsed = self.parser.parse_file(scratch.path(), resume_lines);
        debug!(
            path = remote_path,
            bytes,
            rows = parsed.rows.len(),
            lines = parsed.line_count,
            "Step complete"
        );

        let row_count = parsed.rows.len();
        rows.extend(parsed.rows);

        StepStatus::Parsed {
            bytes,
            rows: row_count,
            line_count: parsed.line_count,
            error: parsed.error,
        }
    }
}

fn scratch_file(dir: &Path, source_name: &str) -> std::io::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("{source_name}-"))
        .suffix(".part")
        .tempfile_in(dir)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::tests::{dt, http_config};
    use crate::source::Protocol;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves files from memory and records every requested path
    #[derive(Clone, Default)]
    struct MemoryTransport {
        files: HashMap<String, String>,
        requested: Arc<Mutex<Vec<String>>>,
        scratch_seen: Arc<Mutex<Vec<PathBuf>>>,
        closed: Arc<Mutex<u32>>,
    }

    impl MemoryTransport {
        fn with_file(mut self, path: &str, content: &str) -> Self {
            self.files.insert(path.to_string(), content.to_string());
            self
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        fn protocol(&self) -> Protocol {
            Protocol::Http
        }

        async fn fetch(&mut self, remote_path: &str, destination: &Path) -> Result<u64> {
            self.requested.lock().unwrap().push(remote_path.to_string());
            self.scratch_seen
                .lock()
                .unwrap()
                .push(destination.to_path_buf());
            match self.files.get(remote_path) {
                Some(content) => {
                    std::fs::write(destination, content)?;
                    Ok(content.len() as u64)
                },
                None => Err(IngestError::fetch(remote_path, "HTTP status 404 Not Found")),
            }
        }

        async fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    fn fixed_clock(now: &str) -> Clock {
        let now = dt(now);
        Arc::new(move || now)
    }

    fn manager(transport: MemoryTransport, scratch: &Path, now: &str) -> DownloadManager {
        let source = Source::from_config(&http_config("http://logs.example.com")).unwrap();
        DownloadManager::with_transport(source, Box::new(transport), scratch)
            .unwrap()
            .with_clock(fixed_clock(now))
    }

    #[tokio::test]
    async fn test_hourly_run_attempts_each_hour_once() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default()
            .with_file("/logs/access-2024-01-01-00.log", "Jan Kowalski\nbad line here\n")
            .with_file("/logs/access-2024-01-01-01.log", "Andrzej Nowak\n");
        let requested = transport.requested.clone();

        let mut manager = manager(transport, scratch.path(), "2024-01-01T02:00");
        let outcome = manager.initial_download(dt("2024-01-01T00:00")).await;

        assert_eq!(
            *requested.lock().unwrap(),
            vec!["/logs/access-2024-01-01-00.log", "/logs/access-2024-01-01-01.log"]
        );
        assert_eq!(
            outcome.rows,
            vec![vec!["Jan", "Kowalski"], vec!["Andrzej", "Nowak"]]
        );
        assert_eq!(outcome.cursor, ResumeCursor::new(dt("2024-01-01T02:00"), 1));
        assert_eq!(outcome.files_parsed(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_skipped_and_cursor_advances() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default()
            .with_file("/logs/access-2024-01-01-01.log", "Andrzej Nowak\n");

        let mut manager = manager(transport, scratch.path(), "2024-01-01T02:00");
        let outcome = manager.initial_download(dt("2024-01-01T00:00")).await;

        assert_eq!(outcome.rows, vec![vec!["Andrzej", "Nowak"]]);
        assert_eq!(outcome.cursor.last_download, dt("2024-01-01T02:00"));
        assert_eq!(outcome.files_failed(), 1);
        assert!(matches!(
            outcome.steps[0].status,
            StepStatus::FetchFailed(IngestError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_continuation_applies_to_first_file_only() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default()
            .with_file("/logs/access-2024-01-01-05.log", "a b\nc d\ne f\ng h\ni j\n")
            .with_file("/logs/access-2024-01-01-06.log", "k l\nm n\n");

        let mut manager = manager(transport, scratch.path(), "2024-01-01T07:00");
        let outcome = manager
            .download_since_last(&ResumeCursor::new(dt("2024-01-01T05:00"), 2))
            .await;

        assert_eq!(
            outcome.rows,
            vec![
                vec!["e", "f"],
                vec!["g", "h"],
                vec!["i", "j"],
                vec!["k", "l"],
                vec!["m", "n"]
            ]
        );
        assert!(matches!(
            outcome.steps[0].status,
            StepStatus::Parsed { line_count: 5, .. }
        ));
        assert_eq!(outcome.cursor, ResumeCursor::new(dt("2024-01-01T07:00"), 2));
    }

    #[tokio::test]
    async fn test_continuation_is_dropped_when_first_fetch_fails() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default()
            .with_file("/logs/access-2024-01-01-06.log", "k l\nm n\n");

        let mut manager = manager(transport, scratch.path(), "2024-01-01T07:00");
        let outcome = manager
            .download_since_last(&ResumeCursor::new(dt("2024-01-01T05:00"), 1))
            .await;

        assert_eq!(outcome.rows, vec![vec!["k", "l"], vec!["m", "n"]]);
        assert_eq!(outcome.cursor.last_line, 2);
    }

    #[tokio::test]
    async fn test_initial_download_ignores_line_cursor() {
        let scratch = tempfile::tempdir().unwrap();
        let transport =
            MemoryTransport::default().with_file("/logs/access-2024-01-01-05.log", "a b\nc d\n");

        let mut manager = manager(transport, scratch.path(), "2024-01-01T06:00");
        let outcome = manager.initial_download(dt("2024-01-01T05:00")).await;
        assert_eq!(outcome.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_window_keeps_cursor() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default();
        let requested = transport.requested.clone();

        let mut manager = manager(transport, scratch.path(), "2024-01-01T05:00");
        let cursor = ResumeCursor::new(dt("2024-01-01T05:00"), 7);
        let outcome = manager.download_since_last(&cursor).await;

        assert!(requested.lock().unwrap().is_empty());
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.cursor, cursor);
    }

    #[tokio::test]
    async fn test_repeated_initial_download_is_identical() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default()
            .with_file("/logs/access-2024-01-01-00.log", "a b\nzz\nc d\n")
            .with_file("/logs/access-2024-01-01-02.log", "e f\n");

        let mut manager = manager(transport, scratch.path(), "2024-01-01T03:00");
        let first = manager.initial_download(dt("2024-01-01T00:00")).await;
        let second = manager.initial_download(dt("2024-01-01T00:00")).await;

        assert_eq!(first.rows, second.rows);
        assert_eq!(first.cursor, second.cursor);
    }

    #[tokio::test]
    async fn test_scratch_files_are_removed() {
        let scratch = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default()
            .with_file("/logs/access-2024-01-01-01.log", "a b\n");
        let seen = transport.scratch_seen.clone();
        let closed = transport.closed.clone();

        let mut manager = manager(transport, scratch.path(), "2024-01-01T02:00");
        manager.initial_download(dt("2024-01-01T00:00")).await;
        manager.close().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| p.starts_with(scratch.path()) && !p.exists()));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_protocol_mismatch_is_rejected() {
        let mut config = http_config("ftp.example.com");
        config.protocol = Protocol::Ftp;
        config.login = Some("anonymous".to_string());
        let source = Source::from_config(&config).unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let result =
            DownloadManager::with_transport(source, Box::new(MemoryTransport::default()), scratch.path());
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
