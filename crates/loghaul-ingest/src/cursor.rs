//! Resume cursor threaded between download runs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Where the next run of a source picks up
///
/// `last_download` is the first time point not yet attempted. `last_line` is
/// the number of lines consumed from the most recently parsed file, applied
/// only to the first file of an incremental run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    pub last_download: NaiveDateTime,
    #[serde(default)]
    pub last_line: u64,
}

impl ResumeCursor {
    pub fn new(last_download: NaiveDateTime, last_line: u64) -> Self {
        Self {
            last_download,
            last_line,
        }
    }

    /// A cursor at `at` with no partially consumed file
    pub fn at(last_download: NaiveDateTime) -> Self {
        Self::new(last_download, 0)
    }
}
