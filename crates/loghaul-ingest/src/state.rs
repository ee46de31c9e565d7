//! Resume cursor persistence
//!
//! Cursors live in one JSON document keyed by source name:
//!
//! ```json
//! { "access": { "last_download": "2024-01-01T02:00:00", "last_line": 120 } }
//! ```

use crate::cursor::ResumeCursor;
use crate::error::{IngestError, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// JSON file holding the resume cursor of every source
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    cursors: BTreeMap<String, ResumeCursor>,
}

impl StateStore {
    /// Load the state file; a missing file is an empty state
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cursors = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                IngestError::state(format!("cannot parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), sources = cursors.len(), "Loaded resume state");
        Ok(Self { path, cursors })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, source: &str) -> Option<&ResumeCursor> {
        self.cursors.get(source)
    }

    pub fn set(&mut self, source: &str, cursor: ResumeCursor) {
        self.cursors.insert(source.to_string(), cursor);
    }

    /// Write the state atomically: a temp file in the same directory is
    /// renamed over the previous state
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.cursors)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| IngestError::Io(e.error))?;

        debug!(path = %self.path.display(), "Saved resume state");
        Ok(())
    }
}
