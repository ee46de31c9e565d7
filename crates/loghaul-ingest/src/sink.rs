//! Storage boundary for parsed rows
//!
//! The relational store that ultimately keeps the rows lives outside this
//! crate. [`RowSink`] is the contract it has to meet; [`CsvSink`] is the
//! implementation the CLI ships with.

use crate::error::{IngestError, Result};
use crate::splitter::Row;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Column names for a split pattern with `count` capture groups
pub fn column_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("col_{i}")).collect()
}

/// Consumer of `(table, columns, rows)` batches
pub trait RowSink {
    /// Create the table if it does not exist yet
    fn ensure_table(&mut self, table: &str, columns: &[String]) -> Result<()>;

    /// Append rows, returning how many were stored
    fn insert_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<usize>;
}

/// Appends rows to `<dir>/<table>.csv`
#[derive(Debug)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }
}

fn check_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !table.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(IngestError::sink(format!("invalid table name '{table}'")))
    }
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

impl RowSink for CsvSink {
    fn ensure_table(&mut self, table: &str, columns: &[String]) -> Result<()> {
        check_table_name(table)?;
        std::fs::create_dir_all(&self.dir)?;
        let path = self.table_path(table);

        if path.exists() {
            let existing = read_header(&path)?;
            if existing != columns {
                return Err(IngestError::sink(format!(
                    "table '{table}' has columns {existing:?}, expected {columns:?}"
                )));
            }
            return Ok(());
        }

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(columns)?;
        writer.flush()?;
        debug!(table, path = %path.display(), "Created table");
        Ok(())
    }

    fn insert_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<usize> {
        check_table_name(table)?;
        if let Some(bad) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(IngestError::sink(format!(
                "row has {} fields, table '{table}' has {} columns",
                bad.len(),
                columns.len()
            )));
        }

        let file = OpenOptions::new()
            .append(true)
            .open(self.table_path(table))
            .map_err(|e| IngestError::sink(format!("table '{table}' is not available: {e}")))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        debug!(table, rows = rows.len(), "Inserted rows");
        Ok(rows.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_column_names() {
        assert_eq!(column_names(3), vec!["col_1", "col_2", "col_3"]);
        assert!(column_names(0).is_empty());
    }

    #[test]
    fn test_create_then_append_across_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let columns = column_names(2);

        let mut sink = CsvSink::new(dir.path());
        sink.ensure_table("access", &columns).unwrap();
        sink.insert_rows("access", &columns, &[row(&["Jan", "Kowalski"])])
            .unwrap();

        let mut again = CsvSink::new(dir.path());
        again.ensure_table("access", &columns).unwrap();
        again
            .insert_rows("access", &columns, &[row(&["Andrzej", "Nowak, Jr."])])
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("access.csv")).unwrap();
        assert_eq!(content, "col_1,col_2\nJan,Kowalski\nAndrzej,\"Nowak, Jr.\"\n");
    }

    #[test]
    fn test_column_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());
        sink.ensure_table("access", &column_names(2)).unwrap();

        assert!(sink.ensure_table("access", &column_names(3)).is_err());
        assert!(sink
            .insert_rows("access", &column_names(2), &[row(&["only one"])])
            .is_err());
    }

    #[test]
    fn test_insert_requires_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());
        let err = sink
            .insert_rows("missing", &column_names(1), &[row(&["x"])])
            .unwrap_err();
        assert!(matches!(err, IngestError::Sink(_)));
    }

    #[test]
    fn test_table_name_cannot_escape_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());
        assert!(sink.ensure_table("../evil", &column_names(1)).is_err());
        assert!(sink.ensure_table("", &column_names(1)).is_err());
    }
}
