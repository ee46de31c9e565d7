//! Loghaul ingestion library
//!
//! Harvests time-partitioned log files from HTTP, FTP and SFTP servers and
//! turns their lines into rows.
//!
//! Each source produces one file per time step, named after the time point
//! (`access-2024-01-01-05.log`). A run walks the time points from a start up
//! to "now", fetches each file into a scratch file, splits every line with the
//! source's regular expression, and returns the rows with a
//! [`ResumeCursor`] that the next run continues from.
//!
//! # Example
//!
//! ```no_run
//! use loghaul_ingest::{DownloadManager, LoghaulConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoghaulConfig::load(Path::new("loghaul.toml"))?;
//!     for source in config.build_sources()? {
//!         let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
//!             .and_then(|d| d.and_hms_opt(0, 0, 0))
//!             .ok_or_else(|| anyhow::anyhow!("bad date"))?;
//!         let mut manager =
//!             DownloadManager::connect(source, &config.scratch_dir, &config.transport_options())
//!                 .await?;
//!         let outcome = manager.initial_download(start).await;
//!         println!("{} rows, resume at {}", outcome.rows.len(), outcome.cursor.last_download);
//!         manager.close().await;
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod cursor;
pub mod error;
pub mod manager;
pub mod name_pattern;
pub mod parser;
pub mod sink;
pub mod source;
pub mod splitter;
pub mod state;
pub mod transport;

pub use config::LoghaulConfig;
pub use cursor::ResumeCursor;
pub use error::{IngestError, Result};
pub use manager::{DownloadManager, DownloadOutcome, StepReport, StepStatus};
pub use name_pattern::NamePattern;
pub use parser::FileParser;
pub use sink::{column_names, CsvSink, RowSink};
pub use source::{Protocol, Source, SourceConfig};
pub use splitter::{PatternSplitter, Row};
pub use state::StateStore;
