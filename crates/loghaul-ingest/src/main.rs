//! Loghaul - log file harvester

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use loghaul_common::logging::{init_logging, LogLevel};
use loghaul_ingest::{
    column_names, CsvSink, DownloadManager, LoghaulConfig, ResumeCursor, RowSink, Source,
    StateStore,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "loghaul")]
#[command(author, version, about = "Harvest time-partitioned log files into tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(short, long, global = true, env = "LOGHAUL_CONFIG", default_value = "loghaul.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download new files of every source and append their rows
    Run {
        /// Only process this source
        #[arg(short, long)]
        source: Option<String>,

        /// Start an initial download here instead of resuming
        #[arg(long, value_parser = parse_datetime)]
        since: Option<NaiveDateTime>,
    },

    /// Print the remote paths a run over [from, to) would fetch
    Names {
        #[arg(short, long)]
        source: String,

        #[arg(long, value_parser = parse_datetime)]
        from: NaiveDateTime,

        #[arg(long, value_parser = parse_datetime)]
        to: NaiveDateTime,
    },
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` or `YYYY-MM-DD` (midnight)
fn parse_datetime(value: &str) -> std::result::Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("expected YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS], got '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = LoghaulConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let mut log_config = config.logging.clone();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    let _log_guard = init_logging(&log_config).context("Failed to initialize logging")?;

    match cli.command {
        Command::Run { source, since } => run(&config, source.as_deref(), since).await,
        Command::Names { source, from, to } => names(&config, &source, from, to),
    }
}

async fn run(config: &LoghaulConfig, only: Option<&str>, since: Option<NaiveDateTime>) -> Result<()> {
    let sources: Vec<Source> = match only {
        Some(name) => vec![Source::from_config(config.source(name)?)?],
        None => config.build_sources()?,
    };

    let mut state = StateStore::load(&config.state_file)
        .with_context(|| format!("Failed to load {}", config.state_file.display()))?;
    let mut sink = CsvSink::new(&config.output_dir);
    let mut failed = Vec::new();

    for source in sources {
        let name = source.name().to_string();
        let resume = match (since, state.get(&name)) {
            (Some(start), _) => Start::Initial(start),
            (None, Some(cursor)) => Start::Resume(*cursor),
            (None, None) => {
                warn!(source = %name, "No stored cursor and no --since given, skipping");
                continue;
            },
        };

        match harvest(config, source, resume, &mut sink).await {
            Ok(cursor) => {
                state.set(&name, cursor);
                state
                    .save()
                    .with_context(|| format!("Failed to save {}", state.path().display()))?;
            },
            Err(e) => {
                error!(source = %name, error = ?e, "Source failed");
                failed.push(name);
            },
        }
    }

    if !failed.is_empty() {
        bail!("{} source(s) failed: {}", failed.len(), failed.join(", "));
    }

    info!("Harvest complete");
    Ok(())
}

enum Start {
    Initial(NaiveDateTime),
    Resume(ResumeCursor),
}

async fn harvest(
    config: &LoghaulConfig,
    source: Source,
    start: Start,
    sink: &mut CsvSink,
) -> Result<ResumeCursor> {
    let table = source.table().to_string();
    let columns = column_names(source.splitter().field_count());

    let mut manager =
        DownloadManager::connect(source, &config.scratch_dir, &config.transport_options()).await?;
    let outcome = match start {
        Start::Initial(at) => manager.initial_download(at).await,
        Start::Resume(cursor) => manager.download_since_last(&cursor).await,
    };
    manager.close().await;

    sink.ensure_table(&table, &columns)
        .with_context(|| format!("Failed to prepare table {table}"))?;
    let stored = sink
        .insert_rows(&table, &columns, &outcome.rows)
        .with_context(|| format!("Failed to store rows in {table}"))?;

    info!(
        table = %table,
        rows = stored,
        files = outcome.files_parsed(),
        skipped = outcome.files_failed(),
        "Stored rows"
    );
    Ok(outcome.cursor)
}

fn names(config: &LoghaulConfig, name: &str, from: NaiveDateTime, to: NaiveDateTime) -> Result<()> {
    let source = Source::from_config(config.source(name)?)?;

    let mut out = std::io::stdout().lock();
    for (_, path) in source.remote_paths_between(from, to) {
        writeln!(out, "{path}")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_forms() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-03-01").unwrap(), midnight);
        assert_eq!(parse_datetime("2024-03-01T00:00").unwrap(), midnight);
        assert_eq!(
            parse_datetime("2024-03-01T13:45:10").unwrap(),
            midnight + chrono::TimeDelta::seconds(13 * 3600 + 45 * 60 + 10)
        );
        assert!(parse_datetime("01/03/2024").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "loghaul", "names", "--source", "access", "--from", "2024-01-01", "--to",
            "2024-01-02", "-c", "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(cli.command, Command::Names { .. }));

        let cli = Cli::try_parse_from(["loghaul", "-v", "run", "--since", "2024-01-01T05:00"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Run { since: Some(_), source: None }));
    }
}
