//! Error types for the ingestion pipeline
//!
//! Only [`IngestError::Pattern`], [`IngestError::Config`] and
//! [`IngestError::Connection`] ever reach a caller of the download manager.
//! Fetch and parse failures are recovered per step and show up in the run's
//! step report instead.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error type for ingestion operations
#[derive(Error, Debug)]
pub enum IngestError {
    /// Name pattern or split pattern could not be compiled
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// Transport session could not be established
    #[error("Failed to connect to {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// A single remote file could not be retrieved
    #[error("Failed to fetch '{path}': {message}")]
    Fetch { path: String, message: String },

    /// Reading a downloaded file failed part way through
    #[error("Failed to read '{path}' after {lines} lines: {message}")]
    Parse {
        path: String,
        lines: u64,
        message: String,
    },

    /// Source or application configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resume state could not be loaded or saved
    #[error("Resume state error: {0}")]
    State(String),

    /// Storage collaborator rejected rows
    #[error("Sink error: {0}")]
    Sink(String),

    /// File system operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Create a pattern error
    pub fn pattern(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Create a connection error
    pub fn connection(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a fetch error
    pub fn fetch(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resume state error
    pub fn state(msg: impl ToString) -> Self {
        Self::State(msg.to_string())
    }

    /// Create a sink error
    pub fn sink(msg: impl ToString) -> Self {
        Self::Sink(msg.to_string())
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        Self::sink(err)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        Self::state(err)
    }
}

impl From<toml::de::Error> for IngestError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}
