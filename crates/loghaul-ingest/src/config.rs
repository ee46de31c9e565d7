//! Application configuration
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! ```toml
//! scratch_dir = "/var/tmp/loghaul"
//! state_file = "/var/lib/loghaul/state.json"
//! output_dir = "/var/lib/loghaul/tables"
//! http_timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [logging]
//! level = "debug"
//!
//! [[sources]]
//! name = "access"
//! protocol = "http"
//! address = "https://logs.example.com"
//! remote_path = "/nginx/"
//! name_pattern = "access-*yyyy-MM-dd-HH*.log"
//! split_pattern = '^(\S+) \S+ \S+ \[([^\]]+)\] "([^"]*)" (\d{3})'
//! step_unit = "hours"
//! ```

use crate::error::{IngestError, Result};
use crate::source::{Source, SourceConfig};
use crate::transport::{TransportOptions, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HTTP_TIMEOUT_SECS};
use loghaul_common::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level `loghaul.toml` contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoghaulConfig {
    /// Directory for in-flight downloads
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// JSON file holding resume cursors
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Directory the CSV tables are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// FTP and SFTP connect and control-channel timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("loghaul")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./loghaul-state.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for LoghaulConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            state_file: default_state_file(),
            output_dir: default_output_dir(),
            http_timeout_secs: default_http_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            logging: LogConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl LoghaulConfig {
    /// Read a configuration file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)?.with_env_overrides()
    }

    /// Parse configuration text without consulting the environment
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LOGHAUL_*` and `LOG_*` environment variables
    pub fn with_env_overrides(self) -> Result<Self> {
        let mut config = self.apply_overrides(|key| std::env::var(key).ok())?;
        config.logging = config
            .logging
            .with_env_overrides()
            .map_err(|e| IngestError::config(e.to_string()))?;
        Ok(config)
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup("LOGHAUL_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("LOGHAUL_STATE_FILE") {
            self.state_file = PathBuf::from(file);
        }
        if let Some(dir) = lookup("LOGHAUL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("LOGHAUL_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_secs("LOGHAUL_HTTP_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("LOGHAUL_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = parse_secs("LOGHAUL_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check settings that do not depend on a single source
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            return Err(IngestError::config("http_timeout_secs must be greater than 0"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(IngestError::config("connect_timeout_secs must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(IngestError::config(format!(
                    "source '{}' is defined more than once",
                    source.name
                )));
            }
        }
        Ok(())
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..TransportOptions::default()
        }
    }

    /// Look up one source record by name
    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| IngestError::config(format!("no source named '{name}'")))
    }

    /// Validate and compile every configured source
    pub fn build_sources(&self) -> Result<Vec<Source>> {
        self.sources.iter().map(Source::from_config).collect()
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| IngestError::config(format!("{key} is not a number: {value}")))
}
