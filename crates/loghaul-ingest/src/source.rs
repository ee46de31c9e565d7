//! Log source model
//!
//! A [`Source`] is the validated, immutable description of one remote log
//! origin. It is built from a [`SourceConfig`] record; construction compiles
//! both patterns, so a `Source` that exists is always usable by the
//! download manager.

use crate::error::{IngestError, Result};
use crate::name_pattern::NamePattern;
use crate::splitter::PatternSplitter;
use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default FTP control port
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default SSH port
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Transport protocol of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Ftp,
    #[serde(alias = "ssh")]
    Sftp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Ftp => write!(f, "ftp"),
            Protocol::Sftp => write!(f, "sftp"),
        }
    }
}

/// Granularity of one time step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepUnit {
    Seconds,
    Minutes,
    Hours,
    HalfDays,
    Days,
    Weeks,
    Months,
    Years,
}

/// One time increment: `amount` of `unit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub unit: StepUnit,
    pub amount: u32,
}

impl Step {
    pub fn new(unit: StepUnit, amount: u32) -> Self {
        Self { unit, amount }
    }

    /// The time point one step after `from`, or `None` past chrono's range
    ///
    /// Months and years use calendar arithmetic, clamping to the last day of
    /// shorter months.
    pub fn advance(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let n = i64::from(self.amount);
        let delta = match self.unit {
            StepUnit::Seconds => TimeDelta::try_seconds(n)?,
            StepUnit::Minutes => TimeDelta::try_minutes(n)?,
            StepUnit::Hours => TimeDelta::try_hours(n)?,
            StepUnit::HalfDays => TimeDelta::try_hours(n.checked_mul(12)?)?,
            StepUnit::Days => TimeDelta::try_days(n)?,
            StepUnit::Weeks => TimeDelta::try_weeks(n)?,
            StepUnit::Months => return from.checked_add_months(Months::new(self.amount)),
            StepUnit::Years => {
                return from.checked_add_months(Months::new(self.amount.checked_mul(12)?))
            },
        };
        from.checked_add_signed(delta)
    }
}

/// Login and password for FTP and SFTP
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the SFTP transport treats the server's host key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents
    AcceptAny,
    /// Require a matching entry in an OpenSSH known_hosts file
    KnownHosts(PathBuf),
}

/// Where and how to reach a source, per protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http {
        base_url: String,
    },
    Ftp {
        host: String,
        port: u16,
        credentials: Credentials,
    },
    Sftp {
        host: String,
        port: u16,
        credentials: Credentials,
        host_keys: HostKeyPolicy,
    },
}

impl Endpoint {
    pub fn protocol(&self) -> Protocol {
        match self {
            Endpoint::Http { .. } => Protocol::Http,
            Endpoint::Ftp { .. } => Protocol::Ftp,
            Endpoint::Sftp { .. } => Protocol::Sftp,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Http { base_url } => f.write_str(base_url),
            Endpoint::Ftp { host, port, .. } => write!(f, "ftp://{host}:{port}"),
            Endpoint::Sftp { host, port, .. } => write!(f, "sftp://{host}:{port}"),
        }
    }
}

/// One `[[sources]]` record as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub protocol: Protocol,
    /// Host name, or base URL for HTTP
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Prefix prepended to every rendered file name
    #[serde(default)]
    pub remote_path: String,
    pub name_pattern: String,
    pub split_pattern: String,
    pub step_unit: StepUnit,
    #[serde(default = "default_step_amount")]
    pub step_amount: u32,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// SFTP only; relaxed by default
    #[serde(default)]
    pub strict_host_key_checking: bool,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    /// Storage table name, defaults to `name`
    #[serde(default)]
    pub table: Option<String>,
}

fn default_step_amount() -> u32 {
    1
}

/// A validated log source
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    endpoint: Endpoint,
    remote_path: String,
    name_pattern: NamePattern,
    splitter: PatternSplitter,
    step: Step,
    table: String,
}

impl Source {
    /// Validate a configuration record and compile its patterns
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(IngestError::config("source name must not be empty"));
        }
        if config.step_amount == 0 {
            return Err(IngestError::config(format!(
                "source '{}': step_amount must be at least 1",
                config.name
            )));
        }

        let endpoint = build_endpoint(config)?;
        let name_pattern = NamePattern::compile(&config.name_pattern)?;
        let splitter = PatternSplitter::new(&config.split_pattern)?;
        let step = Step::new(config.step_unit, config.step_amount);

        ensure_distinct_names(&name_pattern, &step)?;

        Ok(Self {
            name: config.name.clone(),
            endpoint,
            remote_path: config.remote_path.clone(),
            name_pattern,
            splitter,
            step,
            table: config.table.clone().unwrap_or_else(|| config.name.clone()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn protocol(&self) -> Protocol {
        self.endpoint.protocol()
    }

    pub fn name_pattern(&self) -> &NamePattern {
        &self.name_pattern
    }

    pub fn splitter(&self) -> &PatternSplitter {
        &self.splitter
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Remote path of the file covering `at`
    pub fn remote_path_at(&self, at: &NaiveDateTime) -> String {
        format!("{}{}", self.remote_path, self.name_pattern.render(at))
    }

    /// Remote paths a run over `[start, end)` would attempt, in order
    pub fn remote_paths_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<(NaiveDateTime, String)> {
        let mut paths = Vec::new();
        let mut current = Some(start);
        while let Some(at) = current.filter(|at| *at < end) {
            paths.push((at, self.remote_path_at(&at)));
            current = self.step.advance(at);
        }
        paths
    }
}

fn build_endpoint(config: &SourceConfig) -> Result<Endpoint> {
    if config.address.trim().is_empty() {
        return Err(IngestError::config(format!(
            "source '{}': address must not be empty",
            config.name
        )));
    }

    let credentials = || -> Result<Credentials> {
        let login = config.login.clone().ok_or_else(|| {
            IngestError::config(format!(
                "source '{}': {} requires a login",
                config.name, config.protocol
            ))
        })?;
        Ok(Credentials {
            login,
            password: config.password.clone().unwrap_or_default(),
        })
    };

    let endpoint = match config.protocol {
        Protocol::Http => Endpoint::Http {
            base_url: config.address.clone(),
        },
        Protocol::Ftp => Endpoint::Ftp {
            host: config.address.clone(),
            port: config.port.unwrap_or(DEFAULT_FTP_PORT),
            credentials: credentials()?,
        },
        Protocol::Sftp => {
            let host_keys = if config.strict_host_key_checking {
                let path = config.known_hosts.clone().ok_or_else(|| {
                    IngestError::config(format!(
                        "source '{}': strict host key checking requires known_hosts",
                        config.name
                    ))
                })?;
                HostKeyPolicy::KnownHosts(path)
            } else {
                HostKeyPolicy::AcceptAny
            };
            Endpoint::Sftp {
                host: config.address.clone(),
                port: config.port.unwrap_or(DEFAULT_SFTP_PORT),
                credentials: credentials()?,
                host_keys,
            }
        },
    };

    Ok(endpoint)
}

/// Consecutive steps must land on different files
fn ensure_distinct_names(pattern: &NamePattern, step: &Step) -> Result<()> {
    let reference = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| IngestError::config("invalid reference date"))?;
    let next = step
        .advance(reference)
        .ok_or_else(|| IngestError::config("step is out of range"))?;

    if pattern.render(&reference) == pattern.render(&next) {
        return Err(IngestError::pattern(
            pattern.template(),
            format!(
                "renders the same name for consecutive steps of {} {:?}",
                step.amount, step.unit
            ),
        ));
    }
    Ok(())
}
