//! Error types shared across loghaul crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared infrastructure (logging setup, settings parsing)
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid setting '{name}': {value}")]
    InvalidSetting { name: &'static str, value: String },

    #[error("Invalid log filter directive '{directive}': {message}")]
    FilterDirective { directive: String, message: String },

    #[error("Failed to install log subscriber: {0}")]
    Subscriber(String),
}

impl CommonError {
    /// Create an invalid setting error
    pub fn invalid_setting(name: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            value: value.into(),
        }
    }
}
