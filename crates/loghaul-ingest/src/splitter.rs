//! Field extraction from single log lines

use crate::error::{IngestError, Result};
use regex::Regex;

/// One parsed log line: captured field values in capture-group order
pub type Row = Vec<String>;

/// Splits log lines into fields using the capture groups of a regular expression
///
/// The first match found anywhere in the line wins. Each capture group yields
/// one field; a group that does not take part in the match yields an empty
/// string so every row has the same width.
#[derive(Debug, Clone)]
pub struct PatternSplitter {
    regex: Regex,
}

impl PatternSplitter {
    /// Compile a split pattern
    ///
    /// The expression needs at least one capture group, one per field.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| IngestError::pattern(pattern, e))?;
        if regex.captures_len() < 2 {
            return Err(IngestError::pattern(
                pattern,
                "split pattern has no capture groups",
            ));
        }
        Ok(Self { regex })
    }

    /// Number of fields every matched row carries
    pub fn field_count(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// The source expression
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Extract the fields of `line`, or an empty row when it does not match
    pub fn split(&self, line: &str) -> Row {
        match self.regex.captures(line) {
            Some(caps) => caps
                .iter()
                .skip(1)
                .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
            None => Vec::new(),
        }
    }
}
