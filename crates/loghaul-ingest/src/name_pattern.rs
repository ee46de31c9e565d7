//! Remote file name templates
//!
//! A name pattern mixes literal text with date placeholders delimited by `*`:
//!
//! ```text
//! access-*yyyy-MM-dd-HH*.log   ->   access-2024-01-01-13.log
//! ```
//!
//! Placeholders use the familiar letter notation (`yyyy`, `MM`, `dd`, `HH`,
//! `mm`, `ss`, ...), which is compiled once into a `chrono` strftime format.

use crate::error::{IngestError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDateTime;
use std::fmt;

/// Delimits date placeholders inside a name pattern
pub const SENTINEL: char = '*';

/// A compiled name pattern that renders one file name per point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    template: String,
    format: String,
}

impl NamePattern {
    /// Compile a sentinel-delimited template
    ///
    /// Fails when the template has no placeholder, an unterminated
    /// placeholder, an unsupported date letter, or no date field at all.
    pub fn compile(template: &str) -> Result<Self> {
        let segments: Vec<&str> = template.split(SENTINEL).collect();

        if segments.len() == 1 {
            return Err(IngestError::pattern(
                template,
                "name pattern has no date placeholder",
            ));
        }
        if segments.len() % 2 == 0 {
            return Err(IngestError::pattern(
                template,
                format!("unterminated placeholder (odd number of '{SENTINEL}')"),
            ));
        }

        let mut format = String::with_capacity(template.len() * 2);
        let mut fields = 0;
        for (index, segment) in segments.iter().enumerate() {
            if index % 2 == 1 {
                fields += translate_placeholder(segment, &mut format)
                    .map_err(|message| IngestError::pattern(template, message))?;
            } else {
                segment.chars().for_each(|c| push_literal(&mut format, c));
            }
        }

        if fields == 0 {
            return Err(IngestError::pattern(
                template,
                "placeholders contain no date fields",
            ));
        }
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(IngestError::pattern(
                template,
                format!("assembled date format '{format}' is invalid"),
            ));
        }

        Ok(Self {
            template: template.to_string(),
            format,
        })
    }

    /// Render the file name for a point in time
    pub fn render(&self, at: &NaiveDateTime) -> String {
        at.format(&self.format).to_string()
    }

    /// The original template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled strftime format
    pub fn strftime(&self) -> &str {
        &self.format
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// `%` is the only metacharacter of strftime formats
fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Translate one placeholder, returning how many date fields it contains
fn translate_placeholder(placeholder: &str, out: &mut String) -> std::result::Result<usize, String> {
    let chars: Vec<char> = placeholder.chars().collect();
    let mut fields = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // 'text' is literal, '' is a single quote
            let mut j = i + 1;
            if chars.get(j) == Some(&'\'') {
                out.push('\'');
                i = j + 1;
                continue;
            }
            loop {
                match chars.get(j) {
                    None => return Err(format!("unterminated quote in placeholder '{placeholder}'")),
                    Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                        out.push('\'');
                        j += 2;
                    },
                    Some('\'') => {
                        j += 1;
                        break;
                    },
                    Some(&quoted) => {
                        push_literal(out, quoted);
                        j += 1;
                    },
                }
            }
            i = j;
            continue;
        }

        if c.is_ascii_alphabetic() {
            let width = chars[i..].iter().take_while(|&&x| x == c).count();
            let spec = field_specifier(c, width).ok_or_else(|| {
                format!("unsupported date field '{}'", c.to_string().repeat(width))
            })?;
            out.push_str(spec);
            fields += 1;
            i += width;
            continue;
        }

        push_literal(out, c);
        i += 1;
    }

    Ok(fields)
}

fn field_specifier(letter: char, width: usize) -> Option<&'static str> {
    let spec = match (letter, width) {
        ('y' | 'u', 2) => "%y",
        ('y' | 'u', _) => "%Y",
        ('M', 1) => "%-m",
        ('M', 2) => "%m",
        ('M', 3) => "%b",
        ('M', 4) => "%B",
        ('d', 1) => "%-d",
        ('d', 2) => "%d",
        ('D', 1) => "%-j",
        ('D', 3) => "%j",
        ('H', 1) => "%-H",
        ('H', 2) => "%H",
        ('h', 1) => "%-I",
        ('h', 2) => "%I",
        ('m', 1) => "%-M",
        ('m', 2) => "%M",
        ('s', 1) => "%-S",
        ('s', 2) => "%S",
        ('S', 3) => "%3f",
        ('S', 6) => "%6f",
        ('S', 9) => "%9f",
        ('a', 1) => "%p",
        ('E', 1..=3) => "%a",
        ('E', 4) => "%A",
        _ => return None,
    };
    Some(spec)
}
