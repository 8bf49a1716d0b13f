//! Metric extraction from benchmark log text.
//!
//! A line contributes a value when it contains the marker phrase. The value
//! is carved out of the whitespace-delimited token picked by a
//! [`FieldSelector`]: trailing unit characters are trimmed and the remainder
//! is parsed as the requested numeric kind.
//!
//! ```text
//! query cost: 12.34ms.        marker "query cost", token -1, trim 3 -> 12.34
//! number of tuples 5          marker "number of tuples", token -1   -> 5
//! ```

use crate::logfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Numeric type a selected token is parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericKind {
    Integer,
    Float,
}

/// A single extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Integer(n) => n as f64,
            MetricValue::Float(x) => x,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Integer(n) => write!(f, "{n}"),
            MetricValue::Float(x) => write!(f, "{x}"),
        }
    }
}

/// Values extracted from one log, in line order.
pub type MetricSeries = Vec<MetricValue>;

/// How to carve the numeric token out of a matching line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSelector {
    /// Whitespace token position; negative values count from the end (-1 = last).
    pub token_index: i64,
    /// Characters dropped from the end of the token (unit suffix and punctuation).
    pub suffix_trim: usize,
    pub kind: NumericKind,
}

impl FieldSelector {
    /// Pick, trim and parse the configured token of `line`.
    pub fn select(&self, line: &str) -> Result<MetricValue, FieldError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let token = pick_token(&tokens, self.token_index).ok_or(FieldError::MissingToken {
            index: self.token_index,
            available: tokens.len(),
        })?;

        let keep = token
            .chars()
            .count()
            .checked_sub(self.suffix_trim)
            .filter(|&n| n > 0)
            .ok_or_else(|| FieldError::TrimTooLong {
                token: token.to_string(),
                trim: self.suffix_trim,
            })?;
        let end = token
            .char_indices()
            .nth(keep)
            .map_or(token.len(), |(i, _)| i);
        let digits = &token[..end];

        let invalid = || FieldError::NotNumeric {
            text: digits.to_string(),
            kind: self.kind,
        };
        match self.kind {
            NumericKind::Integer => digits
                .parse::<i64>()
                .map(MetricValue::Integer)
                .map_err(|_| invalid()),
            NumericKind::Float => digits
                .parse::<f64>()
                .map(MetricValue::Float)
                .map_err(|_| invalid()),
        }
    }
}

fn pick_token<'a>(tokens: &[&'a str], index: i64) -> Option<&'a str> {
    let position = if index >= 0 {
        usize::try_from(index).ok()?
    } else {
        let from_end = usize::try_from(index.unsigned_abs()).ok()?;
        tokens.len().checked_sub(from_end)?
    };
    tokens.get(position).copied()
}

/// Why a matching line did not yield a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    MissingToken { index: i64, available: usize },
    TrimTooLong { token: String, trim: usize },
    NotNumeric { text: String, kind: NumericKind },
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldError::MissingToken { index, available } => {
                write!(f, "no token at index {index} (line has {available} tokens)")
            }
            FieldError::TrimTooLong { token, trim } => {
                write!(f, "trimming {trim} characters leaves nothing of '{token}'")
            }
            FieldError::NotNumeric { text, kind } => {
                let kind = match kind {
                    NumericKind::Integer => "an integer",
                    NumericKind::Float => "a number",
                };
                write!(f, "'{text}' is not {kind}")
            }
        }
    }
}

/// Errors from metric extraction.
#[derive(Debug)]
pub enum ExtractError {
    /// The log file could not be opened, read, or decompressed.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A matching line's selected token is not a valid number.
    Parse {
        path: Option<PathBuf>,
        line_number: usize,
        line: String,
        reason: FieldError,
    },
}

impl ExtractError {
    fn in_file(self, file: &Path) -> Self {
        match self {
            ExtractError::Parse {
                path: None,
                line_number,
                line,
                reason,
            } => ExtractError::Parse {
                path: Some(file.to_path_buf()),
                line_number,
                line,
                reason,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io { path, source } => {
                write!(f, "failed to read log file '{}': {source}", path.display())
            }
            ExtractError::Parse {
                path,
                line_number,
                line,
                reason,
            } => {
                match path {
                    Some(p) => write!(f, "{}:{line_number}", p.display())?,
                    None => write!(f, "line {line_number}")?,
                }
                write!(f, ": cannot extract value from '{line}': {reason}")
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io { source, .. } => Some(source),
            ExtractError::Parse { .. } => None,
        }
    }
}

/// Extract one value per line containing `marker`, in line order.
///
/// Lines without the marker are skipped. The first matching line whose
/// token cannot be parsed aborts the extraction.
pub fn extract<I, S>(
    lines: I,
    marker: &str,
    selector: &FieldSelector,
) -> Result<MetricSeries, ExtractError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut series = MetricSeries::new();
    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        if !line.contains(marker) {
            continue;
        }
        let value = selector.select(line).map_err(|reason| ExtractError::Parse {
            path: None,
            line_number: idx + 1,
            line: line.to_string(),
            reason,
        })?;
        series.push(value);
    }
    Ok(series)
}

/// Read `path` and extract its series.
pub fn extract_file(
    path: &Path,
    marker: &str,
    selector: &FieldSelector,
) -> Result<MetricSeries, ExtractError> {
    let lines = logfile::read_lines(path).map_err(|e| ExtractError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let series = extract(&lines, marker, selector).map_err(|e| e.in_file(path))?;
    tracing::debug!(
        path = %path.display(),
        marker,
        lines = lines.len(),
        values = series.len(),
        "extracted metric series"
    );
    Ok(series)
}
