//! Cross-run consistency checks.
//!
//! Compares the per-query series of one or more candidate runs against a
//! reference run (normally the full-scan baseline) and reports every index
//! where they disagree.

use crate::extract::MetricValue;
use serde::Serialize;

/// One query whose candidate value differs from the reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub label: String,
    pub index: usize,
    pub reference: MetricValue,
    pub candidate: MetricValue,
}

/// Errors from a consistency comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The requested comparison length exceeds a series' length.
    Range {
        /// Label of the short series; `None` for the reference.
        label: Option<String>,
        requested: usize,
        available: usize,
    },
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Range {
                label,
                requested,
                available,
            } => {
                let which = match label {
                    Some(l) => format!("series '{l}'"),
                    None => "reference series".to_string(),
                };
                write!(
                    f,
                    "cannot compare {requested} queries: {which} has only {available} values"
                )
            }
        }
    }
}

impl std::error::Error for CheckError {}

/// Two values agree when they are numerically equal. NaN agrees with NaN so
/// that a series always matches itself.
fn same_value(a: MetricValue, b: MetricValue) -> bool {
    match (a, b) {
        (MetricValue::Integer(x), MetricValue::Integer(y)) => x == y,
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            x == y || (x.is_nan() && y.is_nan())
        }
    }
}

/// Compare the first `length` values of each candidate against `reference`.
///
/// All lengths are validated before any comparison. Mismatches come out in
/// candidate order, ascending by index within a candidate.
pub fn compare(
    reference: &[MetricValue],
    candidates: &[(String, Vec<MetricValue>)],
    length: usize,
) -> Result<Vec<Mismatch>, CheckError> {
    if length > reference.len() {
        return Err(CheckError::Range {
            label: None,
            requested: length,
            available: reference.len(),
        });
    }
    if let Some((label, series)) = candidates.iter().find(|(_, s)| length > s.len()) {
        return Err(CheckError::Range {
            label: Some(label.clone()),
            requested: length,
            available: series.len(),
        });
    }

    let mut mismatches = Vec::new();
    for (label, series) in candidates {
        for (index, (&expected, &actual)) in reference.iter().zip(series).take(length).enumerate() {
            if !same_value(expected, actual) {
                mismatches.push(Mismatch {
                    label: label.clone(),
                    index,
                    reference: expected,
                    candidate: actual,
                });
            }
        }
    }
    Ok(mismatches)
}
