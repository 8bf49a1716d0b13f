use crate::extract::MetricValue;
use serde::Serialize;

/// Errors from reducing a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// The series has no values to reduce.
    EmptyInput,
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateError::EmptyInput => write!(f, "no values to aggregate (empty series)"),
        }
    }
}

impl std::error::Error for AggregateError {}

/// Arithmetic mean of the series.
///
/// The result depends only on the multiset of values: they are summed in
/// ascending order with Neumaier compensation, so any permutation of the
/// series yields the same bits.
pub fn mean(series: &[MetricValue]) -> Result<f64, AggregateError> {
    if series.is_empty() {
        return Err(AggregateError::EmptyInput);
    }
    let mut values: Vec<f64> = series.iter().map(|v| v.as_f64()).collect();
    values.sort_by(f64::total_cmp);
    Ok(compensated_sum(&values) / values.len() as f64)
}

fn compensated_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for &x in values {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            compensation += (sum - t) + x;
        } else {
            compensation += (x - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

/// Count, mean and range of one run's values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

pub fn summarize(series: &[MetricValue]) -> Result<Summary, AggregateError> {
    let mean = mean(series)?;
    let (min, max) = series
        .iter()
        .map(|v| v.as_f64())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(x), hi.max(x))
        });
    Ok(Summary {
        count: series.len(),
        mean,
        min,
        max,
    })
}
