//! Per-dataset reports for the latency and correctness commands.
//!
//! Building a report never stops at the first failure: a dataset whose logs
//! are missing or malformed records the failure and the remaining datasets
//! are still processed. Whether the run as a whole passed is decided by the
//! caller from the finished report.

use crate::aggregate::{self, AggregateError, Summary};
use crate::check::{self, CheckError, Mismatch};
use crate::config::{BenchConfig, DatasetConfig, ExtractionRule};
use crate::extract::{self, ExtractError, MetricSeries};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of summarizing one run's latencies.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Measured { summary: Summary },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunLatency {
    pub label: String,
    pub path: PathBuf,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetLatency {
    pub name: String,
    pub runs: Vec<RunLatency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyReport {
    pub generated_at: DateTime<Utc>,
    pub datasets: Vec<DatasetLatency>,
}

impl LatencyReport {
    /// True when every run produced a summary.
    pub fn passed(&self) -> bool {
        self.datasets
            .iter()
            .flat_map(|d| &d.runs)
            .all(|r| matches!(r.outcome, RunOutcome::Measured { .. }))
    }
}

/// Outcome of cross-checking one dataset.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Compared {
        length: usize,
        mismatches: Vec<Mismatch>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetCheck {
    pub name: String,
    pub outcome: CheckOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub generated_at: DateTime<Utc>,
    pub reference: String,
    pub datasets: Vec<DatasetCheck>,
}

impl CheckReport {
    /// True when every dataset was compared and no mismatch was found.
    pub fn passed(&self) -> bool {
        self.datasets.iter().all(|d| match &d.outcome {
            CheckOutcome::Compared { mismatches, .. } => mismatches.is_empty(),
            CheckOutcome::Failed { .. } => false,
        })
    }

    pub fn mismatch_count(&self) -> usize {
        self.datasets
            .iter()
            .map(|d| match &d.outcome {
                CheckOutcome::Compared { mismatches, .. } => mismatches.len(),
                CheckOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}

/// Errors that fail a single dataset of a report.
#[derive(Debug)]
pub enum ReportError {
    Extract(ExtractError),
    Aggregate(AggregateError),
    Check(CheckError),
    MissingReference { label: String },
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Extract(e) => write!(f, "{e}"),
            ReportError::Aggregate(e) => write!(f, "{e}"),
            ReportError::Check(e) => write!(f, "{e}"),
            ReportError::MissingReference { label } => {
                write!(f, "no run labelled '{label}' to use as reference")
            }
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Extract(e) => Some(e),
            ReportError::Aggregate(e) => Some(e),
            ReportError::Check(e) => Some(e),
            ReportError::MissingReference { .. } => None,
        }
    }
}

impl From<ExtractError> for ReportError {
    fn from(e: ExtractError) -> Self {
        ReportError::Extract(e)
    }
}

impl From<AggregateError> for ReportError {
    fn from(e: AggregateError) -> Self {
        ReportError::Aggregate(e)
    }
}

impl From<CheckError> for ReportError {
    fn from(e: CheckError) -> Self {
        ReportError::Check(e)
    }
}

fn read_series(path: &Path, rule: &ExtractionRule) -> Result<MetricSeries, ExtractError> {
    extract::extract_file(path, &rule.marker, &rule.selector())
}

/// Average latency of every run of every configured dataset.
pub fn latency_report(config: &BenchConfig) -> LatencyReport {
    let rule = &config.extract.latency;
    let datasets = config
        .datasets
        .iter()
        .map(|dataset| DatasetLatency {
            name: dataset.name.clone(),
            runs: dataset
                .runs
                .iter()
                .map(|run| {
                    let path = config.run_path(run);
                    let outcome = match summarize_run(&path, rule) {
                        Ok(summary) => RunOutcome::Measured { summary },
                        Err(e) => {
                            tracing::warn!(
                                dataset = %dataset.name,
                                run = %run.label,
                                error = %e,
                                "latency summary failed"
                            );
                            RunOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    };
                    RunLatency {
                        label: run.label.clone(),
                        path,
                        outcome,
                    }
                })
                .collect(),
        })
        .collect();

    LatencyReport {
        generated_at: Utc::now(),
        datasets,
    }
}

fn summarize_run(path: &Path, rule: &ExtractionRule) -> Result<Summary, ReportError> {
    let series = read_series(path, rule)?;
    Ok(aggregate::summarize(&series)?)
}

/// Compare every non-reference run of every dataset against the reference run.
pub fn check_report(config: &BenchConfig) -> CheckReport {
    let datasets = config
        .datasets
        .iter()
        .map(|dataset| {
            let outcome = match check_dataset(config, dataset) {
                Ok((length, mismatches)) => {
                    tracing::info!(
                        dataset = %dataset.name,
                        length,
                        mismatches = mismatches.len(),
                        "dataset compared"
                    );
                    CheckOutcome::Compared { length, mismatches }
                }
                Err(e) => {
                    tracing::warn!(dataset = %dataset.name, error = %e, "dataset check failed");
                    CheckOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            DatasetCheck {
                name: dataset.name.clone(),
                outcome,
            }
        })
        .collect();

    CheckReport {
        generated_at: Utc::now(),
        reference: config.check.reference.clone(),
        datasets,
    }
}

fn check_dataset(
    config: &BenchConfig,
    dataset: &DatasetConfig,
) -> Result<(usize, Vec<Mismatch>), ReportError> {
    let rule = &config.extract.tuples;
    let reference_label = &config.check.reference;

    let reference_run = dataset
        .runs
        .iter()
        .find(|r| &r.label == reference_label)
        .ok_or_else(|| ReportError::MissingReference {
            label: reference_label.clone(),
        })?;
    let reference = read_series(&config.run_path(reference_run), rule)?;

    let mut candidates = Vec::new();
    for run in dataset.runs.iter().filter(|r| &r.label != reference_label) {
        let series = read_series(&config.run_path(run), rule)?;
        candidates.push((run.label.clone(), series));
    }

    let length = config.check.length.unwrap_or(reference.len());
    let mismatches = check::compare(&reference, &candidates, length)?;
    for m in &mismatches {
        tracing::debug!(
            dataset = %dataset.name,
            run = %m.label,
            index = m.index,
            reference = %m.reference,
            candidate = %m.candidate,
            "result count differs"
        );
    }
    Ok((length, mismatches))
}

fn write_banner(out: &mut impl Write, name: &str) -> std::io::Result<()> {
    writeln!(
        out,
        "------------------------{name} dataset------------------------"
    )
}

/// Human-readable latency report.
pub fn render_latency_text(report: &LatencyReport, out: &mut impl Write) -> std::io::Result<()> {
    for dataset in &report.datasets {
        write_banner(out, &dataset.name)?;
        for run in &dataset.runs {
            match &run.outcome {
                RunOutcome::Measured { summary } => writeln!(
                    out,
                    "{} average latency [ms]: {:.3}",
                    run.label, summary.mean
                )?,
                RunOutcome::Failed { error } => {
                    writeln!(out, "{}: {} failed: {error}", dataset.name, run.label)?
                }
            }
        }
    }
    Ok(())
}

/// Human-readable correctness report, ending with the overall verdict.
pub fn render_check_text(report: &CheckReport, out: &mut impl Write) -> std::io::Result<()> {
    for dataset in &report.datasets {
        write_banner(out, &dataset.name)?;
        match &dataset.outcome {
            CheckOutcome::Compared { mismatches, .. } => {
                for m in mismatches {
                    writeln!(out, "{} may have bug, query index: {}", m.label, m.index)?;
                }
            }
            CheckOutcome::Failed { error } => {
                writeln!(out, "{}: failed: {error}", dataset.name)?;
            }
        }
    }
    if report.passed() {
        writeln!(out, "congratulations, no bugs...")
    } else {
        writeln!(out, "you need to check query...")
    }
}

/// Pretty JSON rendering of any report.
pub fn render_json<T: Serialize>(report: &T, out: &mut impl Write) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    writeln!(out, "{json}")
}
