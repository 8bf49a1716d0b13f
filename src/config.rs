use crate::extract::{FieldSelector, NumericKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from benchlog.toml.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Base directory for relative run paths.
    pub log_dir: PathBuf,
    pub extract: ExtractConfig,
    pub check: CheckConfig,
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Per-query latency lines.
    pub latency: ExtractionRule,
    /// Per-query result-count lines.
    pub tuples: ExtractionRule,
}

/// Marker phrase plus the field selection applied to matching lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionRule {
    pub marker: String,
    pub token_index: i64,
    pub suffix_trim: usize,
    pub kind: NumericKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Label of the run every other run is compared against.
    pub reference: String,
    /// Number of queries to compare; `None` compares the whole reference.
    /// Leaving the key out of a `[check]` table means `None`; only a missing
    /// `[check]` table falls back to the built-in count.
    #[serde(default)]
    pub length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatasetConfig {
    pub name: String,
    #[serde(default)]
    pub runs: Vec<RunConfig>,
}

/// One execution strategy's log for a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunConfig {
    pub label: String,
    pub path: PathBuf,
}

impl ExtractionRule {
    pub fn selector(&self) -> FieldSelector {
        FieldSelector {
            token_index: self.token_index,
            suffix_trim: self.suffix_trim,
            kind: self.kind,
        }
    }
}

impl BenchConfig {
    /// Resolve a run's log path against `log_dir`.
    pub fn run_path(&self, run: &RunConfig) -> PathBuf {
        if run.path.is_absolute() {
            run.path.clone()
        } else {
            self.log_dir.join(&run.path)
        }
    }

    /// Keep only the named datasets, in configured order.
    pub fn retain_datasets(&mut self, names: &[String]) -> Result<(), ConfigError> {
        if names.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.datasets.iter().any(|d| &d.name == *n))
        {
            return Err(ConfigError::Invalid {
                detail: format!("unknown dataset '{unknown}'"),
            });
        }
        self.datasets.retain(|d| names.contains(&d.name));
        Ok(())
    }

    /// Check structural rules that deserialization alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |detail: String| Err(ConfigError::Invalid { detail });

        for (name, rule) in [
            ("extract.latency", &self.extract.latency),
            ("extract.tuples", &self.extract.tuples),
        ] {
            if rule.marker.is_empty() {
                return invalid(format!("{name}.marker must not be empty"));
            }
        }
        if self.check.reference.is_empty() {
            return invalid("check.reference must not be empty".to_string());
        }
        if self.datasets.is_empty() {
            return invalid("no datasets configured".to_string());
        }

        let mut names = HashSet::new();
        for dataset in &self.datasets {
            if !names.insert(dataset.name.as_str()) {
                return invalid(format!("duplicate dataset '{}'", dataset.name));
            }
            if dataset.runs.is_empty() {
                return invalid(format!("dataset '{}' has no runs", dataset.name));
            }
            let mut labels = HashSet::new();
            for run in &dataset.runs {
                if !labels.insert(run.label.as_str()) {
                    return invalid(format!(
                        "dataset '{}' has duplicate run '{}'",
                        dataset.name, run.label
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Load configuration.
///
/// With no explicit path, `benchlog.toml` in the current directory is used
/// when present and built-in defaults otherwise. An explicit path must exist.
/// A relative `log_dir` is taken relative to the config file's directory.
pub fn load_config(path: Option<&Path>) -> Result<BenchConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using built-in defaults");
        return Ok(BenchConfig::default());
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.clone(),
        source: e,
    })?;
    let mut config = parse_config(&contents).map_err(|e| match e {
        ConfigError::Parse { detail, .. } => ConfigError::Parse {
            path: Some(path.clone()),
            detail,
        },
        other => other,
    })?;

    if config.log_dir.is_relative() {
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.log_dir = base.join(&config.log_dir);
        }
    }
    tracing::debug!(
        path = %path.display(),
        datasets = config.datasets.len(),
        "loaded config"
    );
    Ok(config)
}

/// Parse configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<BenchConfig, ConfigError> {
    toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: None,
        detail: e.to_string(),
    })
}

pub const DEFAULT_CONFIG_FILE: &str = "benchlog.toml";

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        detail: String,
    },
    Invalid {
        detail: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config '{}': {source}", path.display())
            }
            ConfigError::Parse {
                path: Some(path),
                detail,
            } => write!(f, "failed to parse config '{}': {detail}", path.display()),
            ConfigError::Parse { path: None, detail } => {
                write!(f, "failed to parse config: {detail}")
            }
            ConfigError::Invalid { detail } => write!(f, "invalid config: {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

// --- Default implementations ---

/// Datasets of the acer experiment; each compares acer against the full scan.
const DEFAULT_DATASETS: &[&str] = &["crimes", "nasdaq", "job"];

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("."),
            extract: ExtractConfig::default(),
            check: CheckConfig::default(),
            datasets: DEFAULT_DATASETS
                .iter()
                .map(|name| DatasetConfig {
                    name: name.to_string(),
                    runs: vec![
                        RunConfig {
                            label: "full scan".to_string(),
                            path: PathBuf::from(format!("{name}_full_scan.txt")),
                        },
                        RunConfig {
                            label: "acer".to_string(),
                            path: PathBuf::from(format!("{name}_acer_Y1_Y2_A3.txt")),
                        },
                    ],
                })
                .collect(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            // Latency tokens look like "12.34ms."
            latency: ExtractionRule {
                marker: "query cost".to_string(),
                token_index: -1,
                suffix_trim: 3,
                kind: NumericKind::Float,
            },
            tuples: ExtractionRule {
                marker: "number of tuples".to_string(),
                token_index: -1,
                suffix_trim: 0,
                kind: NumericKind::Integer,
            },
        }
    }
}

impl Default for ExtractionRule {
    fn default() -> Self {
        Self {
            marker: String::new(),
            token_index: -1,
            suffix_trim: 0,
            kind: NumericKind::Float,
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            reference: "full scan".to_string(),
            length: Some(500),
        }
    }
}
