mod aggregate;
mod check;
mod config;
mod extract;
mod logfile;
mod report;

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Summarize and cross-check query benchmark logs: average latency per
/// execution strategy, and per-query result counts against a reference run.
#[derive(Parser, Debug)]
#[command(name = "benchlog", version, about)]
pub struct Cli {
    /// Config file path (default: benchlog.toml if present, else built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the log files (overrides config)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Validate config and print resolved settings, don't read any logs
    #[arg(long, global = true)]
    dry_run: bool,

    /// Extra logging (per-file extraction, individual mismatches)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only errors on stderr
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the average query latency of every run
    Latency {
        /// Restrict to these datasets (repeatable)
        #[arg(long = "dataset", value_name = "NAME")]
        datasets: Vec<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Compare per-query tuple counts of every run against the reference run
    Check {
        /// Restrict to these datasets (repeatable)
        #[arg(long = "dataset", value_name = "NAME")]
        datasets: Vec<String>,

        /// Label of the reference run (overrides config)
        #[arg(long)]
        reference: Option<String>,

        /// Number of queries to compare (overrides config)
        #[arg(long)]
        length: Option<usize>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the values one extraction rule finds in a single log file
    Extract {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = RuleName::Latency)]
        rule: RuleName,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RuleName {
    Latency,
    Tuples,
}

/// Mismatches found, or a dataset/run failed.
const EXIT_FAILED: u8 = 1;
/// Configuration or usage problem; nothing was checked.
const EXIT_USAGE: u8 = 2;

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load config and apply CLI overrides for the selected command.
fn resolve_config(cli: &Cli) -> Result<config::BenchConfig, config::ConfigError> {
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(dir) = &cli.log_dir {
        cfg.log_dir = dir.clone();
    }
    match &cli.command {
        Command::Latency { datasets, .. } => cfg.retain_datasets(datasets)?,
        Command::Check {
            datasets,
            reference,
            length,
            ..
        } => {
            cfg.retain_datasets(datasets)?;
            if let Some(r) = reference {
                cfg.check.reference = r.clone();
            }
            if length.is_some() {
                cfg.check.length = *length;
            }
        }
        Command::Extract { .. } => {}
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Why a command could not produce a verdict.
#[derive(Debug)]
enum RunError {
    Config(config::ConfigError),
    RenderConfig(toml::ser::Error),
    Extract(extract::ExtractError),
    Output(std::io::Error),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{e}"),
            RunError::RenderConfig(e) => write!(f, "failed to render config: {e}"),
            RunError::Extract(e) => write!(f, "{e}"),
            RunError::Output(e) => write!(f, "failed to write output: {e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::RenderConfig(e) => Some(e),
            RunError::Extract(e) => Some(e),
            RunError::Output(e) => Some(e),
        }
    }
}

impl From<config::ConfigError> for RunError {
    fn from(e: config::ConfigError) -> Self {
        RunError::Config(e)
    }
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        RunError::Output(e)
    }
}

/// Execute the selected command, writing results to `out`.
///
/// `Ok(true)` means everything checked out, `Ok(false)` that the report
/// contains mismatches or failed datasets.
fn run(cli: &Cli, out: &mut impl Write) -> Result<bool, RunError> {
    let cfg = resolve_config(cli)?;

    if cli.dry_run {
        let text = toml::to_string_pretty(&cfg).map_err(RunError::RenderConfig)?;
        write!(out, "{text}")?;
        return Ok(true);
    }

    match &cli.command {
        Command::Latency { format, .. } => {
            let report = report::latency_report(&cfg);
            match format {
                OutputFormat::Text => report::render_latency_text(&report, out)?,
                OutputFormat::Json => report::render_json(&report, out)?,
            }
            Ok(report.passed())
        }
        Command::Check { format, .. } => {
            let report = report::check_report(&cfg);
            tracing::info!(
                datasets = report.datasets.len(),
                mismatches = report.mismatch_count(),
                "check finished"
            );
            match format {
                OutputFormat::Text => report::render_check_text(&report, out)?,
                OutputFormat::Json => report::render_json(&report, out)?,
            }
            Ok(report.passed())
        }
        Command::Extract { file, rule } => {
            let rule = match rule {
                RuleName::Latency => &cfg.extract.latency,
                RuleName::Tuples => &cfg.extract.tuples,
            };
            let series = extract::extract_file(file, &rule.marker, &rule.selector())
                .map_err(RunError::Extract)?;
            for v in &series {
                writeln!(out, "{v}")?;
            }
            Ok(true)
        }
    }
}

/// Map a command result to the process exit status.
fn exit_status(result: &Result<bool, RunError>) -> u8 {
    match result {
        Ok(true) => 0,
        Ok(false) => EXIT_FAILED,
        Err(RunError::Config(_) | RunError::RenderConfig(_) | RunError::Extract(_)) => EXIT_USAGE,
        Err(RunError::Output(_)) => EXIT_FAILED,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    let stdout = std::io::stdout();
    let result = run(&cli, &mut stdout.lock());
    if let Err(e) = &result {
        eprintln!("error: {e}");
    }
    ExitCode::from(exit_status(&result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check_overrides() {
        let cli = Cli::parse_from([
            "benchlog",
            "check",
            "--dataset",
            "crimes",
            "--dataset",
            "job",
            "--length",
            "100",
            "--reference",
            "naive index",
        ]);
        match cli.command {
            Command::Check {
                datasets,
                reference,
                length,
                format,
            } => {
                assert_eq!(datasets, vec!["crimes", "job"]);
                assert_eq!(reference.as_deref(), Some("naive index"));
                assert_eq!(length, Some(100));
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("expected check, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["benchlog", "latency", "--format", "json", "-v", "--dry-run"]);
        assert!(cli.verbose);
        assert!(cli.dry_run);
        assert!(matches!(
            cli.command,
            Command::Latency {
                format: OutputFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["benchlog", "-v", "-q", "latency"]).is_err());
    }

    #[test]
    fn test_resolve_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchlog.toml");
        std::fs::write(&path, "[check]\nlength = 10\n").unwrap();
        let config_arg = path.to_str().unwrap();

        let cli = Cli::parse_from([
            "benchlog",
            "--config",
            config_arg,
            "--log-dir",
            "/var/bench",
            "check",
            "--dataset",
            "nasdaq",
            "--length",
            "20",
        ]);
        let cfg = resolve_config(&cli).unwrap();
        assert_eq!(cfg.log_dir, PathBuf::from("/var/bench"));
        assert_eq!(cfg.check.length, Some(20));
        assert_eq!(cfg.datasets.len(), 1);
        assert_eq!(cfg.datasets[0].name, "nasdaq");
    }

    /// Scratch directory with a `crimes` dataset and a config file pointing at it.
    fn bench_dir(reference: &[i64], acer: Option<&[i64]>) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let write_log = |name: &str, tuples: &[i64]| {
            let text: String = tuples
                .iter()
                .map(|n| format!("query cost: 2.50ms.\nnumber of tuples {n}\n"))
                .collect();
            std::fs::write(dir.path().join(name), text).unwrap();
        };
        write_log("crimes_full_scan.txt", reference);
        if let Some(tuples) = acer {
            write_log("crimes_acer.txt", tuples);
        }
        let config = dir.path().join("benchlog.toml");
        std::fs::write(
            &config,
            r#"
[check]
reference = "full scan"

[[datasets]]
name = "crimes"
runs = [
  { label = "full scan", path = "crimes_full_scan.txt" },
  { label = "acer", path = "crimes_acer.txt" },
]
"#,
        )
        .unwrap();
        (dir, config)
    }

    fn run_args(args: &[&str]) -> (Result<bool, RunError>, String) {
        let cli = Cli::parse_from(args.iter().copied());
        let mut out = Vec::new();
        let result = run(&cli, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_check_without_mismatches_exits_zero() {
        let (_dir, config) = bench_dir(&[5, 0, 9], Some(&[5, 0, 9]));
        let (result, out) = run_args(&["benchlog", "-c", config.to_str().unwrap(), "check"]);
        assert!(matches!(result, Ok(true)));
        assert_eq!(exit_status(&result), 0);
        assert!(out.ends_with("congratulations, no bugs...\n"));
    }

    #[test]
    fn test_check_with_mismatch_exits_one() {
        let (_dir, config) = bench_dir(&[5, 0, 9], Some(&[5, 1, 9]));
        let (result, out) = run_args(&["benchlog", "-c", config.to_str().unwrap(), "check"]);
        assert!(matches!(result, Ok(false)));
        assert_eq!(exit_status(&result), EXIT_FAILED);
        assert!(out.contains("acer may have bug, query index: 1"));
    }

    #[test]
    fn test_check_json_with_mismatch_exits_one() {
        let (_dir, config) = bench_dir(&[5, 0], Some(&[6, 0]));
        let (result, out) = run_args(&[
            "benchlog",
            "-c",
            config.to_str().unwrap(),
            "check",
            "--format",
            "json",
        ]);
        assert_eq!(exit_status(&result), EXIT_FAILED);
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["datasets"][0]["outcome"]["mismatches"][0]["index"], 0);
    }

    #[test]
    fn test_latency_with_missing_log_exits_one() {
        let (_dir, config) = bench_dir(&[5, 0], None);
        let (result, out) = run_args(&["benchlog", "-c", config.to_str().unwrap(), "latency"]);
        assert!(matches!(result, Ok(false)));
        assert_eq!(exit_status(&result), EXIT_FAILED);
        assert!(out.contains("full scan average latency [ms]: 2.500"));
        assert!(out.contains("crimes: acer failed:"));
    }

    #[test]
    fn test_missing_explicit_config_exits_two() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let (result, out) = run_args(&["benchlog", "-c", missing.to_str().unwrap(), "check"]);
        assert!(matches!(result, Err(RunError::Config(_))));
        assert_eq!(exit_status(&result), EXIT_USAGE);
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_dataset_exits_two() {
        let (_dir, config) = bench_dir(&[1], Some(&[1]));
        let (result, out) = run_args(&[
            "benchlog",
            "-c",
            config.to_str().unwrap(),
            "check",
            "--dataset",
            "job",
        ]);
        assert!(matches!(result, Err(RunError::Config(_))));
        assert_eq!(exit_status(&result), EXIT_USAGE);
        assert!(out.is_empty());
    }

    #[test]
    fn test_extract_missing_file_exits_two() {
        let (dir, config) = bench_dir(&[1], None);
        let missing = dir.path().join("crimes_acer.txt");
        let (result, _) = run_args(&[
            "benchlog",
            "-c",
            config.to_str().unwrap(),
            "extract",
            missing.to_str().unwrap(),
        ]);
        let err = match &result {
            Err(e @ RunError::Extract(_)) => e.to_string(),
            other => panic!("expected extract error, got {other:?}"),
        };
        assert!(err.contains("crimes_acer.txt"));
        assert_eq!(exit_status(&result), EXIT_USAGE);
    }

    #[test]
    fn test_extract_prints_one_value_per_line() {
        let (dir, config) = bench_dir(&[4, 0, 12], None);
        let log = dir.path().join("crimes_full_scan.txt");
        let (result, out) = run_args(&[
            "benchlog",
            "-c",
            config.to_str().unwrap(),
            "extract",
            log.to_str().unwrap(),
            "--rule",
            "tuples",
        ]);
        assert_eq!(exit_status(&result), 0);
        assert_eq!(out, "4\n0\n12\n");
    }

    #[test]
    fn test_dry_run_prints_resolved_config() {
        let (_dir, config) = bench_dir(&[1], Some(&[1]));
        let (result, out) = run_args(&[
            "benchlog",
            "-c",
            config.to_str().unwrap(),
            "--dry-run",
            "check",
            "--length",
            "1",
        ]);
        assert_eq!(exit_status(&result), 0);
        let printed = config::parse_config(&out).unwrap();
        assert_eq!(printed.check.length, Some(1));
        assert_eq!(printed.datasets.len(), 1);
    }

    #[test]
    fn test_output_failure_exits_one() {
        let (_dir, config) = bench_dir(&[5], Some(&[5]));
        let cli = Cli::parse_from(["benchlog", "-c", config.to_str().unwrap(), "check"]);
        let result = run(&cli, &mut BrokenPipe);
        assert!(matches!(result, Err(RunError::Output(_))));
        assert_eq!(exit_status(&result), EXIT_FAILED);
    }

    #[test]
    fn test_resolve_config_unknown_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchlog.toml");
        std::fs::write(&path, "").unwrap();
        let cli = Cli::parse_from([
            "benchlog",
            "--config",
            path.to_str().unwrap(),
            "latency",
            "--dataset",
            "synthetic",
        ]);
        let err = resolve_config(&cli).unwrap_err();
        assert!(err.to_string().contains("unknown dataset 'synthetic'"));
    }
}
