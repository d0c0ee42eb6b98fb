//! CLI entrypoint for the pymem conformance harness.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use pymem_harness::artifact::ArtifactIndex;
use pymem_harness::structured_log::{LogEmitter, now_utc, validate_log_file};
use pymem_harness::{ConformanceReport, HarnessError, ScenarioRunner, all_scenarios};

/// Conformance tooling for the pymem allocation shim.
#[derive(Debug, Parser)]
#[command(name = "pymem-harness")]
#[command(about = "Conformance harness for the pymem allocation shim")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every allocation scenario and report the results.
    Verify {
        /// Output report path (JSON). Printed to stdout when omitted.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Optional fixed timestamp string for deterministic report generation.
        #[arg(long)]
        timestamp: Option<String>,
        /// Run identifier stamped on every log line.
        #[arg(long, default_value = "local")]
        run_id: String,
    },
    /// List scenario names and the property each one checks.
    List,
    /// Validate a JSONL log and write an artifact index with its SHA-256 digest.
    ArtifactIndex {
        /// Structured JSONL log path.
        #[arg(long)]
        log: PathBuf,
        /// Output path for the index (JSON). Printed to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Run identifier recorded in the index.
        #[arg(long, default_value = "local")]
        run_id: String,
    },
}

fn write_or_print(path: Option<&Path>, body: &str) -> Result<(), HarnessError> {
    match path {
        Some(path) => std::fs::write(path, body)?,
        None => println!("{body}"),
    }
    Ok(())
}

fn verify(
    report: Option<PathBuf>,
    log: Option<PathBuf>,
    timestamp: Option<String>,
    run_id: &str,
) -> Result<bool, HarnessError> {
    let scenarios = all_scenarios();
    let runner = ScenarioRunner::new(run_id);
    let results = match &log {
        Some(path) => {
            let mut emitter = LogEmitter::to_file(path, run_id)?;
            runner.run(&scenarios, Some(&mut emitter))?
        }
        None => runner.run(&scenarios, None)?,
    };
    let generated = timestamp.unwrap_or_else(now_utc);
    let report_doc = ConformanceReport::new(run_id, generated, results);

    write_or_print(report.as_deref(), &report_doc.to_json()?)?;
    for name in report_doc.failures() {
        eprintln!("FAIL {name}");
    }
    eprintln!(
        "pymem-harness: {}/{} scenarios passed",
        report_doc.passed, report_doc.total
    );
    Ok(report_doc.all_passed())
}

fn artifact_index(log: &Path, output: Option<PathBuf>, run_id: &str) -> Result<(), HarnessError> {
    if let Err(errors) = validate_log_file(log)?
        && let Some(first) = errors.first()
    {
        return Err(HarnessError::InvalidLog {
            path: log.display().to_string(),
            line: first.line_number,
            message: format!("{}: {}", first.field, first.message),
        });
    }
    let mut index = ArtifactIndex::new(run_id);
    index.add_file(log, "log")?;
    write_or_print(output.as_deref(), &index.to_json()?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Verify {
            report,
            log,
            timestamp,
            run_id,
        } => verify(report, log, timestamp, &run_id),
        Command::List => {
            for scenario in all_scenarios() {
                println!("{:<40} {}", scenario.name, scenario.property);
            }
            Ok(true)
        }
        Command::ArtifactIndex {
            log,
            output,
            run_id,
        } => artifact_index(&log, output, &run_id).map(|()| true),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("pymem-harness: {err}");
            ExitCode::from(2)
        }
    }
}
