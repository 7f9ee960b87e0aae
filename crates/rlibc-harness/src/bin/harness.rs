//! CLI entrypoint for the rlibc conformance harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rlibc_harness::exec::{FUNCTIONS, execute_fixture_case};
use rlibc_harness::fixtures::load_fixtures;
use rlibc_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, now_utc, validate_log_file,
};
use rlibc_harness::verify::VerificationSummary;
use rlibc_harness::{ConformanceReport, TestRunner};
use rlibc_membrane::config::runtime_config;
use rlibc_membrane::metrics::global_metrics;

/// Conformance tooling for rlibc.
#[derive(Debug, Parser)]
#[command(name = "rlibc-harness")]
#[command(about = "Fixture-driven conformance harness for rlibc")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify the engines against fixture files.
    Verify {
        /// Fixture JSON file, or a directory of them.
        #[arg(long)]
        fixture: PathBuf,
        /// Output report path (markdown).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Output report path (JSON).
        #[arg(long)]
        json: Option<PathBuf>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Artifact index path; digests every file this run wrote.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
        /// Optional fixed timestamp string for deterministic report generation.
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Run one executor on inline JSON inputs and print what it produced.
    Run {
        #[arg(long)]
        function: String,
        /// Inputs as a JSON object.
        #[arg(long)]
        inputs: String,
    },
    /// List the executors fixture cases may name.
    Functions,
    /// Print the runtime configuration resolved from the environment.
    Config,
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Verify {
            fixture,
            report,
            json,
            log,
            artifact_index,
            timestamp,
        } => {
            eprintln!("Verifying against fixtures in {}", fixture.display());
            let sets = load_fixtures(&fixture)?;
            let runner = TestRunner::new("fixture-verify");
            let timestamp = timestamp.unwrap_or_else(now_utc);
            let before = global_metrics().snapshot();

            let mut results = Vec::new();
            match &log {
                Some(path) => {
                    let mut emitter = LogEmitter::to_file(path, &runner.campaign, &timestamp)?;
                    emitter.emit(LogLevel::Info, "run_start")?;
                    for set in &sets {
                        results.extend(runner.run_logged(set, &mut emitter)?);
                    }
                    let failed = results.iter().filter(|r| !r.passed).count();
                    let level = if failed == 0 { LogLevel::Info } else { LogLevel::Warn };
                    emitter.emit_entry(
                        LogEntry::new(String::new(), level, "run_end").with_details(
                            serde_json::json!({ "total": results.len(), "failed": failed }),
                        ),
                    )?;
                    emitter.flush()?;
                }
                None => {
                    for set in &sets {
                        results.extend(runner.run(set));
                    }
                }
            }

            // Stable ordering keeps reports byte-identical across runs.
            results.sort_by(|a, b| {
                a.family
                    .cmp(&b.family)
                    .then_with(|| a.case_name.cmp(&b.case_name))
            });
            let summary = VerificationSummary::from_results(results);
            let all_passed = summary.all_passed();
            let conformance = ConformanceReport {
                title: String::from("rlibc conformance report"),
                timestamp: timestamp.clone(),
                summary,
                metrics: Some(global_metrics().snapshot().since(&before)),
            };

            let mut written = Vec::new();
            if let Some(path) = &log {
                written.push((path.clone(), "log"));
            }
            if let Some(path) = report {
                std::fs::write(&path, conformance.to_markdown())?;
                written.push((path, "report_md"));
            }
            if let Some(path) = json {
                std::fs::write(&path, conformance.to_json())?;
                written.push((path, "report_json"));
            }
            if let Some(path) = artifact_index {
                let mut index = ArtifactIndex::new(&timestamp);
                for (artifact, kind) in &written {
                    index.add_file(artifact, *kind)?;
                }
                std::fs::write(&path, index.to_json()?)?;
            }

            for failure in conformance.summary.failures() {
                eprintln!("FAIL {} [{}]", failure.case_name, failure.family);
                if let Some(diff) = &failure.diff {
                    eprintln!("{diff}");
                }
            }
            eprintln!(
                "{} cases: {} passed, {} failed",
                conformance.summary.total, conformance.summary.passed, conformance.summary.failed
            );
            Ok(if all_passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Run { function, inputs } => {
            let inputs: serde_json::Value = serde_json::from_str(&inputs)?;
            let run = execute_fixture_case(&function, &inputs)?;
            println!("{}", run.output);
            println!("errno={}", run.errno);
            Ok(ExitCode::SUCCESS)
        }
        Command::Functions => {
            for name in FUNCTIONS {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&runtime_config())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::ValidateLog { log } => {
            let (valid, errors) = validate_log_file(&log)?;
            for e in &errors {
                eprintln!("{e}");
            }
            println!("{valid} valid lines, {} errors", errors.len());
            Ok(if errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
