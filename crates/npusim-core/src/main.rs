//! npusim CLI: grade NPU batch-inference schedules.

use clap::{Parser, Subcommand};
use npusim_core::config::SimConfig;
use npusim_core::log_sink::{NullSink, ResourceLogSink, TableSink};
use npusim_core::{report, scorer, GradeError};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "npusim",
    about = "Validate and score batch-inference schedules on a simulated NPU cluster",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a submission against a scenario, simulate it and print the score.
    Validate {
        /// Scenario file.
        scenario: PathBuf,
        /// Submission file.
        submission: PathBuf,
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the resource log to this file.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Output the full report to a JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print per-request and per-NPU tables.
        #[arg(long)]
        detailed: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            scenario,
            submission,
            config,
            log,
            output,
            detailed,
        } => {
            let mut sim_config = match config {
                Some(path) => SimConfig::from_file(&path).unwrap_or_else(|e| {
                    eprintln!("Error loading config: {}", e);
                    std::process::exit(1);
                }),
                None => SimConfig::default(),
            };
            if let Some(path) = log {
                sim_config.log.enabled = true;
                sim_config.log.path = path;
            }
            sim_config.report.detailed |= detailed;

            match run_validate(&scenario, &submission, &sim_config) {
                Ok(result) => {
                    println!("{}", scorer::format_table(&result.score));
                    if sim_config.report.detailed {
                        println!("{}", report::format_detailed(&result));
                    }

                    if let Some(output_path) = output {
                        let written = serde_json::to_string_pretty(&result)
                            .map_err(std::io::Error::from)
                            .and_then(|json| std::fs::write(&output_path, json));
                        if let Err(e) = written {
                            eprintln!("Error writing output: {}", e);
                            std::process::exit(1);
                        }
                        println!("Results written to {}", output_path.display());
                    }
                }
                Err(err) => {
                    eprintln!("Validation Failed: [{}]", err.kind());
                    for line in err.details() {
                        eprintln!("Details: {}", line);
                    }
                    std::process::exit(1);
                }
            }
        }
    }
}

fn run_validate(
    scenario: &Path,
    submission: &Path,
    config: &SimConfig,
) -> Result<report::GradeReport, GradeError> {
    let mut sink: Box<dyn ResourceLogSink> = if config.log.enabled {
        let file = File::create(&config.log.path)?;
        tracing::info!(path = %config.log.path.display(), "writing resource log");
        Box::new(TableSink::new(BufWriter::new(file)))
    } else {
        Box::new(NullSink)
    };
    npusim_core::grade_files(scenario, submission, config, sink.as_mut())
}
