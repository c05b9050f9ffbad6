//! npusim: grader for batch-inference schedules on a simulated NPU cluster.
//!
//! A scenario describes servers, NPUs, users and network latencies. A
//! submission says, for every user, when to send which batch to which NPU.
//! Grading validates the submission statically, replays it in a
//! discrete-event simulation, and turns the per-user finish times and
//! migration counts into a score.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//! │ Scenario │──▶│ Submission │──▶│  Engine  │──▶│  Scorer  │
//! │  Parser  │   │ Validation │   │ (Events) │   │ / Report │
//! └──────────┘   └────────────┘   └────┬─────┘   └──────────┘
//!                                      │
//!                    ┌─────────────────┼─────────────────┐
//!                    ▼                 ▼                 ▼
//!              ┌──────────┐      ┌──────────┐      ┌──────────┐
//!              │  NPU 0   │      │  NPU 1   │      │  NPU N   │
//!              │  Memory  │      │  Memory  │      │  Memory  │
//!              │  Queue   │      │  Queue   │      │  Queue   │
//!              └──────────┘      └──────────┘      └──────────┘
//!                                      │
//!                               ┌──────┴──────┐
//!                               │ Resource Log│
//!                               │    Sink     │
//!                               └─────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod log_sink;
pub mod npu;
pub mod report;
pub mod request;
pub mod scenario;
pub mod scorer;
pub mod submission;

// Re-export key types for convenience.
pub use clock::SimClock;
pub use config::{ConfigError, SimConfig};
pub use engine::{SimEvent, SimulationEngine, SimulationError, SimulationOutcome};
pub use log_sink::{MemorySink, NullSink, ResourceLogEntry, ResourceLogSink, TableSink};
pub use npu::{Cluster, Npu, NpuSnapshot};
pub use report::{GradeReport, NpuUtilization, RequestReport};
pub use request::{NpuId, Request, RequestId};
pub use scenario::{FormatError, Scenario};
pub use scorer::{ScoreReport, UserScore};
pub use submission::{load_submission, Schedule, ValidationErrors, Violation};

use std::path::Path;
use thiserror::Error;

/// Anything that stops a submission from being graded.
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed input: {0}")]
    Format(#[from] FormatError),
    #[error("Invalid submission: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GradeError {
    /// Rule name shown after "Validation Failed:".
    pub fn kind(&self) -> &'static str {
        match self {
            GradeError::Io(_) => "Io",
            GradeError::Format(_) => "FormatError",
            GradeError::Invalid(errors) => errors.kind(),
            GradeError::Simulation(err) => err.kind(),
            GradeError::Config(_) => "Config",
        }
    }

    /// One line per problem, for the "Details:" block.
    pub fn details(&self) -> Vec<String> {
        match self {
            GradeError::Invalid(errors) => {
                errors.violations().iter().map(|v| v.to_string()).collect()
            }
            other => vec![other.to_string()],
        }
    }
}

/// Grade a submission against a parsed scenario.
///
/// Records for every touched NPU on every tick go to `sink`.
pub fn grade(
    scenario: &Scenario,
    submission: &str,
    config: &SimConfig,
    sink: &mut dyn ResourceLogSink,
) -> Result<GradeReport, GradeError> {
    let schedule = load_submission(submission, scenario, &config.limits)?;
    tracing::info!(
        users = scenario.users.len(),
        requests = schedule.requests.len(),
        "simulating schedule"
    );
    let outcome = SimulationEngine::new(scenario, &schedule, &config.limits, sink).run()?;
    let report = GradeReport::build(scenario, &schedule, &outcome);
    tracing::info!(
        final_score = report.score.final_score,
        late_users = report.score.late_users,
        "grading finished"
    );
    Ok(report)
}

/// Load both documents from disk and grade.
pub fn grade_files(
    scenario_path: &Path,
    submission_path: &Path,
    config: &SimConfig,
    sink: &mut dyn ResourceLogSink,
) -> Result<GradeReport, GradeError> {
    let scenario = Scenario::from_file(scenario_path)?;
    let submission = std::fs::read_to_string(submission_path)?;
    grade(&scenario, &submission, config, sink)
}
