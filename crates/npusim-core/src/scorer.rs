//! Score computation.
//!
//! Per user:
//!
//! ```text
//! x     = (finish - e) / (e - s)        lateness ratio, negative when early
//! h(x)  = 2^(-x / 100)
//! p(m)  = 2^(-m / 200)                  m = schedule change points
//! score = h(x) * p(m) * 10000
//! ```
//!
//! The final score is `2^(-K / 100) * sum(score)` where K counts users that
//! finished strictly after their deadline.

use crate::engine::SimulationOutcome;
use crate::scenario::Scenario;
use crate::submission::Schedule;
use serde::{Deserialize, Serialize};

const USER_SCORE_SCALE: f64 = 10_000.0;

/// Score breakdown for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserScore {
    pub user_id: u32,
    pub start_ms: u64,
    pub deadline_ms: u64,
    pub finish_time_ms: u64,
    pub migrations: u64,
    /// Lateness ratio x. Infinite when `e <= s` and the user is late.
    pub lateness: f64,
    pub late: bool,
    /// h(x)
    pub time_factor: f64,
    /// p(m)
    pub migration_factor: f64,
    pub score: f64,
}

/// Aggregated result of a graded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub final_score: f64,
    /// K: users finishing after their deadline.
    pub late_users: u32,
    /// 2^(-K / 100)
    pub late_penalty: f64,
    /// Sum of user scores before the K penalty.
    pub raw_score: f64,
    pub total_simulation_time_ms: u64,
    pub users: Vec<UserScore>,
}

/// `(finish - e) / (e - s)`.
///
/// With a degenerate window (`e <= s`) the ratio is `+inf` for a late user
/// and `0` otherwise.
pub fn lateness(finish_ms: u64, start_ms: u64, deadline_ms: u64) -> f64 {
    if deadline_ms > start_ms {
        (finish_ms as f64 - deadline_ms as f64) / (deadline_ms - start_ms) as f64
    } else if finish_ms > deadline_ms {
        f64::INFINITY
    } else {
        0.0
    }
}

/// h(x) = 2^(-x / 100)
pub fn time_factor(x: f64) -> f64 {
    2f64.powf(-x / 100.0)
}

/// p(m) = 2^(-m / 200)
pub fn migration_factor(migrations: u64) -> f64 {
    2f64.powf(-(migrations as f64) / 200.0)
}

/// Score a finished simulation.
pub fn score(
    scenario: &Scenario,
    schedule: &Schedule,
    outcome: &SimulationOutcome,
) -> ScoreReport {
    let users: Vec<UserScore> = scenario
        .users
        .iter()
        .zip(&outcome.users)
        .enumerate()
        .map(|(idx, (user, result))| {
            let migrations = schedule.migrations(idx);
            let x = lateness(result.finish_time_ms, user.start_ms, user.deadline_ms);
            let h = time_factor(x);
            let p = migration_factor(migrations);
            UserScore {
                user_id: user.id,
                start_ms: user.start_ms,
                deadline_ms: user.deadline_ms,
                finish_time_ms: result.finish_time_ms,
                migrations,
                lateness: x,
                late: result.finish_time_ms > user.deadline_ms,
                time_factor: h,
                migration_factor: p,
                score: h * p * USER_SCORE_SCALE,
            }
        })
        .collect();

    let late_users = users.iter().filter(|u| u.late).count() as u32;
    let late_penalty = time_factor(f64::from(late_users));
    let raw_score: f64 = users.iter().map(|u| u.score).sum();

    ScoreReport {
        final_score: late_penalty * raw_score,
        late_users,
        late_penalty,
        raw_score,
        total_simulation_time_ms: outcome.total_time_ms,
        users,
    }
}

/// Format a score report as a human-readable table.
pub fn format_table(report: &ScoreReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{:=^70}\n", "  Scoring Summary  "));
    out.push_str(&format!("  Total Users:            {}\n", report.users.len()));
    out.push_str(&format!("  Late Users (K):         {}\n", report.late_users));
    out.push_str(&format!("  K Penalty:              {:.4}\n", report.late_penalty));
    out.push_str(&format!("  Sum of User Scores:     {:.4}\n", report.raw_score));
    out.push_str(&format!(
        "  Simulation Time:        {} ms\n",
        report.total_simulation_time_ms
    ));
    out.push_str(&format!("{:-<70}\n", "  Users  "));
    out.push_str(&format!(
        "  {:<8} {:>10} {:>10} {:>11} {:>10} {:>12}\n",
        "User", "Finish", "Deadline", "Migrations", "x", "Score"
    ));
    for u in &report.users {
        out.push_str(&format!(
            "  {:<8} {:>10} {:>10} {:>11} {:>10.4} {:>12.4}\n",
            u.user_id, u.finish_time_ms, u.deadline_ms, u.migrations, u.lateness, u.score
        ));
    }
    out.push_str(&format!("{:-<70}\n", ""));
    out.push_str(&format!("  FINAL SCORE: {:.4}\n", report.final_score));
    out.push_str(&format!("{:=<70}\n", ""));
    out
}
