/// Integration tests for scoring graded runs.
use npusim_core::config::SimConfig;
use npusim_core::log_sink::NullSink;
use npusim_core::report::GradeReport;
use npusim_core::scenario::Scenario;
use npusim_core::scorer::{self, lateness, migration_factor, time_factor};

fn grade(scenario_text: &str, submission: &str) -> GradeReport {
    let scenario = Scenario::parse(scenario_text).unwrap();
    let mut sink = NullSink;
    npusim_core::grade(&scenario, submission, &SimConfig::default(), &mut sink).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn test_finishing_exactly_at_deadline_is_on_time() {
    // Arrives at 98, runs ceil(16 / 8) = 2ms, finishes at e = 100.
    let report = grade("1\n1 2 500\n1\n0 100 16\n5\n1 100\n", "1\n93 1 1 16\n");
    let user = &report.score.users[0];
    assert_eq!(user.finish_time_ms, 100);
    assert!(!user.late);
    assert_eq!(report.score.late_users, 0);
    assert!(approx(user.lateness, 0.0));
    assert!(approx(report.score.final_score, 10_000.0));
}

#[test]
fn test_one_tick_late_counts_toward_k() {
    let report = grade("1\n1 2 500\n1\n0 99 16\n5\n1 100\n", "1\n93 1 1 16\n");
    let score = &report.score;
    assert_eq!(score.late_users, 1);
    assert!(score.users[0].late);
    let expected_user = time_factor(1.0 / 99.0) * 10_000.0;
    assert!(approx(score.users[0].score, expected_user));
    assert!(approx(score.final_score, time_factor(1.0) * expected_user));
}

#[test]
fn test_change_points_not_distinct_npus() {
    // Targets (1,1) (1,1) (2,3) (2,3): one change point.
    let scenario = "2\n2 2 500\n3 2 500\n1\n0 1000 64\n5\n5\n1 100\n";
    let report = grade(scenario, "4\n0 1 1 16 10 1 1 16 20 2 3 16 30 2 3 16\n");
    let user = &report.score.users[0];
    assert_eq!(user.migrations, 1);
    assert_eq!(user.finish_time_ms, 37);
    let expected = time_factor(lateness(37, 0, 1000)) * migration_factor(1) * 10_000.0;
    assert!(approx(user.score, expected));
}

#[test]
fn test_returning_to_an_npu_counts_again() {
    // (1,1) (1,2) (1,1): two change points even though only two NPUs.
    let scenario = "1\n2 2 500\n1\n0 1000 48\n5\n1 100\n";
    let report = grade(scenario, "3\n0 1 1 16 10 1 2 16 20 1 1 16\n");
    assert_eq!(report.score.users[0].migrations, 2);
}

#[test]
fn test_early_finish_scores_above_base() {
    let report = grade("1\n1 2 500\n1\n0 1000 16\n5\n1 100\n", "1\n0 1 1 16\n");
    let user = &report.score.users[0];
    assert!(user.lateness < 0.0);
    assert!(user.score > 10_000.0);
}

#[test]
fn test_final_score_sums_users_and_applies_k_penalty() {
    // User 1 on time, user 2 late (e = 6, finishes at 7).
    let scenario = "1\n1 2 500\n2\n0 100 16\n0 6 16\n5 5\n1 100\n";
    let report = grade(scenario, "1\n0 1 1 16\n1\n0 1 1 16\n");
    let score = &report.score;
    assert_eq!(score.late_users, 1);
    let sum: f64 = score.users.iter().map(|u| u.score).sum();
    assert!(approx(score.raw_score, sum));
    assert!(approx(score.final_score, 2f64.powf(-0.01) * sum));
    assert_eq!(score.total_simulation_time_ms, 7);
}

#[test]
fn test_degenerate_window_late_user_scores_zero() {
    let report = grade("1\n1 2 500\n1\n50 50 16\n5\n1 100\n", "1\n50 1 1 16\n");
    let user = &report.score.users[0];
    assert!(user.late);
    assert!(user.lateness.is_infinite());
    assert_eq!(user.score, 0.0);
    assert_eq!(report.score.final_score, 0.0);
}

#[test]
fn test_score_table_mentions_every_user() {
    let scenario = "1\n1 2 500\n2\n0 100 16\n0 100 16\n5 5\n1 100\n";
    let report = grade(scenario, "1\n0 1 1 16\n1\n0 1 1 16\n");
    let table = scorer::format_table(&report.score);
    assert!(table.contains(&format!("FINAL SCORE: {:.4}", report.score.final_score)));
    assert_eq!(
        table
            .lines()
            .filter(|l| l.trim_start().starts_with(|c: char| c.is_ascii_digit()))
            .count(),
        2
    );
}
