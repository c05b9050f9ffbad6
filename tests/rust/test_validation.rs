/// Integration tests for scenario loading and static submission checks.
use npusim_core::config::{LimitsSection, SimConfig};
use npusim_core::log_sink::NullSink;
use npusim_core::scenario::Scenario;
use npusim_core::submission::{parse_submission, validate, ValidationErrors, Violation};
use npusim_core::GradeError;
use std::path::Path;

/// Servers: (g=2, m=500), (g=1, m=300), (g=3, m=1000).
/// Users: s=10 cnt=100, s=0 cnt=50. Memory = 2 * batch + 50.
const CLUSTER: &str = "\
3
2 2 500
1 1 300
3 4 1000
2
10 1000 100
0 1000 50
2 3
4 5
1 1
2 50
";

fn check(submission: &str) -> Result<(), ValidationErrors> {
    let scenario = Scenario::parse(CLUSTER).unwrap();
    let limits = LimitsSection::default();
    let raw = parse_submission(submission, scenario.users.len(), &limits).unwrap();
    validate(&scenario, raw, &limits).map(|_| ())
}

fn kinds(err: &ValidationErrors) -> Vec<&'static str> {
    err.violations().iter().map(Violation::kind).collect()
}

#[test]
fn test_valid_submission_passes() {
    assert!(check("2\n10 1 2 60 20 3 3 40\n1\n0 2 1 50\n").is_ok());
}

#[test]
fn test_bad_server_skips_npu_and_memory_checks() {
    let err = check("1\n10 4 9 100\n1\n0 1 1 50\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidServerIndex"]);
    assert_eq!(
        err.violations()[0],
        Violation::InvalidServerIndex {
            user: 1,
            request: 1,
            server: 4,
            servers: 3,
        }
    );

    let err = check("1\n10 0 1 100\n1\n0 1 1 50\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidServerIndex"]);
}

#[test]
fn test_npu_index_checked_per_server() {
    // Server 2 has one NPU, server 3 has three.
    let err = check("2\n10 2 2 50 20 3 3 50\n1\n0 1 1 50\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidNpuIndex"]);
    match &err.violations()[0] {
        Violation::InvalidNpuIndex { npu, npus, .. } => assert_eq!((*npu, *npus), (2, 1)),
        other => panic!("unexpected violation: {other:?}"),
    }
}

#[test]
fn test_batch_memory_checked_against_target_server() {
    // 2 * 126 + 50 = 302: fits server 1 (500), not server 2 (300).
    assert!(check("1\n10 1 1 100\n1\n0 2 1 50\n").is_ok());
    let err = check("2\n10 2 1 126 20 1 1 -26\n1\n0 1 1 50\n").unwrap_err();
    assert!(err.violations().contains(&Violation::BatchsizeExceedsMemory {
        user: 1,
        request: 1,
        server: 2,
        batch: 126,
        needed: 302,
        available: 300,
    }));
    // The negative batch is caught on its own.
    assert!(kinds(&err).contains(&"InvalidOutput"));
}

#[test]
fn test_equal_send_times_rejected() {
    let err = check("2\n10 1 1 50 10 1 1 50\n1\n0 1 1 50\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidTimeOrder"]);
}

#[test]
fn test_first_send_before_start() {
    let err = check("1\n9 1 1 100\n1\n0 1 1 50\n").unwrap_err();
    assert_eq!(
        err.violations(),
        &[Violation::InvalidStartTime {
            user: 1,
            time: 9,
            earliest: 10,
        }]
    );
}

#[test]
fn test_zero_batch_is_invalid_output() {
    let err = check("2\n10 1 1 0 20 1 1 100\n1\n0 1 1 50\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidOutput"]);
}

#[test]
fn test_sample_sum_must_match_exactly() {
    let err = check("2\n10 1 1 60 20 1 1 60\n1\n0 1 1 40\n").unwrap_err();
    assert_eq!(
        err.violations(),
        &[
            Violation::SamplesNotFullyProcessed {
                user: 1,
                processed: 120,
                required: 100,
            },
            Violation::SamplesNotFullyProcessed {
                user: 2,
                processed: 40,
                required: 50,
            },
        ]
    );
}

#[test]
fn test_bad_request_count_still_checks_later_users() {
    let err = check("301\n10 1 1 100\n1\n0 1 1 60\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidOutput", "SamplesNotFullyProcessed"]);
    let users: Vec<_> = err.violations().iter().map(Violation::user).collect();
    assert_eq!(users, vec![1, 2]);
}

#[test]
fn test_zero_request_count_still_checks_later_users() {
    let err = check("0\n\n1\n0 1 1 60\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidOutput", "SamplesNotFullyProcessed"]);
    let users: Vec<_> = err.violations().iter().map(Violation::user).collect();
    assert_eq!(users, vec![1, 2]);
}

#[test]
fn test_arrival_overflow_is_invalid_output() {
    let huge = CLUSTER.replacen("2 3\n", "18446744073709551615 3\n", 1);
    let scenario = Scenario::parse(&huge).unwrap();
    let limits = LimitsSection::default();
    let raw = parse_submission("1\n10 1 1 100\n1\n0 1 1 50\n", 2, &limits).unwrap();
    let err = validate(&scenario, raw, &limits).unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidOutput"]);
    assert_eq!(err.violations()[0].user(), 1);
    assert!(err.violations()[0].to_string().contains("overflows"));
}

#[test]
fn test_send_time_limit_is_inclusive() {
    assert!(check("1\n1000000 1 1 100\n1\n0 1 1 50\n").is_ok());
    let err = check("1\n1000001 1 1 100\n1\n0 1 1 50\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["InvalidOutput"]);
}

#[test]
fn test_blank_lines_and_trailing_content_tolerated() {
    let scenario = Scenario::parse(CLUSTER).unwrap();
    let mut sink = NullSink;
    let report = npusim_core::grade(
        &scenario,
        "\n1\n\n10 1 1 100\n1\n0 1 1 50\n\nleftover\n",
        &SimConfig::default(),
        &mut sink,
    )
    .unwrap();
    assert_eq!(report.score.users.len(), 2);
}

#[test]
fn test_grade_reports_every_violation() {
    let scenario = Scenario::parse(CLUSTER).unwrap();
    let mut sink = NullSink;
    let err = npusim_core::grade(
        &scenario,
        "1\n9 1 1 100\n1\n0 1 1 49\n",
        &SimConfig::default(),
        &mut sink,
    )
    .unwrap_err();
    assert_eq!(err.kind(), "InvalidStartTime");
    assert_eq!(err.details().len(), 2);
    assert!(err.details()[1].contains("User 2"));
}

#[test]
fn test_scenario_format_errors_name_the_line() {
    let trailing = format!("{CLUSTER}7\n");
    assert_eq!(Scenario::parse(&trailing).unwrap_err().line, 12);

    let no_npus = CLUSTER.replacen("1 1 300", "0 1 300", 1);
    assert_eq!(Scenario::parse(&no_npus).unwrap_err().line, 3);

    let wide_row = CLUSTER.replacen("2 3\n", "2 3 4\n", 1);
    assert_eq!(Scenario::parse(&wide_row).unwrap_err().line, 8);

    let truncated = CLUSTER.replacen("2 50\n", "", 1);
    let err = Scenario::parse(&truncated).unwrap_err();
    assert_eq!(err.document, "scenario");
    assert_eq!(err.line, 11);

    let bad_token = CLUSTER.replacen("10 1000 100", "10 1000 lots", 1);
    assert_eq!(Scenario::parse(&bad_token).unwrap_err().line, 6);
}

#[test]
fn test_missing_scenario_file_is_io_error() {
    let mut sink = NullSink;
    let err = npusim_core::grade_files(
        Path::new("/nonexistent/scenario.txt"),
        Path::new("/nonexistent/submission.txt"),
        &SimConfig::default(),
        &mut sink,
    )
    .unwrap_err();
    assert!(matches!(err, GradeError::Io(_)));
    assert_eq!(err.kind(), "Io");
}
