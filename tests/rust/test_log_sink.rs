/// Integration tests for the resource log stream.
use npusim_core::config::SimConfig;
use npusim_core::log_sink::{MemorySink, ResourceLogSink, TableSink, COLUMNS};
use npusim_core::scenario::Scenario;
use std::io::{self, Write};

/// Two servers with two and one NPUs, two users.
const SCENARIO: &str = "\
2
2 2 500
1 2 500
2
0 100 32
0 100 16
5 3
4 6
1 100
";

const SUBMISSION: &str = "2\n0 1 1 16 10 1 2 16\n1\n0 2 1 16\n";

fn run_into(sink: &mut dyn ResourceLogSink) {
    let scenario = Scenario::parse(SCENARIO).unwrap();
    npusim_core::grade(&scenario, SUBMISSION, &SimConfig::default(), sink).unwrap();
}

#[test]
fn test_records_ordered_by_time_then_npu() {
    let mut sink = MemorySink::new();
    run_into(&mut sink);

    let keys: Vec<_> = sink.entries.iter().map(|e| (e.time_ms, e.npu.npu)).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    // User 1 req 1: NPU 0 at 5 and 7. User 2: NPU 2 at 6 and 8.
    // User 1 req 2: NPU 1 at 15 and 17.
    assert_eq!(
        keys,
        vec![(5, 0), (6, 2), (7, 0), (8, 2), (15, 1), (17, 1)]
    );
}

#[test]
fn test_cumulative_counters() {
    let mut sink = MemorySink::new();
    run_into(&mut sink);

    let cumulative: Vec<_> = sink.entries.iter().map(|e| e.cumulative_batch).collect();
    assert_eq!(cumulative, vec![0, 0, 16, 32, 32, 48]);
    let last = sink.entries.last().unwrap();
    assert_eq!(last.completed_batch, 16);
    assert_eq!((last.users_on_time, last.users_late), (2, 0));
    // User 2 finishes at 8; user 1 only at 17.
    let at_8 = &sink.entries[3];
    assert_eq!((at_8.users_on_time, at_8.users_late), (1, 0));
}

#[test]
fn test_snapshot_fields() {
    let mut sink = MemorySink::new();
    run_into(&mut sink);

    let admitted = &sink.entries[1];
    assert_eq!((admitted.npu.server_id, admitted.npu.npu_id), (2, 1));
    assert_eq!(admitted.npu.used_memory, 116);
    assert_eq!(admitted.npu.max_memory, 500);
    assert_eq!(admitted.npu.running_tasks, 1);
    assert_eq!(admitted.npu.queue_size, 0);
}

#[test]
fn test_table_output_parses_back() {
    let mut sink = TableSink::new(Vec::new());
    run_into(&mut sink);
    let text = String::from_utf8(sink.into_inner()).unwrap();

    let mut lines = text.lines();
    let header: Vec<_> = lines.next().unwrap().split_whitespace().collect();
    assert_eq!(header, COLUMNS.to_vec());
    assert_eq!(header[7], "Running_Tasks_Count");
    assert_eq!(header[11], "Cumulative_Users_Timeout");
    // Replay readers drop the row right under the header.
    let separator = lines.next().unwrap();
    assert!(separator.chars().all(|c| c == '-'));
    let rows: Vec<Vec<u64>> = lines
        .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
        .collect();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0][0], 5);
    assert!(rows.iter().all(|r| r.len() == COLUMNS.len()));
    assert_eq!(rows[5][0], 17);
    assert_eq!(rows[5][9], 48);
}

struct BrokenWriter;

impl Write for BrokenWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_write_failure_aborts_run() {
    let scenario = Scenario::parse(SCENARIO).unwrap();
    let mut sink = TableSink::new(BrokenWriter);
    let err = npusim_core::grade(&scenario, SUBMISSION, &SimConfig::default(), &mut sink)
        .unwrap_err();
    assert_eq!(err.kind(), "LogSink");
}
