//! Resource log: per-tick, per-NPU snapshots for replay tooling.
//!
//! The simulator never performs I/O itself. It hands each record to an
//! injected [`ResourceLogSink`]; callers choose whether records are dropped,
//! kept in memory, or streamed as a whitespace-delimited table.

use crate::npu::NpuSnapshot;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// One row of the resource log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLogEntry {
    pub time_ms: u64,
    pub npu: NpuSnapshot,
    /// Samples completed on this NPU during this tick.
    pub completed_batch: u64,
    /// Samples completed cluster-wide up to and including this tick.
    pub cumulative_batch: u64,
    /// Users that finished on or before their deadline so far.
    pub users_on_time: u32,
    /// Users that finished after their deadline so far.
    pub users_late: u32,
}

/// Column names, in output order.
pub const COLUMNS: [&str; 12] = [
    "Time",
    "NPU_Global_ID",
    "Server_ID",
    "NPU_Local_ID",
    "Used_Memory",
    "Max_Memory",
    "Queue_Size",
    "Running_Tasks_Count",
    "Completed_Batch_Size_NPU",
    "Cumulative_Batch_Size",
    "Cumulative_Users_Completed_OnTime",
    "Cumulative_Users_Timeout",
];

/// Fixed column widths of the table layout; the last column is unpadded.
const COLUMN_WIDTHS: [usize; 11] = [10, 15, 12, 14, 15, 12, 12, 22, 28, 28, 35];

/// Length of the dashed rule under the header. Readers skip that row.
const SEPARATOR_WIDTH: usize = 200;

impl ResourceLogEntry {
    /// Field values in [`COLUMNS`] order.
    pub fn values(&self) -> [u64; 12] {
        [
            self.time_ms,
            self.npu.npu as u64,
            self.npu.server_id as u64,
            self.npu.npu_id as u64,
            self.npu.used_memory,
            self.npu.max_memory,
            self.npu.queue_size as u64,
            self.npu.running_tasks as u64,
            self.completed_batch,
            self.cumulative_batch,
            u64::from(self.users_on_time),
            u64::from(self.users_late),
        ]
    }
}

/// Destination for resource log records.
///
/// Records arrive in nondecreasing time order and, within a tick, in
/// ascending NPU order.
pub trait ResourceLogSink {
    fn record(&mut self, entry: &ResourceLogEntry) -> io::Result<()>;

    /// Called once after the last record.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResourceLogSink for NullSink {
    fn record(&mut self, _entry: &ResourceLogEntry) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub entries: Vec<ResourceLogEntry>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceLogSink for MemorySink {
    fn record(&mut self, entry: &ResourceLogEntry) -> io::Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

/// Streams records as a left-aligned fixed-width table: a header row, a
/// dashed separator row, then one row per record.
pub struct TableSink<W: Write> {
    writer: W,
    header_written: bool,
}

impl<W: Write> TableSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        writeln!(self.writer, "{}", format_row(COLUMNS))?;
        writeln!(self.writer, "{}", "-".repeat(SEPARATOR_WIDTH))
    }
}

/// Pad every cell but the last to its column width, keeping at least one
/// space between cells when a value overflows.
fn format_row<T: std::fmt::Display>(cells: [T; 12]) -> String {
    let mut line = String::new();
    for (idx, cell) in cells.iter().enumerate() {
        let text = cell.to_string();
        line.push_str(&text);
        if let Some(&width) = COLUMN_WIDTHS.get(idx) {
            let pad = width.saturating_sub(text.len()).max(1);
            line.extend(std::iter::repeat(' ').take(pad));
        }
    }
    line
}

impl<W: Write> ResourceLogSink for TableSink<W> {
    fn record(&mut self, entry: &ResourceLogEntry) -> io::Result<()> {
        self.write_header()?;
        writeln!(self.writer, "{}", format_row(entry.values()))
    }

    fn finish(&mut self) -> io::Result<()> {
        // An empty run still produces a parseable file.
        self.write_header()?;
        self.writer.flush()
    }
}
