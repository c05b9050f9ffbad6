//! Scenario loading.
//!
//! A scenario is a line-based list of integers describing the cluster and
//! the workload:
//!
//! ```text
//! N                 server count
//! g k m             N lines: NPU count, speed coefficient, per-NPU memory
//! M                 user count
//! s e cnt           M lines: earliest send, deadline, required samples
//! l_1 .. l_M        N lines: latency from server i to every user
//! a b               memory formula coefficients
//! ```
//!
//! Blank lines are ignored. Any other deviation is a [`FormatError`] naming
//! the offending line; there is no recovery.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Malformed scenario or submission text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{document} line {line}: {message}")]
pub struct FormatError {
    /// Which document failed ("scenario" or "submission").
    pub document: &'static str,
    /// 1-based line number. Points one past the last line for truncation.
    pub line: usize,
    pub message: String,
}

/// Cursor over the non-blank lines of a document.
pub(crate) struct LineReader<'a> {
    document: &'static str,
    lines: std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'a>>>,
    last_line: usize,
}

impl<'a> LineReader<'a> {
    pub(crate) fn new(document: &'static str, text: &'a str) -> Self {
        Self {
            document,
            lines: text.lines().enumerate().peekable(),
            last_line: 0,
        }
    }

    pub(crate) fn error(&self, line: usize, message: impl Into<String>) -> FormatError {
        FormatError {
            document: self.document,
            line,
            message: message.into(),
        }
    }

    /// Next non-blank line with its 1-based number.
    pub(crate) fn next_line(&mut self, what: &str) -> Result<(usize, &'a str), FormatError> {
        for (idx, line) in self.lines.by_ref() {
            self.last_line = idx + 1;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok((idx + 1, trimmed));
            }
        }
        Err(self.error(
            self.last_line + 1,
            format!("unexpected end of input, expected {what}"),
        ))
    }

    /// Next non-blank line without consuming it.
    pub(crate) fn peek_line(&mut self) -> Option<&'a str> {
        while let Some(&(idx, line)) = self.lines.peek() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
            self.last_line = idx + 1;
            self.lines.next();
        }
        None
    }

    /// Parse every whitespace-separated token of `line` as `T`.
    pub(crate) fn parse_ints<T: FromStr>(
        &self,
        line_no: usize,
        line: &str,
        what: &str,
    ) -> Result<Vec<T>, FormatError> {
        line.split_whitespace()
            .map(|tok| {
                tok.parse::<T>().map_err(|_| {
                    self.error(line_no, format!("invalid integer '{tok}' in {what}"))
                })
            })
            .collect()
    }

    /// Read the next line and require exactly `count` integers on it.
    pub(crate) fn expect_ints<T: FromStr>(
        &mut self,
        count: usize,
        what: &str,
    ) -> Result<(usize, Vec<T>), FormatError> {
        let (line_no, line) = self.next_line(what)?;
        let values = self.parse_ints(line_no, line, what)?;
        if values.len() != count {
            return Err(self.error(
                line_no,
                format!("expected {count} integers for {what}, found {}", values.len()),
            ));
        }
        Ok((line_no, values))
    }

    /// Require that nothing but blank lines remain.
    pub(crate) fn expect_end(&mut self) -> Result<(), FormatError> {
        match self.next_line("end of input") {
            Ok((line_no, _)) => Err(self.error(line_no, "unexpected trailing content")),
            Err(_) => Ok(()),
        }
    }
}

/// A server hosting `npu_count` identical NPUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// 1-based server id.
    pub id: u32,
    pub npu_count: u32,
    /// Speed coefficient k.
    pub speed: u64,
    /// Memory budget of each NPU on this server.
    pub memory: u64,
}

impl Server {
    /// Milliseconds needed to run a batch: `ceil(batch / (k * sqrt(batch)))`.
    pub fn inference_time_ms(&self, batch: u64) -> u64 {
        let batch = batch as f64;
        let throughput = self.speed as f64 * batch.sqrt();
        if throughput <= 0.0 {
            return 0;
        }
        (batch / throughput).ceil() as u64
    }
}

/// A user and the work it must get done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// 1-based user id.
    pub id: u32,
    /// Earliest permitted send time s.
    pub start_ms: u64,
    /// Deadline e.
    pub deadline_ms: u64,
    /// Samples that must be processed, cnt.
    pub samples: u64,
}

/// Linear memory cost of a batch: `a * batch + b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFormula {
    pub a: u64,
    pub b: u64,
}

impl MemoryFormula {
    pub fn memory_needed(&self, batch: u64) -> u64 {
        self.a.saturating_mul(batch).saturating_add(self.b)
    }
}

/// Immutable hardware and workload model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub servers: Vec<Server>,
    pub users: Vec<User>,
    /// Server-major latency table: `latency[server][user]`, 0-based indices.
    pub latency: Vec<Vec<u64>>,
    pub memory: MemoryFormula,
}

impl Scenario {
    /// Load a scenario from a file.
    pub fn from_file(path: &Path) -> Result<Self, crate::GradeError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content)?)
    }

    /// Parse scenario text.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut reader = LineReader::new("scenario", text);

        let (line_no, n) = reader.expect_ints::<usize>(1, "server count")?;
        let server_count = n[0];
        if server_count == 0 {
            return Err(reader.error(line_no, "server count must be at least 1"));
        }

        let mut servers = Vec::with_capacity(server_count);
        for i in 0..server_count {
            let (line_no, v) = reader.expect_ints::<u64>(3, "server 'g k m'")?;
            let (npu_count, speed, memory) = (v[0], v[1], v[2]);
            if npu_count == 0 || speed == 0 || memory == 0 {
                return Err(reader.error(
                    line_no,
                    format!("server {}: g, k and m must all be at least 1", i + 1),
                ));
            }
            let npu_count = u32::try_from(npu_count)
                .map_err(|_| reader.error(line_no, format!("server {}: too many NPUs", i + 1)))?;
            servers.push(Server {
                id: (i + 1) as u32,
                npu_count,
                speed,
                memory,
            });
        }

        let (line_no, m) = reader.expect_ints::<usize>(1, "user count")?;
        let user_count = m[0];
        if user_count == 0 {
            return Err(reader.error(line_no, "user count must be at least 1"));
        }

        let mut users = Vec::with_capacity(user_count);
        for i in 0..user_count {
            let (_, v) = reader.expect_ints::<u64>(3, "user 's e cnt'")?;
            users.push(User {
                id: (i + 1) as u32,
                start_ms: v[0],
                deadline_ms: v[1],
                samples: v[2],
            });
        }

        let mut latency = Vec::with_capacity(server_count);
        for _ in 0..server_count {
            let (_, row) = reader.expect_ints::<u64>(user_count, "latency row")?;
            latency.push(row);
        }

        let (_, ab) = reader.expect_ints::<u64>(2, "memory formula 'a b'")?;
        reader.expect_end()?;

        let scenario = Scenario {
            servers,
            users,
            latency,
            memory: MemoryFormula { a: ab[0], b: ab[1] },
        };
        tracing::info!(
            servers = scenario.servers.len(),
            npus = scenario.npu_count(),
            users = scenario.users.len(),
            "scenario loaded"
        );
        Ok(scenario)
    }

    /// Network latency between a server and a user (0-based indices).
    pub fn latency_ms(&self, server: usize, user: usize) -> u64 {
        self.latency[server][user]
    }

    /// Total NPUs across all servers.
    pub fn npu_count(&self) -> usize {
        self.servers.iter().map(|s| s.npu_count as usize).sum()
    }

    /// Sum of every user's required samples.
    pub fn total_samples(&self) -> u64 {
        self.users.iter().map(|u| u.samples).sum()
    }
}
