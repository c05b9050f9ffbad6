//! Submission parsing and static validation.
//!
//! A submission holds two lines per user, in user order:
//!
//! ```text
//! T_i
//! time server npu batch  time server npu batch ...   (4 * T_i integers)
//! ```
//!
//! Server and NPU ids are 1-based. Unlike the simulator, this phase is not
//! fail-fast: every violation found is collected and reported together, and
//! simulation only starts when none were found.

use crate::config::LimitsSection;
use crate::npu::Cluster;
use crate::request::{Request, RequestId};
use crate::scenario::{FormatError, LineReader, Scenario};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rule broken by the submission, detectable without simulating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("User {user}: {detail}")]
    InvalidOutput { user: u32, detail: String },
    #[error("User {user} req {request}: server index {server} out of range [1, {servers}]")]
    InvalidServerIndex {
        user: u32,
        request: usize,
        server: i64,
        servers: usize,
    },
    #[error("User {user} req {request}: NPU index {npu} out of range [1, {npus}] for server {server}")]
    InvalidNpuIndex {
        user: u32,
        request: usize,
        server: i64,
        npu: i64,
        npus: u32,
    },
    #[error("User {user} req {request}: batch size {batch} needs {needed} memory, server {server} NPUs have {available}")]
    BatchsizeExceedsMemory {
        user: u32,
        request: usize,
        server: i64,
        batch: i64,
        needed: u64,
        available: u64,
    },
    #[error("User {user} req {request}: send time {time} is not after previous send time {previous}")]
    InvalidTimeOrder {
        user: u32,
        request: usize,
        time: i64,
        previous: i64,
    },
    #[error("User {user}: first send time {time} is earlier than s = {earliest}")]
    InvalidStartTime { user: u32, time: i64, earliest: u64 },
    #[error("User {user}: batch sizes sum to {processed}, but {required} samples are required")]
    SamplesNotFullyProcessed {
        user: u32,
        processed: i64,
        required: u64,
    },
}

impl Violation {
    /// Stable rule name.
    pub fn kind(&self) -> &'static str {
        match self {
            Violation::InvalidOutput { .. } => "InvalidOutput",
            Violation::InvalidServerIndex { .. } => "InvalidServerIndex",
            Violation::InvalidNpuIndex { .. } => "InvalidNpuIndex",
            Violation::BatchsizeExceedsMemory { .. } => "BatchsizeExceedsMemory",
            Violation::InvalidTimeOrder { .. } => "InvalidTimeOrder",
            Violation::InvalidStartTime { .. } => "InvalidStartTime",
            Violation::SamplesNotFullyProcessed { .. } => "SamplesNotFullyProcessed",
        }
    }

    /// 1-based id of the offending user.
    pub fn user(&self) -> u32 {
        match self {
            Violation::InvalidOutput { user, .. }
            | Violation::InvalidServerIndex { user, .. }
            | Violation::InvalidNpuIndex { user, .. }
            | Violation::BatchsizeExceedsMemory { user, .. }
            | Violation::InvalidTimeOrder { user, .. }
            | Violation::InvalidStartTime { user, .. }
            | Violation::SamplesNotFullyProcessed { user, .. } => *user,
        }
    }
}

/// Every static violation found in a submission, ordered by user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} static violation(s) found", .0.len())]
pub struct ValidationErrors(pub Vec<Violation>);

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    /// Rule name of the first violation.
    pub fn kind(&self) -> &'static str {
        self.0.first().map(Violation::kind).unwrap_or("InvalidOutput")
    }
}

/// One `(time, server, npu, batch)` tuple exactly as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub send_time: i64,
    pub server: i64,
    pub npu: i64,
    pub batch: i64,
}

/// Result of the parse step: per-user entries (absent when the user's
/// block was structurally unusable) and the violations found so far.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    pub entries: Vec<Option<Vec<ScheduleEntry>>>,
    pub violations: Vec<Violation>,
}

/// A validated schedule: requests in user order, then send order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub requests: Vec<Request>,
    /// Request ids of each user (0-based user index), in send order.
    pub by_user: Vec<Vec<RequestId>>,
}

impl Schedule {
    pub fn request(&self, id: RequestId) -> &Request {
        &self.requests[id.0]
    }

    pub fn user_requests(&self, user: usize) -> impl Iterator<Item = &Request> + '_ {
        self.by_user[user].iter().map(move |id| self.request(*id))
    }

    /// Number of adjacent entries in a user's schedule whose
    /// `(server, npu)` target differs from the previous entry's.
    pub fn migrations(&self, user: usize) -> u64 {
        let targets: Vec<_> = self.user_requests(user).map(|r| r.npu).collect();
        targets.windows(2).filter(|w| w[0] != w[1]).count() as u64
    }
}

/// Parse submission text for `user_count` users.
///
/// Structural problems that leave the text readable (a T_i out of range, a
/// request line with the wrong number of integers) become
/// [`Violation::InvalidOutput`] and parsing moves on to the next user.
/// Unreadable text is a [`FormatError`].
pub fn parse_submission(
    text: &str,
    user_count: usize,
    limits: &LimitsSection,
) -> Result<RawSubmission, FormatError> {
    let mut reader = LineReader::new("submission", text);
    let mut raw = RawSubmission::default();

    for user_idx in 0..user_count {
        let user = (user_idx + 1) as u32;
        let (_, t) = reader.expect_ints::<i64>(1, &format!("T_i for user {user}"))?;
        let t_i = t[0];

        if t_i < 1 || t_i > i64::from(limits.max_requests_per_user) {
            raw.violations.push(Violation::InvalidOutput {
                user,
                detail: format!(
                    "T_i={t_i} is not in [1, {}]",
                    limits.max_requests_per_user
                ),
            });
            raw.entries.push(None);
            // An empty schedule has a blank request line, so a lone integer
            // that follows is the next user's T_i.
            let lone_integer = reader
                .peek_line()
                .is_some_and(|line| line.split_whitespace().count() == 1);
            if t_i > 0 || !lone_integer {
                reader.next_line(&format!("request line for user {user}")).ok();
            }
            continue;
        }

        let (line_no, line) = reader.next_line(&format!("request line for user {user}"))?;
        let values = reader.parse_ints::<i64>(line_no, line, "request line")?;
        let expected = 4 * t_i as usize;
        if values.len() != expected {
            raw.violations.push(Violation::InvalidOutput {
                user,
                detail: format!("expected {expected} integers, found {}", values.len()),
            });
            raw.entries.push(None);
            continue;
        }

        let entries = values
            .chunks_exact(4)
            .map(|c| ScheduleEntry {
                send_time: c[0],
                server: c[1],
                npu: c[2],
                batch: c[3],
            })
            .collect();
        raw.entries.push(Some(entries));
    }

    if let Ok((line_no, _)) = reader.next_line("end of input") {
        tracing::warn!(line = line_no, "ignoring trailing submission content");
    }
    Ok(raw)
}

/// Run every static check and resolve the submission into a [`Schedule`].
pub fn validate(
    scenario: &Scenario,
    raw: RawSubmission,
    limits: &LimitsSection,
) -> Result<Schedule, ValidationErrors> {
    let mut violations = raw.violations;

    for (user_idx, entries) in raw.entries.iter().enumerate() {
        let Some(entries) = entries else { continue };
        check_user(scenario, user_idx, entries, limits, &mut violations);
    }

    if !violations.is_empty() {
        violations.sort_by_key(Violation::user);
        tracing::warn!(count = violations.len(), "submission failed static validation");
        return Err(ValidationErrors(violations));
    }

    let cluster = Cluster::new(scenario);
    let mut requests = Vec::new();
    let mut by_user = Vec::with_capacity(scenario.users.len());
    for (user_idx, entries) in raw.entries.into_iter().enumerate() {
        let user = &scenario.users[user_idx];
        let mut ids = Vec::new();
        // All checks passed, so every entry is in range and positive.
        for (seq, e) in entries.unwrap_or_default().into_iter().enumerate() {
            let server = (e.server - 1) as usize;
            let npu_local = (e.npu - 1) as usize;
            let send_time_ms = e.send_time as u64;
            let batch = e.batch as u64;
            let id = RequestId(requests.len());
            requests.push(Request {
                id,
                user: user_idx,
                user_id: user.id,
                seq,
                server,
                npu_local,
                npu: cluster.npu_id(server, npu_local),
                batch,
                memory: scenario.memory.memory_needed(batch),
                send_time_ms,
                arrival_time_ms: send_time_ms.saturating_add(scenario.latency_ms(server, user_idx)),
            });
            ids.push(id);
        }
        by_user.push(ids);
    }

    tracing::info!(requests = requests.len(), "submission passed static validation");
    Ok(Schedule { requests, by_user })
}

fn check_user(
    scenario: &Scenario,
    user_idx: usize,
    entries: &[ScheduleEntry],
    limits: &LimitsSection,
    violations: &mut Vec<Violation>,
) {
    let user = &scenario.users[user_idx];
    let uid = user.id;

    if let Some(first) = entries.first() {
        if first.send_time < 0 || (first.send_time as u64) < user.start_ms {
            violations.push(Violation::InvalidStartTime {
                user: uid,
                time: first.send_time,
                earliest: user.start_ms,
            });
        }
    }

    let mut total: i64 = 0;
    let mut previous: Option<i64> = None;
    for (j, e) in entries.iter().enumerate() {
        let request = j + 1;
        total = total.saturating_add(e.batch);

        if e.send_time > 0 && e.send_time as u64 > limits.max_send_time_ms {
            violations.push(Violation::InvalidOutput {
                user: uid,
                detail: format!(
                    "req {request}: send time {} exceeds {}",
                    e.send_time, limits.max_send_time_ms
                ),
            });
        }
        if let Some(prev) = previous {
            if e.send_time <= prev {
                violations.push(Violation::InvalidTimeOrder {
                    user: uid,
                    request,
                    time: e.send_time,
                    previous: prev,
                });
            }
        }
        previous = Some(e.send_time);

        if e.batch < 1 {
            violations.push(Violation::InvalidOutput {
                user: uid,
                detail: format!("req {request}: batch size {} must be at least 1", e.batch),
            });
        }

        if e.server < 1 || e.server as u64 > scenario.servers.len() as u64 {
            violations.push(Violation::InvalidServerIndex {
                user: uid,
                request,
                server: e.server,
                servers: scenario.servers.len(),
            });
            continue;
        }
        let server_idx = (e.server - 1) as usize;
        let server = &scenario.servers[server_idx];
        if e.send_time >= 0
            && (e.send_time as u64)
                .checked_add(scenario.latency_ms(server_idx, user_idx))
                .is_none()
        {
            violations.push(Violation::InvalidOutput {
                user: uid,
                detail: format!("req {request}: arrival time overflows"),
            });
        }
        if e.npu < 1 || e.npu > i64::from(server.npu_count) {
            violations.push(Violation::InvalidNpuIndex {
                user: uid,
                request,
                server: e.server,
                npu: e.npu,
                npus: server.npu_count,
            });
        }
        if e.batch >= 1 {
            let needed = scenario.memory.memory_needed(e.batch as u64);
            if needed > server.memory {
                violations.push(Violation::BatchsizeExceedsMemory {
                    user: uid,
                    request,
                    server: e.server,
                    batch: e.batch,
                    needed,
                    available: server.memory,
                });
            }
        }
    }

    if total < 0 || total as u64 != user.samples {
        violations.push(Violation::SamplesNotFullyProcessed {
            user: uid,
            processed: total,
            required: user.samples,
        });
    }
}

/// Parse and validate in one step.
pub fn load_submission(
    text: &str,
    scenario: &Scenario,
    limits: &LimitsSection,
) -> Result<Schedule, crate::GradeError> {
    let raw = parse_submission(text, scenario.users.len(), limits)?;
    Ok(validate(scenario, raw, limits)?)
}
