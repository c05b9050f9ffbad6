//! Requests flowing through the simulated cluster.
//!
//! A [`Request`] is fixed once the submission has been validated. The only
//! mutable claim a request ever makes on the cluster is the [`RunningTask`]
//! created when an NPU admits it and dropped when it completes.

use serde::{Deserialize, Serialize};

/// Index of a request in [`crate::submission::Schedule::requests`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub usize);

/// Global index of an NPU in the cluster arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NpuId(pub usize);

/// One scheduled batch, as declared by the submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    /// 0-based user index.
    pub user: usize,
    /// 1-based user id, used for tie-breaking and reporting.
    pub user_id: u32,
    /// Position within the user's schedule, 0-based.
    pub seq: usize,
    /// 0-based server index.
    pub server: usize,
    /// 0-based NPU index within the server.
    pub npu_local: usize,
    /// Resolved arena slot of the target NPU.
    pub npu: NpuId,
    pub batch: u64,
    /// Memory reserved while running.
    pub memory: u64,
    pub send_time_ms: u64,
    /// `send_time + latency[server][user]`.
    pub arrival_time_ms: u64,
}

impl Request {
    /// The `(server id, npu id)` pair as written in the submission.
    pub fn target(&self) -> (usize, usize) {
        (self.server + 1, self.npu_local + 1)
    }
}

/// A request waiting in an NPU queue, with the sort keys copied out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub arrival_time_ms: u64,
    pub user_id: u32,
    pub batch: u64,
    pub memory: u64,
}

impl From<&Request> for PendingRequest {
    fn from(req: &Request) -> Self {
        Self {
            id: req.id,
            arrival_time_ms: req.arrival_time_ms,
            user_id: req.user_id,
            batch: req.batch,
            memory: req.memory,
        }
    }
}

/// A request currently executing on an NPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTask {
    pub request: RequestId,
    pub batch: u64,
    pub start_ms: u64,
    pub finish_ms: u64,
    /// Memory reserved on the NPU for the lifetime of the task.
    pub memory: u64,
}

impl RunningTask {
    pub fn duration_ms(&self) -> u64 {
        self.finish_ms - self.start_ms
    }
}
